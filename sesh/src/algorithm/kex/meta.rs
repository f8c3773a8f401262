use secrecy::ExposeSecret;

use crate::{
    algorithm::{Cipher, Compress, Hmac, Negociate},
    stream::{Keys, Transport},
    trans::KexInit,
    Result,
};

/// The algorithms negotiated for one direction of the transport.
#[derive(Debug, Clone, Copy)]
pub struct KexMeta {
    pub cipher: Cipher,
    pub hmac: Hmac,
    pub compress: Compress,
}

impl KexMeta {
    /// Negotiate the algorithms of the `S`-to-peer direction.
    pub fn new<S>(clientkex: &KexInit, serverkex: &KexInit) -> Result<Self>
    where
        Cipher: Negociate<S>,
        Hmac: Negociate<S>,
        Compress: Negociate<S>,
    {
        Ok(Self {
            cipher: <Cipher as Negociate<S>>::negociate(clientkex, serverkex)?,
            hmac: <Hmac as Negociate<S>>::negociate(clientkex, serverkex)?,
            compress: <Compress as Negociate<S>>::negociate(clientkex, serverkex)?,
        })
    }

    /// Build the sealing half of the transport from the derived `keys`.
    pub fn seal(&self, keys: Keys) -> Result<Transport> {
        let state = self
            .cipher
            .encryptor(keys.key.expose_secret(), keys.iv.expose_secret())?;

        Ok(self.transport(keys, state))
    }

    /// Build the opening half of the transport from the derived `keys`.
    pub fn open(&self, keys: Keys) -> Result<Transport> {
        let state = self
            .cipher
            .decryptor(keys.key.expose_secret(), keys.iv.expose_secret())?;

        Ok(self.transport(keys, state))
    }

    fn transport(&self, chain: Keys, state: Option<crate::algorithm::CipherState>) -> Transport {
        Transport {
            chain,
            state,
            cipher: self.cipher,
            hmac: self.hmac,
            compress: self.compress,
        }
    }
}
