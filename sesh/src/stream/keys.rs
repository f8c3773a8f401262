use digest::{Digest, FixedOutputReset};
use secrecy::SecretBox;

use crate::algorithm::{Cipher, Hmac};

/// The cryptovariables of one direction of the transport.
#[derive(Debug, Default)]
pub struct Keys {
    /// Cipher _initialization vector_.
    pub iv: SecretBox<Vec<u8>>,

    /// Cipher _key_.
    pub key: SecretBox<Vec<u8>>,

    /// Hmac _key_.
    pub hmac: SecretBox<Vec<u8>>,
}

impl Keys {
    /// Derive the client-to-server keys, from the `A`, `C` and `E` letters.
    ///
    /// `secret` is the shared secret, already encoded as an `mpint`.
    pub fn as_client<D: Digest + FixedOutputReset>(
        secret: &[u8],
        hash: &[u8],
        session_id: &[u8],
        cipher: &Cipher,
        hmac: &Hmac,
    ) -> Self {
        Self {
            iv: Self::derive::<D>(secret, hash, b'A', session_id, cipher.iv_size()),
            key: Self::derive::<D>(secret, hash, b'C', session_id, cipher.key_size()),
            hmac: Self::derive::<D>(secret, hash, b'E', session_id, hmac.size()),
        }
    }

    /// Derive the server-to-client keys, from the `B`, `D` and `F` letters.
    ///
    /// `secret` is the shared secret, already encoded as an `mpint`.
    pub fn as_server<D: Digest + FixedOutputReset>(
        secret: &[u8],
        hash: &[u8],
        session_id: &[u8],
        cipher: &Cipher,
        hmac: &Hmac,
    ) -> Self {
        Self {
            iv: Self::derive::<D>(secret, hash, b'B', session_id, cipher.iv_size()),
            key: Self::derive::<D>(secret, hash, b'D', session_id, cipher.key_size()),
            hmac: Self::derive::<D>(secret, hash, b'F', session_id, hmac.size()),
        }
    }

    fn derive<D: Digest + FixedOutputReset>(
        secret: &[u8],
        hash: &[u8],
        kind: u8,
        session_id: &[u8],
        size: usize,
    ) -> SecretBox<Vec<u8>> {
        SecretBox::<Vec<u8>>::init_with_mut(|key| {
            let mut hasher = D::new()
                .chain_update(secret)
                .chain_update(hash)
                .chain_update([kind])
                .chain_update(session_id);

            key.extend_from_slice(&hasher.finalize_reset());

            while key.len() < size {
                hasher = hasher
                    .chain_update(secret)
                    .chain_update(hash)
                    .chain_update(&*key);

                key.extend_from_slice(&hasher.finalize_reset());
            }

            key.truncate(size);
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use sha2::Sha256;

    use super::*;

    #[test]
    fn extended_derivation() {
        let secret = [0, 0, 0, 1, 42];
        let keys = Keys::as_client::<Sha256>(
            &secret,
            b"hash",
            b"session",
            &Cipher::Aes256Ctr,
            &Hmac::HmacSha512,
        );

        assert_eq!(keys.iv.expose_secret().len(), 16);
        assert_eq!(keys.key.expose_secret().len(), 32);
        assert_eq!(keys.hmac.expose_secret().len(), 64);

        // The first round is `HASH(K ‖ H ‖ X ‖ session_id)`, extended by `HASH(K ‖ H ‖ K1)`.
        let k1 = Sha256::new()
            .chain_update(secret)
            .chain_update(b"hash")
            .chain_update([b'E'])
            .chain_update(b"session")
            .finalize();
        let k2 = Sha256::new()
            .chain_update(secret)
            .chain_update(b"hash")
            .chain_update(k1)
            .finalize();

        assert_eq!(&keys.hmac.expose_secret()[..32], k1.as_slice());
        assert_eq!(&keys.hmac.expose_secret()[32..], k2.as_slice());

        let server = Keys::as_server::<Sha256>(
            &secret,
            b"hash",
            b"session",
            &Cipher::Aes256Ctr,
            &Hmac::HmacSha512,
        );
        assert_ne!(server.key.expose_secret(), keys.key.expose_secret());
    }
}
