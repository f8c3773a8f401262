//! Key-exchange methods, the exchange hash and the resulting key derivation.

use std::io::Cursor;

use secrecy::{zeroize::Zeroize, ExposeSecret, SecretBox};
use signature::{Signer, Verifier};
use ssh_key::{PrivateKey, PublicKey, Signature};
use ssh_packet::{
    arch::{Bytes, MpInt, NameList},
    binrw::{BinRead, BinWrite},
};
use strum::{AsRefStr, EnumString};

use crate::{
    side::client::Client,
    stream::{Keys, Stream, TransportPair},
    trans::KexInit,
    Error, Pipe, Quirks, Result,
};

use super::{Key, Negociate};

mod meta;
pub(crate) use meta::KexMeta;

mod hash;
pub use hash::{ExchangeHash, HashAlg};

pub mod dh;

mod curve25519;
mod gex;

impl Negociate for Kex {
    const WHAT: &'static str = "key-exchange";

    fn field<'f>(kex: &'f KexInit) -> &'f NameList<'f> {
        &kex.kex_algorithms
    }
}

/// SSH key-exchange algorithms.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum Kex {
    /// Curve25519 ECDH with sha-2-256 digest.
    #[strum(serialize = "curve25519-sha256")]
    Curve25519Sha256,

    /// Curve25519 ECDH with sha-2-256 digest (pre-RFC 8731).
    #[strum(serialize = "curve25519-sha256@libssh.org")]
    Curve25519Sha256Libssh,

    /// Diffie-Hellman over a negotiated group with sha-2-256 digest.
    #[strum(serialize = "diffie-hellman-group-exchange-sha256")]
    DiffieHellmanGroupExchangeSha256,

    /// Diffie-Hellman over a negotiated group with sha-1 digest.
    #[strum(serialize = "diffie-hellman-group-exchange-sha1")]
    DiffieHellmanGroupExchangeSha1,

    /// Diffie-Hellman over the 2048-bit MODP group with sha-2-256 digest.
    #[strum(serialize = "diffie-hellman-group14-sha256")]
    DiffieHellmanGroup14Sha256,

    /// Diffie-Hellman over the 2048-bit MODP group with sha-1 digest.
    #[strum(serialize = "diffie-hellman-group14-sha1")]
    DiffieHellmanGroup14Sha1,
}

impl Kex {
    /// The digest algorithm of the exchange hash for this method.
    pub fn hash(&self) -> HashAlg {
        match self {
            Self::DiffieHellmanGroupExchangeSha1 | Self::DiffieHellmanGroup14Sha1 => HashAlg::Sha1,
            Self::Curve25519Sha256
            | Self::Curve25519Sha256Libssh
            | Self::DiffieHellmanGroupExchangeSha256
            | Self::DiffieHellmanGroup14Sha256 => HashAlg::Sha256,
        }
    }
}

/// The group sizes, in bits, requested by the client during a group exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GexRange {
    /// The minimal acceptable size.
    pub min: u32,

    /// The preferred size.
    pub n: u32,

    /// The maximal acceptable size.
    pub max: u32,
}

impl Default for GexRange {
    fn default() -> Self {
        Self {
            min: 2048,
            n: 2048,
            max: 8192,
        }
    }
}

impl GexRange {
    /// Whether a group of `bits` fits the range.
    pub fn fits(&self, bits: u64) -> bool {
        (u64::from(self.min)..=u64::from(self.max)).contains(&bits)
    }
}

/// The result of a key-exchange method, before key derivation.
pub(crate) struct Outcome {
    /// The shared secret `K`, encoded as an `mpint`.
    secret: SecretBox<Vec<u8>>,

    /// The exchange hash `H`.
    hash: Vec<u8>,
}

impl Outcome {
    /// Finalize the exchange hash, after feeding it the encoded secret.
    fn new(mut hash: ExchangeHash, secret: SecretBox<Vec<u8>>) -> Result<Self> {
        hash.update(secret.expose_secret());

        Ok(Self {
            hash: hash.finalize()?,
            secret,
        })
    }
}

/// The ephemeral state of a single key-exchange, from the negotiated algorithms.
pub(crate) struct Exchange {
    pub kex: Kex,
    pub host: Key,
    pub client: KexMeta,
    pub server: KexMeta,
    pub hash: ExchangeHash,
    pub quirks: Quirks,
}

impl Exchange {
    pub async fn as_client(
        self,
        stream: &mut Stream<impl Pipe>,
        config: &Client,
    ) -> Result<TransportPair> {
        let hash = self.hash.fix(self.kex.hash());

        let outcome = match self.kex {
            Kex::Curve25519Sha256 | Kex::Curve25519Sha256Libssh => {
                curve25519::as_client(stream, hash, config).await?
            }
            Kex::DiffieHellmanGroup14Sha256 | Kex::DiffieHellmanGroup14Sha1 => {
                dh::as_client(stream, hash, config).await?
            }
            Kex::DiffieHellmanGroupExchangeSha256 | Kex::DiffieHellmanGroupExchangeSha1 => {
                gex::as_client(stream, hash, config, self.quirks).await?
            }
        };

        let (client, server) = derive(stream, &outcome, self.kex.hash(), &self.client, &self.server);

        Ok(TransportPair {
            tx: self.client.seal(client)?,
            rx: self.server.open(server)?,
        })
    }

    pub async fn as_server(
        self,
        stream: &mut Stream<impl Pipe>,
        key: &PrivateKey,
    ) -> Result<TransportPair> {
        let hash = self.hash.fix(self.kex.hash());

        let outcome = match self.kex {
            Kex::Curve25519Sha256 | Kex::Curve25519Sha256Libssh => {
                curve25519::as_server(stream, hash, key).await?
            }
            Kex::DiffieHellmanGroup14Sha256 | Kex::DiffieHellmanGroup14Sha1 => {
                dh::as_server(stream, hash, key).await?
            }
            Kex::DiffieHellmanGroupExchangeSha256 | Kex::DiffieHellmanGroupExchangeSha1 => {
                gex::as_server(stream, hash, key).await?
            }
        };

        let (client, server) = derive(stream, &outcome, self.kex.hash(), &self.client, &self.server);

        Ok(TransportPair {
            tx: self.server.seal(server)?,
            rx: self.client.open(client)?,
        })
    }
}

/// Derive the client and server keys, recording the session identifier on the first exchange.
fn derive(
    stream: &mut Stream<impl Pipe>,
    outcome: &Outcome,
    alg: HashAlg,
    client: &KexMeta,
    server: &KexMeta,
) -> (Keys, Keys) {
    let secret = outcome.secret.expose_secret();
    let hash = &outcome.hash;
    let session_id = stream.with_session(hash);

    match alg {
        HashAlg::Sha1 => (
            Keys::as_client::<sha1::Sha1>(secret, hash, session_id, &client.cipher, &client.hmac),
            Keys::as_server::<sha1::Sha1>(secret, hash, session_id, &server.cipher, &server.hmac),
        ),
        HashAlg::Sha256 => (
            Keys::as_client::<sha2::Sha256>(secret, hash, session_id, &client.cipher, &client.hmac),
            Keys::as_server::<sha2::Sha256>(secret, hash, session_id, &server.cipher, &server.hmac),
        ),
    }
}

/// Encode a big-endian magnitude as an `mpint`.
pub(crate) fn mpint(magnitude: &[u8]) -> Result<Vec<u8>> {
    let zeroes = magnitude.iter().take_while(|byte| **byte == 0).count();

    let mut cursor = Cursor::new(Vec::new());
    MpInt::positive(&magnitude[zeroes..]).write_be(&mut cursor)?;

    Ok(cursor.into_inner())
}

/// The big-endian magnitude of an `mpint` sent by the peer, which must not be negative.
fn magnitude<'m>(value: &'m MpInt) -> Result<&'m [u8]> {
    let bytes: &[u8] = value.as_ref();

    match bytes.first() {
        Some(byte) if byte & 0x80 != 0 => Err(Error::KexError("negative public value")),
        _ => Ok(bytes),
    }
}

/// Encode the big-endian magnitude of the shared secret as an `mpint`, wiping the magnitude.
fn secret(mut magnitude: Vec<u8>) -> Result<SecretBox<Vec<u8>>> {
    let encoded = mpint(&magnitude);
    magnitude.zeroize();

    Ok(SecretBox::new(Box::new(encoded?)))
}

/// Sign the exchange hash with the host key, into a signature blob.
fn sign(key: &PrivateKey, hash: &[u8]) -> Result<Vec<u8>> {
    let signature: Signature = Signer::try_sign(key, hash)?;

    let mut cursor = Cursor::new(Vec::new());
    Bytes::from(signature.algorithm().as_str().as_bytes()).write_be(&mut cursor)?;
    Bytes::from(signature.as_bytes()).write_be(&mut cursor)?;

    Ok(cursor.into_inner())
}

/// Verify the signature blob of the exchange hash against the host key,
/// then submit the key to the verification callback.
fn verify(config: &Client, k_s: &[u8], hash: &[u8], signature: &[u8]) -> Result<()> {
    let key = PublicKey::from_bytes(k_s)?;

    // Ensure the blob is well-formed before handing it to `ssh-key`.
    let mut cursor = Cursor::new(signature);
    Bytes::read_be(&mut cursor)?;
    Bytes::read_be(&mut cursor)?;

    Verifier::verify(&key, hash, &Signature::try_from(signature)?)?;

    match &config.verify {
        Some(verify) if !verify(&key) => Err(Error::HostKeyRejected(
            key.fingerprint(ssh_key::HashAlg::Sha256).to_string(),
        )),
        _ => {
            tracing::debug!(
                "Host key `{}` verified",
                key.fingerprint(ssh_key::HashAlg::Sha256)
            );

            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("curve25519-sha256", Kex::Curve25519Sha256, HashAlg::Sha256)]
    #[case("diffie-hellman-group14-sha1", Kex::DiffieHellmanGroup14Sha1, HashAlg::Sha1)]
    #[case(
        "diffie-hellman-group-exchange-sha256",
        Kex::DiffieHellmanGroupExchangeSha256,
        HashAlg::Sha256
    )]
    fn names(#[case] name: &str, #[case] kex: Kex, #[case] alg: HashAlg) {
        assert_eq!(name.parse::<Kex>().ok(), Some(kex));
        assert_eq!(kex.as_ref(), name);
        assert_eq!(kex.hash(), alg);
    }

    #[test]
    fn gex_range() {
        let range = GexRange::default();

        assert!(range.fits(2048));
        assert!(range.fits(8192));
        assert!(!range.fits(1024));
    }

    #[test]
    fn secret_is_mpint() {
        let secret = secret(vec![0x80, 0x01]).expect("encoded");

        assert_eq!(secret.expose_secret().as_slice(), [0, 0, 0, 3, 0, 0x80, 0x01]);
    }

    #[test]
    fn leading_zeroes_are_stripped() {
        assert_eq!(mpint(&[0, 0, 0x7f]).expect("encoded"), [0, 0, 0, 1, 0x7f]);
    }
}
