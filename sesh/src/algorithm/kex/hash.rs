use digest::Digest;
use sha1::Sha1;
use sha2::Sha256;

use crate::{Error, Result};

/// The digest algorithm fixed by the key-exchange method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    /// SHA-1.
    Sha1,

    /// SHA-2-256.
    Sha256,
}

/// The running exchange hash `H`.
///
/// Both digests are fed in parallel until the negotiated key-exchange method
/// fixes the algorithm, then the unused one is dropped.
#[derive(Debug, Clone)]
pub enum ExchangeHash {
    /// The algorithm isn't known yet.
    Pending {
        /// The SHA-1 context.
        sha1: Sha1,

        /// The SHA-2-256 context.
        sha256: Sha256,
    },

    /// Fixed to SHA-1.
    Sha1(Sha1),

    /// Fixed to SHA-2-256.
    Sha256(Sha256),
}

impl Default for ExchangeHash {
    fn default() -> Self {
        Self::Pending {
            sha1: Sha1::new(),
            sha256: Sha256::new(),
        }
    }
}

impl ExchangeHash {
    /// Feed raw bytes to the running digest(s).
    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        match self {
            Self::Pending { sha1, sha256 } => {
                Digest::update(sha1, bytes);
                Digest::update(sha256, bytes);
            }
            Self::Sha1(sha1) => Digest::update(sha1, bytes),
            Self::Sha256(sha256) => Digest::update(sha256, bytes),
        }

        self
    }

    /// Feed a `string`.
    pub fn string(&mut self, value: &[u8]) -> &mut Self {
        self.update(&(value.len() as u32).to_be_bytes()).update(value)
    }

    /// Feed a `uint32`.
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.update(&value.to_be_bytes())
    }

    /// Feed an `mpint`, from its big-endian magnitude.
    pub fn mpint(&mut self, magnitude: &[u8]) -> Result<&mut Self> {
        Ok(self.update(&super::mpint(magnitude)?))
    }

    /// Fix the digest algorithm, discarding the other context.
    pub fn fix(self, alg: HashAlg) -> Self {
        match (self, alg) {
            (Self::Pending { sha1, .. }, HashAlg::Sha1) => Self::Sha1(sha1),
            (Self::Pending { sha256, .. }, HashAlg::Sha256) => Self::Sha256(sha256),
            (fixed, _) => fixed,
        }
    }

    /// The algorithm of the digest, if fixed.
    pub fn alg(&self) -> Option<HashAlg> {
        match self {
            Self::Pending { .. } => None,
            Self::Sha1(_) => Some(HashAlg::Sha1),
            Self::Sha256(_) => Some(HashAlg::Sha256),
        }
    }

    /// Finalize the exchange hash.
    pub fn finalize(self) -> Result<Vec<u8>> {
        match self {
            Self::Pending { .. } => Err(Error::KexError(
                "exchange hash finalized before its algorithm was fixed",
            )),
            Self::Sha1(sha1) => Ok(sha1.finalize().to_vec()),
            Self::Sha256(sha256) => Ok(sha256.finalize().to_vec()),
        }
    }
}
