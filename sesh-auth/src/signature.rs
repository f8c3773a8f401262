//! The data signed in the `publickey` method, and its signature blob.

use std::io::Cursor;

use securefmt::Debug;
use sesh::MessageType;
use signature::{Signer, Verifier};
use ssh_key::{Algorithm, HashAlg, PrivateKey, PublicKey, Signature};
use ssh_packet::{
    arch::{Bytes, Utf8 as StringUtf8},
    binrw::{self, BinWrite},
};

/// The canonical data a `publickey` signature covers.
#[binrw::binwrite]
#[derive(Debug)]
#[bw(big)]
pub struct Data<'d> {
    /// The session identifier.
    #[sensitive]
    pub session_id: Bytes<'d>,

    #[bw(calc = MessageType::USERAUTH_REQUEST.0)]
    kind: u8,

    /// The user name.
    pub username: StringUtf8<'d>,

    /// The requested service.
    pub service_name: StringUtf8<'d>,

    #[bw(calc = StringUtf8::from("publickey"))]
    method: StringUtf8<'d>,

    #[bw(calc = 1)]
    signed: u8,

    /// The public key algorithm name.
    pub algorithm: Bytes<'d>,

    /// The public key blob.
    pub blob: Bytes<'d>,
}

impl Data<'_> {
    /// The serialized data.
    pub fn to_bytes(&self) -> sesh::Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_be(&mut cursor)?;

        Ok(cursor.into_inner())
    }
}

/// The signature algorithm a key signs with.
///
/// RSA keys sign with `rsa-sha2-512`, the legacy SHA-1 `ssh-rsa` is never emitted.
pub fn algorithm(key: &PrivateKey) -> Algorithm {
    match key.algorithm() {
        Algorithm::Rsa { .. } => Algorithm::Rsa {
            hash: Some(HashAlg::Sha512),
        },
        algorithm => algorithm,
    }
}

/// Whether a key of algorithm `key` may authenticate with signatures of `claimed` algorithm.
pub fn is_compatible(key: &Algorithm, claimed: &[u8]) -> bool {
    match key {
        Algorithm::Rsa { .. } => matches!(
            claimed,
            b"ssh-rsa" | b"rsa-sha2-256" | b"rsa-sha2-512"
        ),
        key => key.as_str().as_bytes() == claimed,
    }
}

/// Left-pad a raw RSA signature with zeroes up to the modulus `size`.
pub fn pad(signature: &[u8], size: usize) -> Vec<u8> {
    let mut padded = vec![0; size.saturating_sub(signature.len())];
    padded.extend_from_slice(signature);

    padded
}

/// Sign `data` with the key into a signature blob,
/// re-padding RSA signatures to the full modulus size when `pad` is set.
pub fn sign(key: &PrivateKey, data: &[u8], pad: bool) -> sesh::Result<Vec<u8>> {
    let signature: Signature = Signer::try_sign(key, data).map_err(sesh::Error::from)?;

    if signature.algorithm() != algorithm(key) {
        tracing::error!(
            "Key signed with `{}` instead of `{}`",
            signature.algorithm(),
            algorithm(key)
        );

        return Err(signature::Error::new().into());
    }

    let mut bytes = signature.as_bytes().to_vec();

    let modulus = key
        .public_key()
        .key_data()
        .rsa()
        .and_then(|rsa| rsa.n.as_positive_bytes())
        .map(<[u8]>::len);

    if let Some(size) = modulus.filter(|size| pad && bytes.len() < *size) {
        tracing::debug!("Padding RSA signature from {} to {size} bytes", bytes.len());

        bytes = self::pad(&bytes, size);
    }

    let mut cursor = Cursor::new(Vec::new());
    Bytes::from(signature.algorithm().as_str().as_bytes()).write_be(&mut cursor)?;
    Bytes::from(bytes).write_be(&mut cursor)?;

    Ok(cursor.into_inner())
}

/// Verify a signature blob over `data`, the signature being required to be of the `claimed` algorithm.
pub fn verify(key: &PublicKey, claimed: &[u8], data: &[u8], blob: &[u8]) -> bool {
    let Ok(signature) = Signature::try_from(blob) else {
        return false;
    };

    if signature.algorithm().as_str().as_bytes() != claimed {
        tracing::debug!(
            "Signature algorithm `{}` differs from the claimed one",
            signature.algorithm()
        );

        return false;
    }

    Verifier::verify(key, data, &signature).is_ok()
}
