use ssh_key::PrivateKey;

use crate::{
    side::client::Client,
    stream::Stream,
    trans::{KexEcdhInit, KexEcdhReply},
    Error, Pipe, Result,
};

use super::{secret, sign, verify, ExchangeHash, Outcome};

fn public(bytes: &[u8]) -> Result<x25519_dalek::PublicKey> {
    <[u8; 32]>::try_from(bytes)
        .map(x25519_dalek::PublicKey::from)
        .map_err(|_| Error::KexError("malformed curve25519 public key"))
}

fn agree(
    ephemeral: x25519_dalek::EphemeralSecret,
    peer: &x25519_dalek::PublicKey,
) -> Result<Vec<u8>> {
    let shared = ephemeral.diffie_hellman(peer);

    if !shared.was_contributory() {
        return Err(Error::KexError("non-contributory curve25519 shared secret"));
    }

    Ok(shared.as_bytes().to_vec())
}

pub async fn as_client(
    stream: &mut Stream<impl Pipe>,
    mut hash: ExchangeHash,
    config: &Client,
) -> Result<Outcome> {
    let e_c = x25519_dalek::EphemeralSecret::random_from_rng(rand::thread_rng());
    let q_c = x25519_dalek::PublicKey::from(&e_c);

    stream
        .send(&KexEcdhInit {
            q_c: q_c.as_bytes().as_slice().into(),
        })
        .await?;

    let ecdh: KexEcdhReply = stream.recv().await?.to()?;
    let q_s = public(&ecdh.q_s)?;

    let secret = secret(agree(e_c, &q_s)?)?;

    hash.string(&ecdh.k_s)
        .string(q_c.as_bytes())
        .string(q_s.as_bytes());
    let outcome = Outcome::new(hash, secret)?;

    verify(config, &ecdh.k_s, &outcome.hash, &ecdh.signature)?;

    Ok(outcome)
}

pub async fn as_server(
    stream: &mut Stream<impl Pipe>,
    mut hash: ExchangeHash,
    key: &PrivateKey,
) -> Result<Outcome> {
    let ecdh: KexEcdhInit = stream.recv().await?.to()?;
    let q_c = public(&ecdh.q_c)?;

    let e_s = x25519_dalek::EphemeralSecret::random_from_rng(rand::thread_rng());
    let q_s = x25519_dalek::PublicKey::from(&e_s);

    let secret = secret(agree(e_s, &q_c)?)?;
    let k_s = key.public_key().to_bytes()?;

    hash.string(&k_s)
        .string(q_c.as_bytes())
        .string(q_s.as_bytes());
    let outcome = Outcome::new(hash, secret)?;

    stream
        .send(&KexEcdhReply {
            k_s: k_s.into(),
            q_s: q_s.as_bytes().as_slice().into(),
            signature: sign(key, &outcome.hash)?.into(),
        })
        .await?;

    Ok(outcome)
}
