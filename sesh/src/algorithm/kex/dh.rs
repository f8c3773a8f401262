//! Finite-field Diffie-Hellman over fixed or exchanged MODP groups.

use num_bigint::BigUint;
use rand::RngCore;
use ssh_key::PrivateKey;
use ssh_packet::arch::MpInt;

use crate::{
    side::client::Client,
    stream::Stream,
    trans::{KexdhInit, KexdhReply},
    Error, Pipe, Result,
};

use super::{magnitude, secret, sign, verify, ExchangeHash, Outcome};

/// The 2048-bit MODP group from [RFC3526 Section 3](https://datatracker.ietf.org/doc/html/rfc3526#section-3).
const GROUP14_PRIME: &[u8] = b"\
    FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
    29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
    EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
    E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
    EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
    C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
    83655D23DCA3AD961C62F356208552BB9ED529077096966D\
    670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
    E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9\
    DE2BCBF6955817183995497CEA956AE515D2261898FA0510\
    15728E5A8AACAA68FFFFFFFFFFFFFFFF";

/// Size in bytes of the private exponents, twice the 256-bit security target.
const EXPONENT_SIZE: usize = 64;

/// A MODP group, a safe prime `p` and its generator `g`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// The safe prime.
    pub p: BigUint,

    /// The generator.
    pub g: BigUint,
}

impl Group {
    /// The 2048-bit MODP group 14.
    pub fn group14() -> Result<Self> {
        Ok(Self {
            p: BigUint::parse_bytes(GROUP14_PRIME, 16)
                .ok_or(Error::KexError("malformed group 14 prime"))?,
            g: BigUint::from(2u32),
        })
    }

    /// Build a group from the big-endian magnitudes sent by the peer.
    pub fn from_bytes(p: &[u8], g: &[u8]) -> Result<Self> {
        let group = Self {
            p: BigUint::from_bytes_be(p),
            g: BigUint::from_bytes_be(g),
        };

        if group.p.bits() < 2 || !group.p.bit(0) || group.g < BigUint::from(2u32) || group.g >= group.p
        {
            return Err(Error::KexError("malformed Diffie-Hellman group"));
        }

        Ok(group)
    }

    /// The size of the prime, in bits.
    pub fn bits(&self) -> u64 {
        self.p.bits()
    }

    /// Generate an ephemeral keypair in the group.
    pub fn keypair(&self) -> Keypair {
        let mut bytes = [0u8; EXPONENT_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);

        // x in [2, p - 2]
        let bound = &self.p - BigUint::from(3u32);
        let x = BigUint::from_bytes_be(&bytes) % bound + BigUint::from(2u32);
        let public = self.g.modpow(&x, &self.p);

        Keypair { x, public }
    }

    /// Ensure `1 < y < p - 1` for a peer's public value.
    pub fn validate(&self, y: &BigUint) -> Result<()> {
        let one = BigUint::from(1u32);

        if y > &one && y < &(&self.p - &one) {
            Ok(())
        } else {
            Err(Error::KexError("peer public value out of range"))
        }
    }
}

/// An ephemeral Diffie-Hellman keypair.
pub struct Keypair {
    x: BigUint,
    public: BigUint,
}

impl Keypair {
    /// The public value, as a big-endian magnitude.
    pub fn public(&self) -> Vec<u8> {
        self.public.to_bytes_be()
    }

    /// Compute the shared secret with the peer's public value, as a big-endian magnitude.
    pub fn agree(self, group: &Group, peer: &[u8]) -> Result<Vec<u8>> {
        let peer = BigUint::from_bytes_be(peer);
        group.validate(&peer)?;

        Ok(peer.modpow(&self.x, &group.p).to_bytes_be())
    }
}

pub(super) async fn as_client(
    stream: &mut Stream<impl Pipe>,
    mut hash: ExchangeHash,
    config: &Client,
) -> Result<Outcome> {
    let group = Group::group14()?;
    let keypair = group.keypair();
    let e = keypair.public();

    stream
        .send(&KexdhInit {
            e: MpInt::positive(&e),
        })
        .await?;

    let reply: KexdhReply = stream.recv().await?.to()?;
    let f = magnitude(&reply.f)?;
    let secret = secret(keypair.agree(&group, f)?)?;

    hash.string(&reply.k_s).mpint(&e)?.mpint(f)?;
    let outcome = Outcome::new(hash, secret)?;

    verify(config, &reply.k_s, &outcome.hash, &reply.signature)?;

    Ok(outcome)
}

pub(super) async fn as_server(
    stream: &mut Stream<impl Pipe>,
    mut hash: ExchangeHash,
    key: &PrivateKey,
) -> Result<Outcome> {
    let init: KexdhInit = stream.recv().await?.to()?;

    let group = Group::group14()?;
    let keypair = group.keypair();
    let f = keypair.public();

    let e = magnitude(&init.e)?;
    let secret = secret(keypair.agree(&group, e)?)?;
    let k_s = key.public_key().to_bytes()?;

    hash.string(&k_s).mpint(e)?.mpint(&f)?;
    let outcome = Outcome::new(hash, secret)?;

    stream
        .send(&KexdhReply {
            k_s: k_s.into(),
            f: MpInt::positive(&f),
            signature: sign(key, &outcome.hash)?.into(),
        })
        .await?;

    Ok(outcome)
}
