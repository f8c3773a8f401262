use ssh_key::PrivateKey;
use ssh_packet::arch::MpInt;

use crate::{
    side::client::Client,
    stream::Stream,
    trans::{KexGexGroup, KexGexInit, KexGexReply, KexGexRequest, KexGexRequestOld},
    Error, Pipe, Quirks, Result,
};

use super::{dh::Group, magnitude, secret, sign, verify, ExchangeHash, GexRange, Outcome};

/// Feed the requested range, only `n` for legacy requests.
fn range(hash: &mut ExchangeHash, range: &GexRange, old: bool) {
    if old {
        hash.u32(range.n);
    } else {
        hash.u32(range.min).u32(range.n).u32(range.max);
    }
}

pub async fn as_client(
    stream: &mut Stream<impl Pipe>,
    mut hash: ExchangeHash,
    config: &Client,
    quirks: Quirks,
) -> Result<Outcome> {
    let request = config.gex;
    let old = quirks.contains(Quirks::OLD_GEX);

    if old {
        tracing::debug!("Peer predates group-exchange ranges, requesting {} bits", request.n);

        stream.send(&KexGexRequestOld { n: request.n }).await?;
    } else {
        stream
            .send(&KexGexRequest {
                min: request.min,
                n: request.n,
                max: request.max,
            })
            .await?;
    }

    let params: KexGexGroup = stream.recv().await?.to()?;
    let (p, g) = (magnitude(&params.p)?, magnitude(&params.g)?);
    let group = Group::from_bytes(p, g)?;

    if !request.fits(group.bits()) {
        return Err(Error::KexError("group size outside of the requested range"));
    }

    let keypair = group.keypair();
    let e = keypair.public();

    stream
        .send(&KexGexInit {
            e: MpInt::positive(&e),
        })
        .await?;

    let reply: KexGexReply = stream.recv().await?.to()?;
    let f = magnitude(&reply.f)?;
    let secret = secret(keypair.agree(&group, f)?)?;

    hash.string(&reply.k_s);
    range(&mut hash, &request, old);
    hash.mpint(p)?.mpint(g)?.mpint(&e)?.mpint(f)?;
    let outcome = Outcome::new(hash, secret)?;

    verify(config, &reply.k_s, &outcome.hash, &reply.signature)?;

    Ok(outcome)
}

pub async fn as_server(
    stream: &mut Stream<impl Pipe>,
    mut hash: ExchangeHash,
    key: &PrivateKey,
) -> Result<Outcome> {
    let packet = stream.recv().await?;
    let (request, old) = if packet.is::<KexGexRequestOld>() {
        let KexGexRequestOld { n } = packet.to()?;

        (GexRange { min: n, n, max: n }, true)
    } else {
        let KexGexRequest { min, n, max } = packet.to()?;

        if min > n || n > max {
            return Err(Error::KexError("malformed group-exchange range"));
        }

        (GexRange { min, n, max }, false)
    };

    // Only the 2048-bit group is served, the client decides whether it fits.
    let group = Group::group14()?;
    if !request.fits(group.bits()) {
        tracing::debug!(
            "Peer requested {}..={} bits, falling back to the {}-bit group",
            request.min,
            request.max,
            group.bits()
        );
    }

    let p = group.p.to_bytes_be();
    let g = group.g.to_bytes_be();

    stream
        .send(&KexGexGroup {
            p: MpInt::positive(&p),
            g: MpInt::positive(&g),
        })
        .await?;

    let init: KexGexInit = stream.recv().await?.to()?;

    let keypair = group.keypair();
    let f = keypair.public();

    let e = magnitude(&init.e)?;
    let secret = secret(keypair.agree(&group, e)?)?;
    let k_s = key.public_key().to_bytes()?;

    hash.string(&k_s);
    range(&mut hash, &request, old);
    hash.mpint(&p)?.mpint(&g)?.mpint(e)?.mpint(&f)?;
    let outcome = Outcome::new(hash, secret)?;

    stream
        .send(&KexGexReply {
            k_s: k_s.into(),
            f: MpInt::positive(&f),
            signature: sign(key, &outcome.hash)?.into(),
        })
        .await?;

    Ok(outcome)
}
