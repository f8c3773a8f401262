//! Session's [`Side`]s, either [`Client`] or [`Server`].

use futures::Future;
use futures_time::time::Duration;
use ssh_packet::arch::NameList;

use crate::{
    algorithm::{
        kex::{Exchange, ExchangeHash, KexMeta},
        Kex, Key, Negociate,
    },
    stream::{Stream, TransportPair},
    trans::{KexInit, NewKeys},
    Encode, Error, Id, MessageType, Packet, Pipe, Quirks, Result, Role, Stage,
};

pub mod client;
use client::Client;

pub mod server;
use server::Server;

/// Whether the message number belongs to the key-exchange range.
fn is_kex(kind: MessageType) -> bool {
    (20..=49).contains(&kind.0)
}

/// The first, preferred, name of a name-list.
fn first(list: &NameList) -> Option<String> {
    list.into_iter().next().map(|name| name.to_string())
}

mod private {
    use super::*;

    pub trait Sealed {
        /// Run the negotiated key-exchange method from this side.
        fn exchange(
            &self,
            stream: &mut Stream<impl Pipe>,
            exchange: Exchange,
        ) -> impl Future<Output = Result<TransportPair>>;
    }
}

/// A side of the SSH protocol, either [`Client`] or [`Server`].
pub trait Side: private::Sealed {
    /// The role of this side in the session.
    const ROLE: Role;

    /// Get the [`Id`] for this session.
    fn id(&self) -> &Id;

    /// Get the _timeout_ for this session.
    fn timeout(&self) -> Duration;

    /// Generate a [`KexInit`] message from the config.
    fn kexinit(&self) -> KexInit;

    /// Perform the key-exchange from this side,
    /// `peerkexinit` being the peer's `SSH_MSG_KEXINIT` when it initiated the exchange.
    fn kex(
        &self,
        stream: &mut Stream<impl Pipe>,
        peer_id: &Id,
        quirks: Quirks,
        peerkexinit: Option<Packet>,
    ) -> impl Future<Output = Result<()>> {
        async move {
            tracing::debug!("Starting key-exchange procedure");

            let resume = match stream.stage() {
                stage @ (Stage::Authentication | Stage::Established) => stage,
                _ => Stage::Authentication,
            };
            stream.set_stage(Stage::AlgorithmNegotiation);

            let kexinit = self.kexinit();
            let payload = kexinit.to_payload()?;
            stream.feed_payload(&payload)?;
            stream.flush().await?;

            let peerpacket = match peerkexinit {
                Some(packet) => packet,
                None => loop {
                    let packet = stream.recv().await?;

                    // The peer may still be sending traffic when we initiate a re-key.
                    match packet.kind() {
                        MessageType::KEXINIT => break packet,
                        kind if stream.session_id().is_some() && !is_kex(kind) => {
                            stream.defer(packet)?
                        }
                        kind => {
                            return Err(Error::UnexpectedMessage {
                                role: stream.peer(),
                                expected: MessageType::KEXINIT,
                                got: kind,
                            })
                        }
                    }
                },
            };
            let peerkexinit = peerpacket.to::<KexInit>()?;

            let ((clientkex, i_c, v_c), (serverkex, i_s, v_s)) = match Self::ROLE {
                Role::Client => (
                    (&kexinit, payload.as_slice(), self.id()),
                    (&peerkexinit, peerpacket.payload(), peer_id),
                ),
                Role::Server => (
                    (&peerkexinit, peerpacket.payload(), peer_id),
                    (&kexinit, payload.as_slice(), self.id()),
                ),
            };

            let kex = Kex::negociate(clientkex, serverkex)?;
            let host = Key::negociate(clientkex, serverkex)?;
            let client = KexMeta::new::<Client>(clientkex, serverkex)?;
            let server = KexMeta::new::<Server>(clientkex, serverkex)?;

            tracing::debug!(
                "Negociated `{}` with `{}` host key, client-to-server: {client:?}, server-to-client: {server:?}",
                kex.as_ref(),
                host.as_str(),
            );

            let mut hash = ExchangeHash::default();
            hash.string(v_c.to_string().as_bytes())
                .string(v_s.to_string().as_bytes())
                .string(i_c)
                .string(i_s);

            if *peerkexinit.first_kex_packet_follows {
                let guessed = first(&peerkexinit.kex_algorithms).as_deref() == Some(kex.as_ref())
                    && first(&peerkexinit.server_host_key_algorithms).as_deref()
                        == Some(host.as_str());

                if !guessed {
                    let packet = stream.recv().await?;

                    tracing::debug!("Discarded {:?}, following a wrong key-exchange guess", packet.kind());
                }
            }

            stream.set_stage(Stage::KeyExchange);

            let transport = self
                .exchange(
                    stream,
                    Exchange {
                        kex,
                        host,
                        client,
                        server,
                        hash,
                        quirks,
                    },
                )
                .await?;

            stream.set_stage(Stage::NewKeys);

            stream.send(&NewKeys).await?;
            stream.with_tx(transport.tx);

            stream.recv().await?.to::<NewKeys>()?;
            stream.with_rx(transport.rx);

            tracing::debug!("Key exchange success");

            stream.set_stage(resume);

            Ok(())
        }
    }
}
