//! The [`Session`], driving the transport layer of a connection.

use futures_time::future::FutureExt;
use ssh_packet::arch::{Ascii, Utf8 as StringUtf8};

use crate::{
    service,
    side::Side,
    stream::Stream,
    trans::{Disconnect, DisconnectReason, KexInit, ServiceAccept, ServiceRequest},
    Encode, Error, Id, Packet, Pipe, Quirks, Result,
};

/// The stages of a [`Session`], from connection to teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Exchanging the identification strings.
    VersionExchange,

    /// Exchanging and negotiating the `SSH_MSG_KEXINIT`s.
    AlgorithmNegotiation,

    /// Running the negotiated key-exchange method.
    KeyExchange,

    /// Switching to the newly derived keys.
    NewKeys,

    /// Keys are in place, the peer is not authenticated yet.
    Authentication,

    /// The peer has been authenticated.
    Established,

    /// The session has been torn down.
    Failed,
}

/// A session wrapping a `stream` to handle **key-exchange** and **[`SSH-TRANS`]** layer messages.
///
/// [`SSH-TRANS`]: https://datatracker.ietf.org/doc/html/rfc4253
pub struct Session<IO, S> {
    stream: Option<Stream<IO>>,
    config: S,

    peer_id: Id,
    quirks: Quirks,
}

impl<IO, S> Session<IO, S>
where
    IO: Pipe,
    S: Side,
{
    /// Create a new [`Session`] from a [`Pipe`] stream and some configuration,
    /// exchanging the identification strings and the first keys.
    pub async fn new(stream: IO, config: S) -> Result<Self> {
        let mut stream = Stream::new(stream, config.timeout(), S::ROLE.opposite());

        config.id().to_async_writer(stream.get_mut()).await?;

        let peer_id = Id::from_async_reader(stream.get_mut(), S::ROLE.opposite())
            .timeout(config.timeout())
            .await
            .map_err(|_| Error::Timeout)??;
        let quirks = Quirks::of(&peer_id);

        tracing::debug!("Session started with peer `{peer_id}`");
        if !quirks.is_empty() {
            tracing::debug!("Working around {quirks:?} for peer `{peer_id}`");
        }

        let mut session = Self {
            stream: Some(stream),
            config,
            peer_id,
            quirks,
        };
        session.kex(None).await?;

        Ok(session)
    }

    /// Access the [`Id`] of the connected peer.
    pub fn peer_id(&self) -> &Id {
        &self.peer_id
    }

    /// The known non-conformances of the connected peer.
    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// Access the configuration of this side.
    pub fn config(&self) -> &S {
        &self.config
    }

    /// Access initial exchange hash.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.stream.as_ref().and_then(Stream::session_id)
    }

    /// The current [`Stage`] of the session.
    pub fn stage(&self) -> Stage {
        self.stream
            .as_ref()
            .map(Stream::stage)
            .unwrap_or(Stage::Failed)
    }

    /// Mark the peer as authenticated.
    pub fn mark_established(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.set_stage(Stage::Established);
        }
    }

    /// Initiate a new key-exchange with the peer, replacing the current keys.
    pub async fn rekey(&mut self) -> Result<()> {
        self.kex(None).await
    }

    async fn kex(&mut self, peerkexinit: Option<Packet>) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::Disconnected);
        };

        let result = self
            .config
            .kex(stream, &self.peer_id, self.quirks, peerkexinit)
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.abort(err).await),
        }
    }

    /// Tear down the session because of `err`,
    /// reporting it to the peer when it isn't the cause of the failure.
    pub async fn abort(&mut self, err: Error) -> Error {
        if let Some(mut stream) = self.stream.take() {
            let silent = matches!(
                err,
                Error::PeerDisconnected { .. } | Error::Disconnected | Error::Timeout | Error::Io(_)
            );

            if !silent {
                let disconnect = Disconnect {
                    reason: err.disconnect_reason(),
                    description: StringUtf8::from(err.to_string()),
                    language: Default::default(),
                };

                if let Err(failure) = stream.send(&disconnect).await {
                    tracing::debug!("Unable to report the failure to the peer: {failure}");
                }
            }

            tracing::debug!("Session torn down: {err}");
        }

        err
    }

    /// Receive a _packet_ from the connected peer, running the key-exchange when required.
    ///
    /// # Cancel safety
    /// This method is **not cancel-safe**, if used within a [`futures::select`] call,
    /// some data may be partially received.
    pub async fn recv(&mut self) -> Result<Packet> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Err(Error::Disconnected);
            };

            if let Some(packet) = stream.undefer() {
                return Ok(packet);
            }

            if stream.is_rekeyable() {
                self.kex(None).await?;

                continue;
            }

            match stream.recv().await {
                Ok(packet) if packet.is::<KexInit>() => self.kex(Some(packet)).await?,
                Ok(packet) => return Ok(packet),
                Err(err) => return Err(self.abort(err).await),
            }
        }
    }

    /// Queue a _packet_ to be sent to the connected peer on the next [`Session::flush`].
    pub fn feed(&mut self, message: &impl Encode) -> Result<()> {
        self.feed_payload(&message.to_payload()?)
    }

    /// Queue a raw payload to be sent to the connected peer on the next [`Session::flush`].
    pub fn feed_payload(&mut self, payload: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::Disconnected);
        };

        stream.feed_payload(payload)
    }

    /// Send the queued _packets_ to the connected peer, running the key-exchange when required.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::Disconnected);
        };

        if let Err(err) = stream.flush().await {
            return Err(self.abort(err).await);
        }

        if stream.is_rekeyable() {
            self.kex(None).await?;
        }

        Ok(())
    }

    /// Send a _packet_ to the connected peer.
    pub async fn send(&mut self, message: &impl Encode) -> Result<()> {
        self.feed(message)?;
        self.flush().await
    }

    /// Send a _disconnect message_ to the peer and shutdown the session.
    pub async fn disconnect(
        &mut self,
        reason: DisconnectReason,
        description: impl Into<String>,
    ) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Err(Error::Disconnected);
        };

        let description = description.into();
        tracing::debug!("Disconnecting with `{reason:?}`: {description}");

        stream
            .send(&Disconnect {
                reason,
                description: StringUtf8::from(description),
                language: Default::default(),
            })
            .await
    }

    /// Handle a _service_ for the peer.
    pub async fn handle<H>(mut self, mut service: H) -> Result<H::Ok<IO, S>, H::Err>
    where
        H: service::Handler,
    {
        let packet = self.recv().await?;

        let ServiceRequest { service_name } = match packet.to() {
            Ok(request) => request,
            Err(err) => return Err(self.abort(err).await.into()),
        };

        if &*service_name != H::SERVICE_NAME {
            return Err(self
                .abort(Error::UnknownService {
                    expected: H::SERVICE_NAME,
                    got: service_name.to_string(),
                })
                .await
                .into());
        }

        self.send(&ServiceAccept { service_name }).await?;

        service.on_request(self).await
    }

    /// Request a _service_ from the peer.
    pub async fn request<R>(mut self, mut service: R) -> Result<R::Ok<IO, S>, R::Err>
    where
        R: service::Request,
    {
        self.send(&ServiceRequest {
            service_name: Ascii::borrowed_unchecked(R::SERVICE_NAME),
        })
        .await?;

        let packet = self.recv().await?;

        let ServiceAccept { service_name } = match packet.to() {
            Ok(accept) => accept,
            Err(err) => return Err(self.abort(err).await.into()),
        };

        if &*service_name != R::SERVICE_NAME {
            return Err(self
                .abort(Error::UnknownService {
                    expected: R::SERVICE_NAME,
                    got: service_name.to_string(),
                })
                .await
                .into());
        }

        service.on_accept(self).await
    }
}
