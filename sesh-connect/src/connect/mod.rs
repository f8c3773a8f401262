//! Facilities to interract with the SSH _connect_ protocol.

use std::collections::{BTreeMap, VecDeque};

use sesh::{
    side::Side,
    trans::{DisconnectReason, Unimplemented},
    Decode, Encode, MessageType, Packet, Pipe, Session,
};

use crate::{
    channel::{request, Channel, Half, LocalWindow, State, MAXIMUM_PACKET_SIZE},
    message::{
        ChannelClose, ChannelData, ChannelEof, ChannelExtendedData, ChannelFailure, ChannelOpen,
        ChannelOpenConfirmation, ChannelOpenFailure, ChannelOpenFailureReason, ChannelRequest,
        ChannelRequestContext, ChannelSuccess, ChannelType, ChannelWindowAdjust, GlobalRequest,
        ForwardingSuccess, GlobalRequestContext, RequestFailure, RequestSuccess,
    },
    Error, Result,
};

pub mod channel_open;
pub mod global_request;

/// The maximum count of channels simultaneously opened in a connection.
pub const MAX_CHANNELS: usize = 4;

/// A control message waiting to be sent along with the next outgoing packet.
#[derive(Debug)]
struct Pending {
    kind: MessageType,
    payload: Vec<u8>,
}

/// Where the data received on a channel goes.
#[derive(Debug, Clone, Copy)]
enum Sink {
    Data,
    Extended,
    Discard,
}

/// A wrapper around a [`Session`] to interract with the connect layer.
///
/// The connection is driven sequentially: inbound messages are processed
/// whenever an operation waits on the peer, or explicitly with [`Connect::process`].
pub struct Connect<IO, S> {
    session: Session<IO, S>,

    channels: BTreeMap<u32, Channel>,
    next_id: u32,
    opened: VecDeque<u32>,

    read: Option<u32>,
    write: Option<u32>,
    pending: Option<Pending>,

    channel_open_hook: Box<dyn channel_open::Hook>,
    global_request_hook: Box<dyn global_request::Hook>,
    channel_request_hook: Box<dyn request::Hook>,
}

impl<IO, S> Connect<IO, S>
where
    IO: Pipe,
    S: Side,
{
    pub(super) fn new(session: Session<IO, S>) -> Self {
        Self {
            session,

            channels: Default::default(),
            next_id: 0,
            opened: Default::default(),

            read: None,
            write: None,
            pending: None,

            channel_open_hook: Box::new(()),
            global_request_hook: Box::new(()),
            channel_request_hook: Box::new(()),
        }
    }

    /// Register the hook for _channel open requests_ from the peer.
    pub fn on_channel_open(mut self, hook: impl channel_open::Hook + 'static) -> Self {
        self.channel_open_hook = Box::new(hook);

        self
    }

    /// Register the hook for _global requests_ from the peer.
    pub fn on_global_request(mut self, hook: impl global_request::Hook + 'static) -> Self {
        self.global_request_hook = Box::new(hook);

        self
    }

    /// Register the hook for _channel requests_ from the peer.
    pub fn on_channel_request(mut self, hook: impl request::Hook + 'static) -> Self {
        self.channel_request_hook = Box::new(hook);

        self
    }

    /// Access the underlying [`Session`].
    pub fn session(&self) -> &Session<IO, S> {
        &self.session
    }

    /// Access the channel `id`.
    pub fn channel(&self, id: u32) -> Result<&Channel> {
        self.channels.get(&id).ok_or(Error::ChannelNotFound(id))
    }

    /// Access the channel `id` mutably, to update its type and arguments.
    pub fn channel_mut(&mut self, id: u32) -> Result<&mut Channel> {
        self.channels.get_mut(&id).ok_or(Error::ChannelNotFound(id))
    }

    /// Iterate over the channels of the connection.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// The channel currently selected for reading or writing.
    pub fn selected(&self, half: Half) -> Option<u32> {
        match half {
            Half::Read | Half::Both => self.read,
            Half::Write => self.write,
        }
    }

    /// The type of the control message waiting to be sent, if any.
    pub fn pending(&self) -> Option<MessageType> {
        self.pending.as_ref().map(|pending| pending.kind)
    }

    /// Select the channel `id` for reading, writing or both.
    pub fn select(&mut self, id: u32, half: Half) -> Result<()> {
        if !self.channels.contains_key(&id) {
            return Err(Error::ChannelNotFound(id));
        }

        if matches!(half, Half::Read | Half::Both) {
            self.read = Some(id);
        }
        if matches!(half, Half::Write | Half::Both) {
            self.write = Some(id);
        }

        Ok(())
    }

    /// Queue a control message to be sent along with the next outgoing packet,
    /// sending the previously queued one right away.
    pub async fn enqueue(&mut self, message: &impl Encode) -> Result<()> {
        self.flush().await?;

        let payload = message.to_payload()?;
        let kind = MessageType(payload.first().copied().unwrap_or_default());

        tracing::trace!("Queued {kind} for the next packet");

        self.pending = Some(Pending { kind, payload });

        Ok(())
    }

    /// Send the queued control message, if any.
    pub async fn flush(&mut self) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            self.session.feed_payload(&pending.payload)?;
            self.session.flush().await?;
        }

        Ok(())
    }

    async fn send(&mut self, message: &impl Encode) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            self.session.feed_payload(&pending.payload)?;
        }

        self.session.feed(message)?;
        self.session.flush().await?;

        Ok(())
    }

    async fn recv(&mut self) -> Result<Packet> {
        self.flush().await?;

        Ok(self.session.recv().await?)
    }

    async fn parse<M: Decode>(&mut self, packet: &Packet) -> Result<M> {
        match packet.to() {
            Ok(message) => Ok(message),
            Err(err) => Err(self.session.abort(err).await.into()),
        }
    }

    fn allocate(&mut self) -> Result<u32> {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).ok_or(sesh::Error::Overflow {
            what: "channel numbers",
            limit: u32::MAX as usize,
        })?;

        Ok(id)
    }

    fn channel_for(&mut self, recipient_channel: u32) -> Result<&mut Channel> {
        self.channels
            .values_mut()
            .find(|channel| channel.read_id() == recipient_channel)
            .ok_or(Error::ChannelNotFound(recipient_channel))
    }

    fn remove(&mut self, id: u32) {
        if self.channels.remove(&id).is_some() {
            tracing::debug!("Channel #{id} released");
        }

        if self.read == Some(id) {
            self.read = None;
        }
        if self.write == Some(id) {
            self.write = None;
        }
    }

    /// Ask the peer to open a channel of type `kind`, selecting it for reading and writing.
    pub async fn open(&mut self, kind: ChannelType) -> Result<u32> {
        if self.channels.len() >= MAX_CHANNELS {
            let err = sesh::Error::Overflow {
                what: "channels",
                limit: MAX_CHANNELS,
            };

            return Err(self.session.abort(err).await.into());
        }

        let id = self.allocate()?;
        let local = LocalWindow::for_peer(self.session.quirks());

        tracing::debug!("Opening channel #{id} of type `{}`", kind.name());

        self.send(&ChannelOpen {
            sender_channel: id,
            initial_window_size: local.size(),
            maximum_packet_size: MAXIMUM_PACKET_SIZE,
            kind: kind.clone(),
        })
        .await?;

        loop {
            let packet = self.recv().await?;

            if packet.is::<ChannelOpenConfirmation>() {
                let confirmation: ChannelOpenConfirmation = self.parse(&packet).await?;

                if confirmation.recipient_channel != id {
                    tracing::warn!(
                        "Ignoring confirmation for unknown channel #{}",
                        confirmation.recipient_channel
                    );

                    continue;
                }

                let channel = self.insert(
                    id,
                    confirmation.sender_channel,
                    kind,
                    local,
                    confirmation.initial_window_size,
                    confirmation.maximum_packet_size,
                );
                tracing::debug!(
                    "Channel #{id} opened as %{}, window {}/{}",
                    channel.write_id(),
                    channel.local_window().size(),
                    channel.remote_window().count()
                );

                self.read = Some(id);
                self.write = Some(id);

                break Ok(id);
            } else if packet.is::<ChannelOpenFailure>() {
                let failure: ChannelOpenFailure = self.parse(&packet).await?;

                if failure.recipient_channel != id {
                    tracing::warn!(
                        "Ignoring open failure for unknown channel #{}",
                        failure.recipient_channel
                    );

                    continue;
                }

                tracing::debug!("Channel #{id} refused by the peer: {:?}", failure.reason);

                break Err(Error::ChannelOpenFailure {
                    reason: failure.reason,
                    description: failure.description.to_string(),
                });
            } else {
                self.dispatch(packet).await?;
            }
        }
    }

    fn insert(
        &mut self,
        id: u32,
        peer_id: u32,
        kind: ChannelType,
        local: LocalWindow,
        remote: u32,
        maximum_packet_size: u32,
    ) -> &Channel {
        let asymmetric = self
            .session
            .quirks()
            .contains(sesh::Quirks::ASYMMETRIC_CHANNEL_IDS);
        if asymmetric {
            tracing::debug!("Peer addresses channel #{id} with its own number %{peer_id}");
        }

        self.channels.entry(id).or_insert(Channel::new(
            id,
            peer_id,
            asymmetric,
            kind,
            (local, remote.into()),
            maximum_packet_size,
        ))
    }

    /// Wait for the peer to open a channel accepted by the [`channel_open::Hook`],
    /// selecting it for reading and writing.
    pub async fn accept(&mut self) -> Result<u32> {
        loop {
            if let Some(id) = self.opened.pop_front() {
                if self.channels.contains_key(&id) {
                    self.read = Some(id);
                    self.write = Some(id);

                    break Ok(id);
                }

                continue;
            }

            self.process().await?;
        }
    }

    /// Send a _channel request_ on the channel selected for writing, and wait for the reply.
    pub async fn request(&mut self, context: ChannelRequestContext) -> Result<request::Response> {
        let (id, recipient_channel) = self.writable("requests")?;

        tracing::debug!("Requesting `{}` on channel #{id}", context.name());

        self.send(&ChannelRequest {
            recipient_channel,
            want_reply: true,
            context,
        })
        .await?;

        let ticket = self.channel_mut(id)?.replies.expect();

        loop {
            let channel = self.channel_mut(id)?;

            if let Some(success) = channel.replies.take(ticket) {
                break Ok(if success {
                    request::Response::Success
                } else {
                    request::Response::Failure
                });
            }
            if channel.state().contains(State::READ_CLOSED) {
                break Err(Error::ChannelClosed(id));
            }

            self.process().await?;
        }
    }

    /// Queue a _channel request_ on the channel selected for writing, without waiting for a reply.
    pub async fn notify(&mut self, context: ChannelRequestContext) -> Result<()> {
        let (_, recipient_channel) = self.writable("requests")?;

        self.enqueue(&ChannelRequest {
            recipient_channel,
            want_reply: false,
            context,
        })
        .await
    }

    /// Send a _global request_ to the peer, and wait for the reply.
    pub async fn global_request(
        &mut self,
        context: GlobalRequestContext,
    ) -> Result<global_request::Response> {
        tracing::debug!("Requesting global `{}`", context.name());

        self.send(&GlobalRequest {
            want_reply: true,
            context,
        })
        .await?;

        loop {
            let packet = self.recv().await?;

            if packet.is::<RequestSuccess>() {
                // The bound port is only there for `tcpip-forward` on port `0`
                let bound_port = if packet.body().len() >= 4 {
                    let ForwardingSuccess { bound_port } = self.parse(&packet).await?;

                    Some(bound_port)
                } else {
                    None
                };

                break Ok(global_request::Response::Success(bound_port));
            } else if packet.is::<RequestFailure>() {
                break Ok(global_request::Response::Failure);
            }

            self.dispatch(packet).await?;
        }
    }

    fn writable(&self, what: &'static str) -> Result<(u32, u32)> {
        let id = self.write.ok_or(Error::NoChannelSelected(what))?;
        let channel = self.channel(id)?;

        if channel
            .state()
            .intersects(State::EOF_SENT | State::WRITE_CLOSED)
        {
            return Err(Error::ChannelClosed(id));
        }

        Ok((id, channel.write_id()))
    }

    /// Write data to the channel selected for writing,
    /// processing inbound messages while the peer's window is exhausted.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.transmit(buf, None, true).await
    }

    /// Write _extended data_ (`stderr`) to the channel selected for writing,
    /// processing inbound messages while the peer's window is exhausted.
    pub async fn write_ext(&mut self, buf: &[u8]) -> Result<usize> {
        self.transmit(buf, Some(ChannelExtendedData::STDERR), true)
            .await
    }

    /// Write data to the channel selected for writing, as much as the peer's window allows,
    /// returning `0` when it is exhausted.
    pub async fn try_write(&mut self, buf: &[u8]) -> Result<usize> {
        self.transmit(buf, None, false).await
    }

    /// Write all of `buf` to the channel selected for writing.
    pub async fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let written = self.write(buf).await?;
            buf = &buf[written..];
        }

        Ok(())
    }

    async fn transmit(&mut self, buf: &[u8], data_type: Option<u32>, block: bool) -> Result<usize> {
        let (id, recipient_channel) = self.writable("writing")?;

        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let channel = self.channel_mut(id)?;
            if channel.state().contains(State::WRITE_CLOSED) {
                break Err(Error::ChannelClosed(id));
            }

            let max = buf.len().min(channel.maximum_packet_size() as usize);
            let reserved = channel.remote_window_mut().reserve(max) as usize;

            if reserved > 0 {
                let data = buf[..reserved].to_vec();

                tracing::trace!("Sending {reserved} bytes on channel #{id}");

                match data_type {
                    None => {
                        self.send(&ChannelData {
                            recipient_channel,
                            data: data.into(),
                        })
                        .await?
                    }
                    Some(data_type) => {
                        self.send(&ChannelExtendedData {
                            recipient_channel,
                            data_type,
                            data,
                        })
                        .await?
                    }
                }

                break Ok(reserved);
            }

            if !block {
                break Ok(0);
            }

            tracing::trace!("Window of channel #{id} is exhausted, waiting for an adjust");

            self.process().await?;
        }
    }

    /// Read data from the channel selected for reading, returning `0` once the peer sent EOF.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.receive(buf, false).await
    }

    /// Read _extended data_ (`stderr`) from the channel selected for reading,
    /// returning `0` once the peer sent EOF.
    pub async fn read_ext(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.receive(buf, true).await
    }

    async fn receive(&mut self, buf: &mut [u8], extended: bool) -> Result<usize> {
        let id = self.read.ok_or(Error::NoChannelSelected("reading"))?;

        loop {
            let channel = self.channel_mut(id)?;
            let pending = if extended {
                &mut channel.extended
            } else {
                &mut channel.data
            };

            if !pending.is_empty() {
                let len = buf.len().min(pending.len());
                buf[..len].copy_from_slice(&pending[..len]);
                pending.drain(..len);

                self.adjust(id).await?;

                break Ok(len);
            }

            if buf.is_empty() || channel.is_eof() {
                break Ok(0);
            }

            self.process().await?;
        }
    }

    async fn adjust(&mut self, id: u32) -> Result<()> {
        let channel = self.channel_mut(id)?;
        if channel.state().contains(State::WRITE_CLOSED) {
            return Ok(());
        }

        let buffered = channel.pending();
        if let Some(bytes_to_add) = channel.local_window_mut().adjustable(buffered) {
            let recipient_channel = channel.write_id();

            tracing::trace!("Adjusting the window of channel #{id} by {bytes_to_add} bytes");

            self.send(&ChannelWindowAdjust {
                recipient_channel,
                bytes_to_add,
            })
            .await?;
        }

        Ok(())
    }

    /// Signal the peer that no more data will be sent on the channel `id`.
    pub async fn shutdown(&mut self, id: u32) -> Result<()> {
        let channel = self.channel_mut(id)?;
        if channel
            .state()
            .intersects(State::EOF_SENT | State::WRITE_CLOSED)
        {
            return Ok(());
        }

        channel.set(State::EOF_SENT);
        let recipient_channel = channel.write_id();

        tracing::debug!("Sending EOF on channel #{id}");

        self.send(&ChannelEof { recipient_channel }).await
    }

    /// Close the channel `id`, tearing down the session if it was the last one.
    ///
    /// The channel is released once the peer closed it too, which is awaited
    /// before tearing down the session.
    pub async fn close(&mut self, id: u32) -> Result<()> {
        let channel = self.channel_mut(id)?;

        if !channel.state().contains(State::WRITE_CLOSED) {
            channel.set(State::WRITE_CLOSED);
            let recipient_channel = channel.write_id();

            tracing::debug!("Closing channel #{id}");

            self.send(&ChannelClose { recipient_channel }).await?;
        }

        let last = self
            .channels
            .values()
            .all(|channel| channel.state().contains(State::WRITE_CLOSED));

        if last {
            while self
                .channels
                .get(&id)
                .is_some_and(|channel| !channel.state().contains(State::READ_CLOSED))
            {
                self.process().await?;
            }
        }

        if self.channels.get(&id).is_some_and(Channel::is_closed) {
            self.remove(id);
        }

        if last {
            tracing::debug!("Last channel closed, tearing down the session");

            if let Err(err) = self
                .session
                .disconnect(DisconnectReason::ByApplication, "All channels have been closed")
                .await
            {
                tracing::debug!("Unable to notify the peer of the teardown: {err}");
            }
        }

        Ok(())
    }

    /// Receive and process a single message from the peer.
    pub async fn process(&mut self) -> Result<()> {
        let packet = self.recv().await?;

        self.dispatch(packet).await
    }

    async fn dispatch(&mut self, packet: Packet) -> Result<()> {
        match packet.kind() {
            MessageType::GLOBAL_REQUEST => {
                let request = self.parse(&packet).await?;
                self.handle_global_request(request).await
            }
            MessageType::CHANNEL_OPEN => {
                let open = self.parse(&packet).await?;
                self.handle_channel_open(open).await
            }
            MessageType::CHANNEL_REQUEST => {
                let request = self.parse(&packet).await?;
                self.handle_channel_request(request).await
            }
            MessageType::CHANNEL_WINDOW_ADJUST => {
                let ChannelWindowAdjust {
                    recipient_channel,
                    bytes_to_add,
                } = self.parse(&packet).await?;

                let channel = self.channel_for(recipient_channel)?;
                let id = channel.id();

                channel
                    .remote_window_mut()
                    .replenish(bytes_to_add)
                    .ok_or(Error::WindowExceeded(id))?;

                tracing::trace!("Peer added {bytes_to_add} bytes to the window of channel #{id}");

                Ok(())
            }
            MessageType::CHANNEL_DATA => {
                let ChannelData {
                    recipient_channel,
                    data,
                } = self.parse(&packet).await?;

                self.handle_data(recipient_channel, data.into_vec(), Sink::Data)
            }
            MessageType::CHANNEL_EXTENDED_DATA => {
                let ChannelExtendedData {
                    recipient_channel,
                    data_type,
                    data,
                } = self.parse(&packet).await?;

                let sink = if data_type == ChannelExtendedData::STDERR {
                    Sink::Extended
                } else {
                    tracing::debug!("Discarding extended data of unknown type {data_type}");

                    Sink::Discard
                };

                self.handle_data(recipient_channel, data, sink)
            }
            MessageType::CHANNEL_EOF => {
                let ChannelEof { recipient_channel } = self.parse(&packet).await?;

                let channel = self.channel_for(recipient_channel)?;
                channel.set(State::EOF_RECEIVED);

                tracing::debug!("Peer sent EOF on channel #{}", channel.id());

                Ok(())
            }
            MessageType::CHANNEL_CLOSE => {
                let ChannelClose { recipient_channel } = self.parse(&packet).await?;

                self.handle_close(recipient_channel).await
            }
            kind @ (MessageType::CHANNEL_SUCCESS | MessageType::CHANNEL_FAILURE) => {
                let recipient_channel = if kind == MessageType::CHANNEL_SUCCESS {
                    self.parse::<ChannelSuccess>(&packet).await?.recipient_channel
                } else {
                    self.parse::<ChannelFailure>(&packet).await?.recipient_channel
                };

                let channel = self.channel_for(recipient_channel)?;
                if !channel.replies.answer(kind == MessageType::CHANNEL_SUCCESS) {
                    tracing::warn!(
                        "Discarding unsolicited {kind} on channel #{}",
                        channel.id()
                    );
                }

                Ok(())
            }
            kind @ (MessageType::REQUEST_SUCCESS
            | MessageType::REQUEST_FAILURE
            | MessageType::CHANNEL_OPEN_CONFIRMATION
            | MessageType::CHANNEL_OPEN_FAILURE) => {
                tracing::warn!("Ignoring unsolicited {kind} from the peer");

                Ok(())
            }
            kind => {
                tracing::warn!("Unhandled {kind} from the peer, reporting it as unimplemented");

                self.send(&Unimplemented { seq: packet.seq() }).await
            }
        }
    }

    fn handle_data(&mut self, recipient_channel: u32, data: Vec<u8>, sink: Sink) -> Result<()> {
        let channel = self.channel_for(recipient_channel)?;
        let id = channel.id();

        let len = u32::try_from(data.len()).map_err(|_| Error::WindowExceeded(id))?;
        channel
            .local_window_mut()
            .consume(len)
            .ok_or(Error::WindowExceeded(id))?;

        if channel.is_eof() {
            tracing::warn!("Dropping {len} bytes received after EOF on channel #{id}");

            return Ok(());
        }

        match sink {
            Sink::Data => {
                tracing::trace!("Received {len} bytes on channel #{id}");

                channel.data.extend_from_slice(&data);
            }
            Sink::Extended => {
                tracing::trace!("Received {len} bytes of extended data on channel #{id}");

                channel.extended.extend_from_slice(&data);
            }
            Sink::Discard => (),
        }

        Ok(())
    }

    async fn handle_close(&mut self, recipient_channel: u32) -> Result<()> {
        let channel = self.channel_for(recipient_channel)?;
        let id = channel.id();
        channel.set(State::READ_CLOSED);

        tracing::debug!("Peer closed channel #{id}");

        if channel.state().contains(State::WRITE_CLOSED) {
            self.remove(id);
        } else {
            channel.set(State::WRITE_CLOSED);
            let recipient_channel = channel.write_id();

            self.send(&ChannelClose { recipient_channel }).await?;
        }

        Ok(())
    }

    async fn handle_channel_open(&mut self, open: ChannelOpen) -> Result<()> {
        let ChannelOpen {
            sender_channel,
            initial_window_size,
            maximum_packet_size,
            kind,
        } = open;

        tracing::debug!("Peer requested to open channel %{sender_channel}: {kind:?}");

        let outcome = if self.channels.len() >= MAX_CHANNELS {
            channel_open::Outcome::Reject {
                reason: ChannelOpenFailureReason::ResourceShortage,
                description: format!("Too many channels, the limit is {MAX_CHANNELS}"),
            }
        } else {
            self.channel_open_hook.on_request(&kind)
        };

        match outcome {
            channel_open::Outcome::Accept => {
                let id = self.allocate()?;
                let local = LocalWindow::for_peer(self.session.quirks());

                self.insert(
                    id,
                    sender_channel,
                    kind,
                    local,
                    initial_window_size,
                    maximum_packet_size,
                );
                self.opened.push_back(id);

                tracing::debug!("Channel opened as #{id}:%{sender_channel}");

                self.send(&ChannelOpenConfirmation {
                    recipient_channel: sender_channel,
                    sender_channel: id,
                    initial_window_size: local.size(),
                    maximum_packet_size: MAXIMUM_PACKET_SIZE,
                })
                .await
            }
            channel_open::Outcome::Reject {
                reason,
                description,
            } => {
                tracing::debug!("Channel open refused for %{sender_channel}: {reason:?}");

                self.send(&ChannelOpenFailure {
                    recipient_channel: sender_channel,
                    reason,
                    description: description.into(),
                    language: Default::default(),
                })
                .await
            }
        }
    }

    async fn handle_channel_request(&mut self, request: ChannelRequest) -> Result<()> {
        let ChannelRequest {
            recipient_channel,
            want_reply,
            context,
        } = request;

        let channel = self
            .channels
            .values_mut()
            .find(|channel| channel.read_id() == recipient_channel)
            .ok_or(Error::ChannelNotFound(recipient_channel))?;
        let id = channel.id();

        tracing::debug!("Peer requested `{}` on channel #{id}", context.name());

        let response = match &context {
            ChannelRequestContext::ExitStatus { code } => {
                channel.set_exit_status(*code);

                request::Response::Success
            }
            context => self.channel_request_hook.process(id, context),
        };

        if !want_reply || channel.state().contains(State::WRITE_CLOSED) {
            return Ok(());
        }

        let recipient_channel = channel.write_id();
        match response {
            request::Response::Success => self.send(&ChannelSuccess { recipient_channel }).await,
            request::Response::Failure => {
                tracing::warn!("Refused `{}` on channel #{id}", context.name());

                self.send(&ChannelFailure { recipient_channel }).await
            }
        }
    }

    async fn handle_global_request(&mut self, request: GlobalRequest) -> Result<()> {
        let GlobalRequest {
            want_reply,
            context,
        } = request;

        let outcome = match &context {
            GlobalRequestContext::Other { name, .. } => {
                tracing::warn!("Refusing unknown global request `{name}`");

                global_request::Outcome::Reject
            }
            context => self.global_request_hook.process(context),
        };

        if !want_reply {
            return Ok(());
        }

        match outcome {
            global_request::Outcome::Accept { bound_port } => {
                if matches!(
                    context,
                    GlobalRequestContext::TcpipForward { bind_port: 0, .. }
                ) {
                    self.send(&ForwardingSuccess { bound_port }).await
                } else {
                    self.send(&RequestSuccess).await
                }
            }
            global_request::Outcome::Reject => self.send(&RequestFailure).await,
        }
    }
}
