//! Facilities to interract with SSH channels.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::message::ChannelType;

pub mod request;

mod window;
pub use window::{LocalWindow, RemoteWindow, LARGE_WINDOW, MAXIMUM_PACKET_SIZE, SMALL_WINDOW};

bitflags! {
    /// The state of a [`Channel`], each direction closing independently.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct State: u8 {
        /// The channel open has been confirmed.
        const ACTIVE = 1 << 0;

        /// We sent a `SSH_MSG_CHANNEL_EOF`.
        const EOF_SENT = 1 << 1;

        /// The peer sent a `SSH_MSG_CHANNEL_EOF`.
        const EOF_RECEIVED = 1 << 2;

        /// We sent a `SSH_MSG_CHANNEL_CLOSE`.
        const WRITE_CLOSED = 1 << 3;

        /// The peer sent a `SSH_MSG_CHANNEL_CLOSE`.
        const READ_CLOSED = 1 << 4;
    }
}

/// The replies to the _channel requests_ we sent with `want_reply`.
///
/// The peer replies in the order of the requests, each request being given
/// a ticket to collect its own reply, and replies nobody waits for being discarded.
#[derive(Debug, Default)]
pub(crate) struct Replies {
    sent: u64,
    answered: u64,
    ready: BTreeMap<u64, bool>,
}

impl Replies {
    /// Register a request awaiting a reply, returning its ticket.
    pub fn expect(&mut self) -> u64 {
        let ticket = self.sent;
        self.sent += 1;

        ticket
    }

    /// Record a reply from the peer, returning `false` when no request was awaiting one.
    pub fn answer(&mut self, success: bool) -> bool {
        if self.answered == self.sent {
            return false;
        }

        self.ready.insert(self.answered, success);
        self.answered += 1;

        true
    }

    /// Collect the reply to the request of `ticket`, if received.
    pub fn take(&mut self, ticket: u64) -> Option<bool> {
        self.ready.remove(&ticket)
    }
}

/// Which half of the channel selection to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    /// The channel data is read from.
    Read,

    /// The channel data is written to.
    Write,

    /// Both halves.
    Both,
}

/// A channel multiplexed in the connection.
#[derive(Debug)]
pub struct Channel {
    id: u32,
    read_id: u32,
    write_id: u32,

    state: State,
    kind: ChannelType,

    local: LocalWindow,
    remote: RemoteWindow,
    maximum_packet_size: u32,

    pub(crate) data: Vec<u8>,
    pub(crate) extended: Vec<u8>,
    pub(crate) replies: Replies,
    exit_status: Option<u32>,
}

impl Channel {
    pub(crate) fn new(
        id: u32,
        peer_id: u32,
        asymmetric: bool,
        kind: ChannelType,
        (local, remote): (LocalWindow, RemoteWindow),
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            id,
            // Quirky peers address the messages they send us with their own number.
            read_id: if asymmetric { peer_id } else { id },
            write_id: peer_id,

            state: State::ACTIVE,
            kind,

            local,
            remote,
            maximum_packet_size: maximum_packet_size.clamp(1, MAXIMUM_PACKET_SIZE),

            data: Vec::new(),
            extended: Vec::new(),
            replies: Replies::default(),
            exit_status: None,
        }
    }

    /// The local channel number.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The channel number the peer addresses its messages with.
    pub fn read_id(&self) -> u32 {
        self.read_id
    }

    /// The channel number we address our messages with.
    pub fn write_id(&self) -> u32 {
        self.write_id
    }

    /// The channel state.
    pub fn state(&self) -> State {
        self.state
    }

    pub(crate) fn set(&mut self, state: State) {
        self.state |= state;
    }

    /// Whether the channel is open and may still carry data to the peer.
    pub fn is_active(&self) -> bool {
        self.state.contains(State::ACTIVE)
            && !self
                .state
                .intersects(State::WRITE_CLOSED | State::READ_CLOSED)
    }

    /// Whether both directions of the channel have been closed.
    pub fn is_closed(&self) -> bool {
        self.state
            .contains(State::WRITE_CLOSED | State::READ_CLOSED)
    }

    /// Whether the peer won't send any more data.
    pub fn is_eof(&self) -> bool {
        self.state
            .intersects(State::EOF_RECEIVED | State::READ_CLOSED)
    }

    /// The channel type and its arguments.
    pub fn kind(&self) -> &ChannelType {
        &self.kind
    }

    /// Replace the channel type and its arguments, as seen by the application.
    pub fn set_kind(&mut self, kind: ChannelType) {
        self.kind = kind;
    }

    /// The window we granted to the peer.
    pub fn local_window(&self) -> &LocalWindow {
        &self.local
    }

    pub(crate) fn local_window_mut(&mut self) -> &mut LocalWindow {
        &mut self.local
    }

    /// The window the peer granted to us.
    pub fn remote_window(&self) -> &RemoteWindow {
        &self.remote
    }

    pub(crate) fn remote_window_mut(&mut self) -> &mut RemoteWindow {
        &mut self.remote
    }

    /// The maximum size of the data in a single packet, as accepted by the peer.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// The data received and not read yet.
    pub fn pending(&self) -> usize {
        self.data.len() + self.extended.len()
    }

    /// The exit status of the remote process, if reported.
    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    pub(crate) fn set_exit_status(&mut self, code: u32) {
        self.exit_status = Some(code);
    }
}
