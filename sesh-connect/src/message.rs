//! Messages of the [`SSH-CONNECT`] protocol.
//!
//! The fixed-layout messages are the ones from [`ssh_packet::connect`],
//! the messages carrying a typed context are declared here so that
//! unknown types are kept with their raw data instead of failing to parse.
//!
//! [`SSH-CONNECT`]: https://datatracker.ietf.org/doc/html/rfc4254

use std::fmt;

use ssh_packet::{
    arch::{Bytes, Utf8 as StringUtf8},
    binrw,
};

#[doc(no_inline)]
pub use ssh_packet::connect::{
    ChannelClose, ChannelData, ChannelEof, ChannelFailure, ChannelOpenConfirmation,
    ChannelOpenFailure, ChannelOpenFailureReason, ChannelSuccess, ChannelWindowAdjust,
    ForwardingSuccess, RequestFailure, RequestSuccess,
};

fn read_utf8(text: StringUtf8<'static>) -> String {
    text.to_string()
}

#[allow(clippy::ptr_arg)]
fn write_utf8(text: &String) -> StringUtf8<'static> {
    StringUtf8::from(text.clone())
}

fn read_lossy(bytes: Bytes<'static>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

#[allow(clippy::ptr_arg)]
fn write_lossy(text: &String) -> Bytes<'static> {
    Bytes::from(text.as_bytes().to_vec())
}

fn read_bytes(bytes: Bytes<'static>) -> Vec<u8> {
    bytes.into_vec()
}

#[allow(clippy::ptr_arg)]
fn write_bytes(bytes: &Vec<u8>) -> Bytes<'static> {
    Bytes::from(bytes.clone())
}

fn read_bool(value: u8) -> bool {
    value != 0
}

fn write_bool(value: &bool) -> u8 {
    u8::from(*value)
}

/// The type of a channel, along with its type-specific arguments.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big)]
#[br(import(channel_type: String))]
pub enum ChannelType {
    /// A `session` channel, for shells, commands and subsystems.
    #[br(pre_assert(channel_type == "session"))]
    Session,

    /// An `x11` channel.
    #[br(pre_assert(channel_type == "x11"))]
    X11 {
        /// The address of the X11 client.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        originator_address: String,

        /// The port of the X11 client.
        originator_port: u32,
    },

    /// A `forwarded-tcpip` channel, for remote port-forwarding.
    #[br(pre_assert(channel_type == "forwarded-tcpip"))]
    ForwardedTcpip {
        /// The address that was connected.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        address: String,

        /// The port that was connected.
        port: u32,

        /// The address of the originator of the connection.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        originator_address: String,

        /// The port of the originator of the connection.
        originator_port: u32,
    },

    /// A `direct-tcpip` channel, for local port-forwarding.
    #[br(pre_assert(channel_type == "direct-tcpip"))]
    DirectTcpip {
        /// The host to connect to.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        host: String,

        /// The port to connect to.
        port: u32,

        /// The address of the originator of the connection.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        originator_address: String,

        /// The port of the originator of the connection.
        originator_port: u32,
    },

    /// Any other channel type, with its raw arguments.
    Other {
        /// The name of the channel type.
        #[br(calc = channel_type.clone())]
        #[bw(ignore)]
        name: String,

        /// The type-specific data.
        #[br(parse_with = binrw::helpers::until_eof)]
        data: Vec<u8>,
    },
}

impl ChannelType {
    /// The wire name of the channel type.
    pub fn name(&self) -> &str {
        match self {
            Self::Session => "session",
            Self::X11 { .. } => "x11",
            Self::ForwardedTcpip { .. } => "forwarded-tcpip",
            Self::DirectTcpip { .. } => "direct-tcpip",
            Self::Other { name, .. } => name,
        }
    }
}

/// The `SSH_MSG_CHANNEL_OPEN` message.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 90_u8)]
pub struct ChannelOpen {
    #[bw(calc = StringUtf8::from(kind.name().to_owned()))]
    channel_type: StringUtf8<'static>,

    /// The channel number of the sender.
    pub sender_channel: u32,

    /// The initial window size granted to the recipient.
    pub initial_window_size: u32,

    /// The maximum packet size accepted by the sender.
    pub maximum_packet_size: u32,

    /// The channel type and arguments.
    #[br(args(channel_type.to_string()))]
    pub kind: ChannelType,
}

/// The `SSH_MSG_CHANNEL_EXTENDED_DATA` message.
///
/// The data type is kept raw, so that types other than `stderr` can be told apart and discarded.
#[binrw::binrw]
#[derive(Clone, PartialEq, Eq)]
#[brw(big, magic = 95_u8)]
pub struct ChannelExtendedData {
    /// The channel number of the recipient.
    pub recipient_channel: u32,

    /// The type of the data, `1` being `SSH_EXTENDED_DATA_STDERR`.
    pub data_type: u32,

    /// The data.
    #[br(map = read_bytes)]
    #[bw(map = write_bytes)]
    pub data: Vec<u8>,
}

impl ChannelExtendedData {
    /// The `SSH_EXTENDED_DATA_STDERR` data type.
    pub const STDERR: u32 = 1;
}

impl fmt::Debug for ChannelExtendedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelExtendedData")
            .field("recipient_channel", &self.recipient_channel)
            .field("data_type", &self.data_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// The type of a [`ChannelRequest`], along with its type-specific arguments.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big)]
#[br(import(request_type: String))]
pub enum ChannelRequestContext {
    /// Allocate a pseudo-terminal (`pty-req`).
    #[br(pre_assert(request_type == "pty-req"))]
    PtyReq {
        /// The `TERM` environment variable value.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        term: String,

        /// Terminal width, in characters.
        width_chars: u32,

        /// Terminal height, in rows.
        height_chars: u32,

        /// Terminal width, in pixels.
        width_pixels: u32,

        /// Terminal height, in pixels.
        height_pixels: u32,

        /// The encoded terminal modes.
        #[br(map = read_bytes)]
        #[bw(map = write_bytes)]
        modes: Vec<u8>,
    },

    /// Pass an environment variable (`env`).
    #[br(pre_assert(request_type == "env"))]
    Env {
        /// The variable name.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        name: String,

        /// The variable value.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        value: String,
    },

    /// Start the user's default shell (`shell`).
    #[br(pre_assert(request_type == "shell"))]
    Shell,

    /// Execute a command (`exec`).
    #[br(pre_assert(request_type == "exec"))]
    Exec {
        /// The command line.
        #[br(map = read_lossy)]
        #[bw(map = write_lossy)]
        command: String,
    },

    /// Start a subsystem (`subsystem`).
    #[br(pre_assert(request_type == "subsystem"))]
    Subsystem {
        /// The subsystem name.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        name: String,
    },

    /// Notify of a terminal size change (`window-change`).
    #[br(pre_assert(request_type == "window-change"))]
    WindowChange {
        /// Terminal width, in characters.
        width_chars: u32,

        /// Terminal height, in rows.
        height_chars: u32,

        /// Terminal width, in pixels.
        width_pixels: u32,

        /// Terminal height, in pixels.
        height_pixels: u32,
    },

    /// Deliver a signal to the remote process (`signal`).
    #[br(pre_assert(request_type == "signal"))]
    Signal {
        /// The signal name, without the `SIG` prefix.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        name: String,
    },

    /// Report the exit status of the remote process (`exit-status`).
    #[br(pre_assert(request_type == "exit-status"))]
    ExitStatus {
        /// The exit code.
        code: u32,
    },

    /// Any other request type, with its raw arguments.
    Other {
        /// The name of the request type.
        #[br(calc = request_type.clone())]
        #[bw(ignore)]
        name: String,

        /// The type-specific data.
        #[br(parse_with = binrw::helpers::until_eof)]
        data: Vec<u8>,
    },
}

impl ChannelRequestContext {
    /// The wire name of the request type.
    pub fn name(&self) -> &str {
        match self {
            Self::PtyReq { .. } => "pty-req",
            Self::Env { .. } => "env",
            Self::Shell => "shell",
            Self::Exec { .. } => "exec",
            Self::Subsystem { .. } => "subsystem",
            Self::WindowChange { .. } => "window-change",
            Self::Signal { .. } => "signal",
            Self::ExitStatus { .. } => "exit-status",
            Self::Other { name, .. } => name,
        }
    }
}

/// The `SSH_MSG_CHANNEL_REQUEST` message.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 98_u8)]
pub struct ChannelRequest {
    /// The channel number of the recipient.
    pub recipient_channel: u32,

    #[bw(calc = StringUtf8::from(context.name().to_owned()))]
    request_type: StringUtf8<'static>,

    /// Whether the sender wants a [`ChannelSuccess`] or [`ChannelFailure`] in reply.
    #[br(map = read_bool)]
    #[bw(map = write_bool)]
    pub want_reply: bool,

    /// The request type and arguments.
    #[br(args(request_type.to_string()))]
    pub context: ChannelRequestContext,
}

/// The type of a [`GlobalRequest`], along with its type-specific arguments.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big)]
#[br(import(request_type: String))]
pub enum GlobalRequestContext {
    /// Request a remote port-forwarding (`tcpip-forward`).
    #[br(pre_assert(request_type == "tcpip-forward"))]
    TcpipForward {
        /// The address to bind on the peer.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        bind_address: String,

        /// The port to bind on the peer, `0` letting the peer choose.
        bind_port: u32,
    },

    /// Cancel a remote port-forwarding (`cancel-tcpip-forward`).
    #[br(pre_assert(request_type == "cancel-tcpip-forward"))]
    CancelTcpipForward {
        /// The bound address.
        #[br(map = read_utf8)]
        #[bw(map = write_utf8)]
        bind_address: String,

        /// The bound port.
        bind_port: u32,
    },

    /// Any other request type, with its raw arguments.
    Other {
        /// The name of the request type.
        #[br(calc = request_type.clone())]
        #[bw(ignore)]
        name: String,

        /// The type-specific data.
        #[br(parse_with = binrw::helpers::until_eof)]
        data: Vec<u8>,
    },
}

impl GlobalRequestContext {
    /// The wire name of the request type.
    pub fn name(&self) -> &str {
        match self {
            Self::TcpipForward { .. } => "tcpip-forward",
            Self::CancelTcpipForward { .. } => "cancel-tcpip-forward",
            Self::Other { name, .. } => name,
        }
    }
}

/// The `SSH_MSG_GLOBAL_REQUEST` message.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 80_u8)]
pub struct GlobalRequest {
    #[bw(calc = StringUtf8::from(context.name().to_owned()))]
    request_type: StringUtf8<'static>,

    /// Whether the sender wants a [`RequestSuccess`] or [`RequestFailure`] in reply.
    #[br(map = read_bool)]
    #[bw(map = write_bool)]
    pub want_reply: bool,

    /// The request type and arguments.
    #[br(args(request_type.to_string()))]
    pub context: GlobalRequestContext,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Cursor;

    use rstest::rstest;
    use sesh::{Encode, MessageType};
    use ssh_packet::binrw::BinRead;

    use super::*;

    fn decode<M: for<'r> BinRead<Args<'r> = ()>>(payload: Vec<u8>) -> M {
        M::read_be(&mut Cursor::new(payload)).unwrap()
    }

    #[rstest]
    #[case(ChannelType::Session)]
    #[case(ChannelType::DirectTcpip {
        host: "localhost".into(),
        port: 22,
        originator_address: "127.0.0.1".into(),
        originator_port: 40000,
    })]
    #[case(ChannelType::Other { name: "auth-agent@openssh.com".into(), data: vec![] })]
    fn channel_open(#[case] kind: ChannelType) {
        let message = ChannelOpen {
            sender_channel: 3,
            initial_window_size: 0x10_0000,
            maximum_packet_size: 32768,
            kind,
        };
        let payload = message.to_payload().unwrap();

        assert_eq!(payload[0], MessageType::CHANNEL_OPEN.0);
        assert_eq!(decode::<ChannelOpen>(payload), message);
    }

    #[test]
    fn pty_request_layout() {
        let payload = ChannelRequest {
            recipient_channel: 0,
            want_reply: true,
            context: ChannelRequestContext::PtyReq {
                term: "xterm".into(),
                width_chars: 80,
                height_chars: 24,
                width_pixels: 0,
                height_pixels: 0,
                modes: vec![0],
            },
        }
        .to_payload()
        .unwrap();

        let expected = [
            &[MessageType::CHANNEL_REQUEST.0][..],
            &[0, 0, 0, 0],
            &[0, 0, 0, 7],
            b"pty-req",
            &[1],
            &[0, 0, 0, 5],
            b"xterm",
            &[0, 0, 0, 80],
            &[0, 0, 0, 24],
            &[0, 0, 0, 0],
            &[0, 0, 0, 0],
            &[0, 0, 0, 1, 0],
        ]
        .concat();

        assert_eq!(payload, expected);
    }

    #[test]
    fn unknown_request_keeps_data() {
        let message = GlobalRequest {
            want_reply: true,
            context: GlobalRequestContext::Other {
                name: "keepalive@openssh.com".into(),
                data: vec![1, 2, 3],
            },
        };

        assert_eq!(
            decode::<GlobalRequest>(message.to_payload().unwrap()),
            message
        );
    }

    #[test]
    fn known_request_with_bad_arguments() {
        // `exit-status` without its code
        let payload = [
            &[MessageType::CHANNEL_REQUEST.0][..],
            &[0, 0, 0, 0],
            &[0, 0, 0, 11],
            b"exit-status",
            &[0],
        ]
        .concat();

        let request = decode::<ChannelRequest>(payload);
        assert_eq!(
            request.context,
            ChannelRequestContext::Other {
                name: "exit-status".into(),
                data: vec![],
            }
        );
    }

    #[test]
    fn extended_data_is_not_dumped() {
        let message = ChannelExtendedData {
            recipient_channel: 1,
            data_type: ChannelExtendedData::STDERR,
            data: b"secret".to_vec(),
        };

        assert_eq!(
            format!("{message:?}"),
            "ChannelExtendedData { recipient_channel: 1, data_type: 1, len: 6 }"
        );
        assert_eq!(
            decode::<ChannelExtendedData>(message.to_payload().unwrap()),
            message
        );
    }
}
