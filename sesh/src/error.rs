use strum::{AsRefStr, Display};
use thiserror::Error;

use ssh_packet::binrw;

use crate::{trans::DisconnectReason, MessageType};

/// The role of a peer in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// The side initiating the connection.
    Client,

    /// The side accepting the connection.
    Server,
}

impl Role {
    /// The role on the other end of the session.
    pub fn opposite(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

/// Uniform status codes for the failures of a cryptographic primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CryptoStatus {
    /// The input data was malformed for the primitive.
    #[strum(serialize = "bad data")]
    BadData,

    /// The key or IV had an invalid size or value.
    #[strum(serialize = "wrong key")]
    WrongKey,

    /// The primitive was fed more data than it can process.
    #[strum(serialize = "overflow")]
    Overflow,

    /// The requested algorithm or parameter isn't available.
    #[strum(serialize = "not available")]
    NotAvailable,

    /// The operation isn't permitted in the current state.
    #[strum(serialize = "permission")]
    Permission,

    /// A signature failed to verify.
    #[strum(serialize = "signature")]
    Signature,
}

/// A coarse classification of the [`enum@Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed data was received.
    Parse,

    /// A cryptographic check or operation failed.
    Crypto,

    /// The peer violated the protocol, or the negotiation failed.
    Protocol,

    /// A resource limit has been exceeded.
    Resource,

    /// The peer didn't answer in time, or stopped mid-packet.
    Timeout,

    /// The underlying stream failed.
    Io,
}

/// The error types that can occur when manipulating this crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// I/O Error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// SSH Key error.
    #[error(transparent)]
    Key(#[from] ssh_key::Error),

    /// Signature error during the key-exchange.
    #[error(transparent)]
    Signature(#[from] signature::Error),

    /// Local (de)-serialization error.
    #[error(transparent)]
    Binary(#[from] binrw::Error),

    /// A message sent by the peer couldn't be parsed.
    #[error("Unable to parse `{message}` sent by the {role}: {source}")]
    Parse {
        /// The role of the sender.
        role: Role,

        /// The type of the message being parsed.
        message: MessageType,

        /// The underlying decoding error.
        source: binrw::Error,
    },

    /// A cryptographic primitive failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(CryptoStatus),

    /// Packet integrity error.
    #[error("Packet from the {role} failed the integrity check")]
    Integrity {
        /// The role of the sender.
        role: Role,
    },

    /// The decrypted padding length was out of bounds.
    #[error("Packet from the {role} has an invalid padding length of {padding} for a {length}-byte record")]
    BadPadding {
        /// The role of the sender.
        role: Role,

        /// The padding length that was received.
        padding: u8,

        /// The length of the record.
        length: u32,
    },

    /// The decrypted packet length was out of bounds.
    #[error("Packet from the {role} has an invalid length of {length}, expected a multiple of {block} up to {max}")]
    BadLength {
        /// The role of the sender.
        role: Role,

        /// The length that was received.
        length: u32,

        /// The block alignment the length must respect.
        block: usize,

        /// The maximum length accepted.
        max: usize,
    },

    /// The peer sent an unexpected message in the current state.
    #[error("The {role} sent `{got}` while `{expected}` was expected")]
    UnexpectedMessage {
        /// The role of the sender.
        role: Role,

        /// The type of the expected message.
        expected: MessageType,

        /// The type of the received message.
        got: MessageType,
    },

    /// A counter exceeded its limit.
    #[error("Too many {what}, the limit is {limit}")]
    Overflow {
        /// What has been counted.
        what: &'static str,

        /// The maximum allowed.
        limit: usize,
    },

    /// The peer sent raw text instead of a binary packet.
    #[error("The {role} sent a diagnostic instead of a packet: {text:?}")]
    PeerDiagnostic {
        /// The role of the sender.
        role: Role,

        /// The text line that was received.
        text: String,
    },

    /// The peer advertised an unsupported protocol version.
    #[error("The {role} speaks unsupported protocol version `{version}`")]
    UnsupportedVersion {
        /// The role of the peer.
        role: Role,

        /// The advertised protocol version.
        version: String,
    },

    /// No common algorithm found between both sides.
    #[error("Unable to negociate a common {what} algorithm, client offered `{client}`, server offered `{server}`")]
    NoCommonAlgorithm {
        /// The category of algorithm.
        what: &'static str,

        /// The client's name-list.
        client: String,

        /// The server's name-list.
        server: String,
    },

    /// Provided algorithm wasn't supported.
    #[error("The {what} algorithm `{name}` is unsupported")]
    UnsupportedAlgorithm {
        /// The category of algorithm.
        what: &'static str,

        /// The algorithm name.
        name: String,
    },

    /// Protocol error in the key-exchange.
    #[error("Error in the key-exchange: {0}")]
    KexError(&'static str),

    /// The server host key has been refused by the verification callback.
    #[error("The server host key `{0}` has been rejected")]
    HostKeyRejected(String),

    /// The peer requested or accepted an unexpected service.
    #[error("Unexpected service `{got}`, expected `{expected}`")]
    UnknownService {
        /// The service we expected.
        expected: &'static str,

        /// The service we got.
        got: String,
    },

    /// The peer didn't send the data in the allotted time.
    #[error("Timed out while waiting for the peer")]
    Timeout,

    /// The session has been disconnected.
    #[error("The session has been disconnected")]
    Disconnected,

    /// The peer disconnected from the session.
    #[error("The peer disconnected with `{reason:?}`: {description}")]
    PeerDisconnected {
        /// The reason code sent by the peer.
        reason: DisconnectReason,

        /// The description sent by the peer.
        description: String,
    },
}

impl Error {
    /// Classify the error in one of the [`ErrorKind`]s.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(err) if err.kind() == std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            Self::Io(_) => ErrorKind::Io,
            Self::Binary(_) | Self::Parse { .. } => ErrorKind::Parse,
            Self::Key(_)
            | Self::Signature(_)
            | Self::Crypto(_)
            | Self::Integrity { .. }
            | Self::BadPadding { .. }
            | Self::HostKeyRejected(_) => ErrorKind::Crypto,
            Self::Overflow { .. } => ErrorKind::Resource,
            Self::Timeout => ErrorKind::Timeout,
            Self::BadLength { .. }
            | Self::UnexpectedMessage { .. }
            | Self::PeerDiagnostic { .. }
            | Self::UnsupportedVersion { .. }
            | Self::NoCommonAlgorithm { .. }
            | Self::UnsupportedAlgorithm { .. }
            | Self::KexError(_)
            | Self::UnknownService { .. }
            | Self::Disconnected
            | Self::PeerDisconnected { .. } => ErrorKind::Protocol,
        }
    }

    /// The reason code to report to the peer when tearing down the session because of this error.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::Integrity { .. } => DisconnectReason::MacError,
            Self::NoCommonAlgorithm { .. }
            | Self::UnsupportedAlgorithm { .. }
            | Self::KexError(_)
            | Self::Key(_)
            | Self::Signature(_) => DisconnectReason::KeyExchangeFailed,
            Self::HostKeyRejected(_) => DisconnectReason::HostKeyNotVerifiable,
            Self::UnsupportedVersion { .. } => DisconnectReason::ProtocolVersionNotSupported,
            Self::UnknownService { .. } => DisconnectReason::ServiceNotAvailable,
            Self::Timeout | Self::Io(_) => DisconnectReason::ConnectionLost,
            _ => DisconnectReason::ProtocolError,
        }
    }
}

/// A handy [`std::result::Result`] type alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
