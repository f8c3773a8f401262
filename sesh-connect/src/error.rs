use thiserror::Error;

use crate::message::ChannelOpenFailureReason;

/// The error types that can occur when manipulating this crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Session error.
    #[error(transparent)]
    Session(#[from] sesh::Error),

    /// Authentication error, when requested along with the connection.
    #[error(transparent)]
    Auth(#[from] sesh_auth::Error),

    /// No channel has this number.
    #[error("Channel #{0} doesn't exist")]
    ChannelNotFound(u32),

    /// No channel is selected for this direction.
    #[error("No channel is selected for {0}")]
    NoChannelSelected(&'static str),

    /// The channel has been closed in this direction.
    #[error("Channel #{0} has been closed")]
    ChannelClosed(u32),

    /// The peer refused to open the channel.
    #[error("The peer refused to open the channel ({reason:?}): {description}")]
    ChannelOpenFailure {
        /// The reason code sent by the peer.
        reason: ChannelOpenFailureReason,

        /// The description sent by the peer.
        description: String,
    },

    /// The peer sent more data than the window allowed, or adjusted it past its maximum.
    #[error("The peer overran the window of channel #{0}")]
    WindowExceeded(u32),
}

impl Error {
    /// Classify the error in one of the [`sesh::ErrorKind`]s.
    pub fn kind(&self) -> sesh::ErrorKind {
        match self {
            Self::Session(err) | Self::Auth(sesh_auth::Error::Session(err)) => err.kind(),
            _ => sesh::ErrorKind::Protocol,
        }
    }
}

/// A handy [`std::result::Result`] type alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
