//! The SSH _channel open request_ hook.

use crate::message::{ChannelOpenFailureReason, ChannelType};

/// An outcome to a channel open [`Hook`].
#[derive(Debug)]
pub enum Outcome {
    /// _Accept_ the channel open request.
    Accept,

    /// _Reject_ the channel open request.
    Reject {
        /// Reason for rejection.
        reason: ChannelOpenFailureReason,

        /// A textual description of the reason.
        description: String,
    },
}

/// A hook on channel open requests.
pub trait Hook: Send {
    /// Process the channel open request.
    fn on_request(&mut self, kind: &ChannelType) -> Outcome;
}

impl<T: FnMut(&ChannelType) -> Outcome + Send> Hook for T {
    fn on_request(&mut self, kind: &ChannelType) -> Outcome {
        (self)(kind)
    }
}

/// A default implementation of the method that rejects all requests.
impl Hook for () {
    fn on_request(&mut self, _: &ChannelType) -> Outcome {
        Outcome::Reject {
            reason: ChannelOpenFailureReason::AdministrativelyProhibited,
            description: "The channel opening is currently disabled".into(),
        }
    }
}
