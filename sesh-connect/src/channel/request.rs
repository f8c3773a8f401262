//! The _channel requests_ and responses.

#[doc(no_inline)]
pub use crate::message::ChannelRequestContext;

/// A response to a _channel request_.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The request succeeded.
    Success,

    /// The request failed.
    Failure,
}

/// A hook on the requests the peer sends on channels.
pub trait Hook: Send {
    /// Process the request sent on the channel `id`.
    fn process(&mut self, id: u32, context: &ChannelRequestContext) -> Response;
}

impl<T: FnMut(u32, &ChannelRequestContext) -> Response + Send> Hook for T {
    fn process(&mut self, id: u32, context: &ChannelRequestContext) -> Response {
        (self)(id, context)
    }
}

/// A default implementation of the method that rejects all requests.
impl Hook for () {
    fn process(&mut self, _: u32, _: &ChannelRequestContext) -> Response {
        Response::Failure
    }
}
