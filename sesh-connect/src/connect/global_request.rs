//! The SSH _global request_ hook and responses.

#[doc(no_inline)]
pub use crate::message::GlobalRequestContext;

/// A response to a _global request_.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The request succeeded, with optionally a bound port.
    Success(Option<u32>),

    /// The request failed.
    Failure,
}

/// An outcome to a global request [`Hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// _Accept_ the global request, returning the port number.
    Accept {
        /// Port that was bound.
        bound_port: u32,
    },

    /// _Reject_ the global request.
    Reject,
}

/// A hook on the port-forwarding global requests.
///
/// Requests of unknown types never reach the hook, they are refused right away.
pub trait Hook: Send {
    /// Process the global request.
    fn process(&mut self, context: &GlobalRequestContext) -> Outcome;
}

impl<T: FnMut(&GlobalRequestContext) -> Outcome + Send> Hook for T {
    fn process(&mut self, context: &GlobalRequestContext) -> Outcome {
        (self)(context)
    }
}

/// A default implementation of the method that rejects all requests.
impl Hook for () {
    fn process(&mut self, _: &GlobalRequestContext) -> Outcome {
        Outcome::Reject
    }
}
