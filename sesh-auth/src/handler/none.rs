//! The `none` authentication method.

/// The verdict on a `none` attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// Let the user in without credentials.
    Accept,

    /// Require other credentials.
    Reject,
}

/// An interface to the `none` authentication method.
pub trait None: Send + Sync {
    /// Decide whether `user` may log in without credentials.
    fn process(&mut self, user: String) -> Response;
}

impl<T: FnMut(String) -> Response + Send + Sync> None for T {
    fn process(&mut self, user: String) -> Response {
        (self)(user)
    }
}

/// Rejects every attempt.
impl None for () {
    fn process(&mut self, _: String) -> Response {
        Response::Reject
    }
}
