//! The `password` authentication method.

/// The verdict on a `password` attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// Let the user in.
    Accept,

    /// Ask the user to change its password, displaying `prompt`.
    PasswordExpired {
        /// The prompt displayed before the password change.
        prompt: String,
    },

    /// Refuse the password.
    Reject,
}

/// An interface to the `password` authentication method.
pub trait Password: Send + Sync {
    /// Check the `password` of `user`, `new` being the replacement when answering a change request.
    fn process(&mut self, user: String, password: String, new: Option<String>) -> Response;
}

impl<T: FnMut(String, String, Option<String>) -> Response + Send + Sync> Password for T {
    fn process(&mut self, user: String, password: String, new: Option<String>) -> Response {
        (self)(user, password, new)
    }
}

/// Rejects every attempt.
impl Password for () {
    fn process(&mut self, _: String, _: String, _: Option<String>) -> Response {
        Response::Reject
    }
}
