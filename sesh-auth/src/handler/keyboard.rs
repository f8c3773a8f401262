//! The `keyboard-interactive` authentication method.

#[doc(no_inline)]
pub use crate::userauth::Prompt;

/// The verdict on a `keyboard-interactive` attempt, or the next challenge.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// Let the user in.
    Accept,

    /// Send another challenge to the user.
    Challenge {
        /// The name of the challenge.
        name: String,

        /// The instructions for the user.
        instruction: String,

        /// The prompts to answer.
        prompts: Vec<Prompt>,
    },

    /// Refuse the answers.
    Reject,
}

/// An interface to the `keyboard-interactive` authentication method.
pub trait KeyboardInteractive: Send + Sync {
    /// Challenge `user`, `responses` being the answers to the previous challenge, if any.
    fn process(&mut self, user: String, responses: Option<Vec<String>>) -> Response;
}

impl<T: FnMut(String, Option<Vec<String>>) -> Response + Send + Sync> KeyboardInteractive for T {
    fn process(&mut self, user: String, responses: Option<Vec<String>>) -> Response {
        (self)(user, responses)
    }
}

/// Rejects every attempt.
impl KeyboardInteractive for () {
    fn process(&mut self, _: String, _: Option<Vec<String>>) -> Response {
        Response::Reject
    }
}
