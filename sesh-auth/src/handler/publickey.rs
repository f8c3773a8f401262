//! The `publickey` authentication method.
//!
//! The [`Publickey`] interface only has to decide whether the key is authorized for the user,
//! it is asked on the unsigned query before the key is acknowledged,
//! and again once the signature has been verified.

#[doc(no_inline)]
pub use ssh_key::PublicKey;

/// The verdict on a `publickey` attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// The key is authorized for the user.
    Accept,

    /// The key isn't authorized for the user.
    Reject,
}

/// An interface to the `publickey` authentication method.
pub trait Publickey: Send + Sync {
    /// Decide whether `key` is authorized for `user`.
    fn process(&mut self, user: String, key: PublicKey) -> Response;
}

impl<T: FnMut(String, PublicKey) -> Response + Send + Sync> Publickey for T {
    fn process(&mut self, user: String, key: PublicKey) -> Response {
        (self)(user, key)
    }
}

/// Rejects every attempt.
impl Publickey for () {
    fn process(&mut self, _: String, _: PublicKey) -> Response {
        Response::Reject
    }
}
