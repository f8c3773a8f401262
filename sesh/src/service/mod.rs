//! Service facilities, to run on a [`Session`] once the keys are exchanged.

#[cfg(doc)]
use crate::Session;

mod handler;
pub use handler::Handler;

mod request;
pub use request::Request;
