#![doc = concat!(
    "[![docs.rs](https://img.shields.io/docsrs/", env!("CARGO_PKG_NAME"), ")](https://docs.rs/", env!("CARGO_PKG_NAME"), ")",
    " ",
    "[![crates.io](https://img.shields.io/crates/l/", env!("CARGO_PKG_NAME"), ")](https://crates.io/crates/", env!("CARGO_PKG_NAME"), ")"
)]
#![doc = ""]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! [`SSH-USERAUTH`]: https://datatracker.ietf.org/doc/html/rfc4252
#![warn(
    missing_docs,
    clippy::unwrap_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo
)]
#![forbid(unsafe_code)]

const SERVICE_NAME: &str = "ssh-userauth";

mod error;
pub use error::{Diagnostic, Error, Result};

mod methods;
pub use methods::Methods;

mod signature;

pub mod userauth;

pub mod handler;
pub mod request;
