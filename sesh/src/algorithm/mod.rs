//! Supported algorithms for **compression**, **encryption**, **integrity** and **key-exchange**.

use std::str::FromStr;

use ssh_packet::arch::NameList;

use crate::{trans::KexInit, Error, Result};

/// Join a name-list back into its wire form, for diagnostics.
fn joined(list: &NameList) -> String {
    list.into_iter()
        .map(|name| name.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) trait Negociate<S = ()>: Sized + FromStr {
    const WHAT: &'static str;

    fn field<'f>(kex: &'f KexInit) -> &'f NameList<'f>;

    fn negociate(clientkex: &KexInit, serverkex: &KexInit) -> Result<Self> {
        let client = Self::field(clientkex);
        let server = Self::field(serverkex);

        let name = client
            .preferred_in(server)
            .ok_or_else(|| Error::NoCommonAlgorithm {
                what: Self::WHAT,
                client: joined(client),
                server: joined(server),
            })?;

        name.parse().map_err(|_| Error::UnsupportedAlgorithm {
            what: Self::WHAT,
            name: name.to_string(),
        })
    }
}

mod cipher;
pub use cipher::Cipher;
pub(crate) use cipher::CipherState;

mod compress;
pub use compress::Compress;

mod hmac;
pub use hmac::Hmac;

pub mod kex;
pub use kex::Kex;

mod key;
pub use key::Key;
