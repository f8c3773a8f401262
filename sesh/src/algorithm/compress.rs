use ssh_packet::arch::NameList;
use strum::{AsRefStr, EnumString};

use crate::{
    side::{client::Client, server::Server},
    trans::KexInit,
};

use super::Negociate;

impl Negociate<Client> for Compress {
    const WHAT: &'static str = "compression";

    fn field<'f>(kex: &'f KexInit) -> &'f NameList<'f> {
        &kex.compression_algorithms_client_to_server
    }
}

impl Negociate<Server> for Compress {
    const WHAT: &'static str = "compression";

    fn field<'f>(kex: &'f KexInit) -> &'f NameList<'f> {
        &kex.compression_algorithms_server_to_client
    }
}

// TODO: Support `zlib@openssh.com`, which needs a compression context kept across packets.

/// SSH compression algorithms.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr)]
pub enum Compress {
    /// No compression algorithm.
    #[default]
    #[strum(serialize = "none")]
    None,
}
