pub use ssh_key::Algorithm as Key;

use ssh_packet::arch::NameList;

use crate::trans::KexInit;

use super::Negociate;

impl Negociate for Key {
    const WHAT: &'static str = "host key";

    fn field<'f>(kex: &'f KexInit) -> &'f NameList<'f> {
        &kex.server_host_key_algorithms
    }
}
