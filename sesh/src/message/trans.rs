//! Messages of the transport layer protocol,
//! as described in [RFC4253](https://datatracker.ietf.org/doc/html/rfc4253)
//! and [RFC4419](https://datatracker.ietf.org/doc/html/rfc4419).
//!
//! The messages of the core protocol are the ones from [`ssh_packet::trans`],
//! the finite-field Diffie-Hellman ones are declared here on top of [`ssh_packet::arch`].

use ssh_packet::{
    arch::{Bytes, MpInt},
    binrw,
};

#[doc(no_inline)]
pub use ssh_packet::trans::{
    Debug, Disconnect, DisconnectReason, Ignore, KexEcdhInit, KexEcdhReply, KexInit, NewKeys,
    ServiceAccept, ServiceRequest, Unimplemented,
};

/// The `SSH_MSG_KEXDH_INIT` message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(big, magic = 30_u8)]
pub struct KexdhInit<'b> {
    /// The client's public value `e`.
    pub e: MpInt<'b>,
}

/// The `SSH_MSG_KEXDH_REPLY` message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(big, magic = 31_u8)]
pub struct KexdhReply<'b> {
    /// The server's public host key blob `K_S`.
    pub k_s: Bytes<'b>,

    /// The server's public value `f`.
    pub f: MpInt<'b>,

    /// The signature of the exchange hash.
    pub signature: Bytes<'b>,
}

/// The legacy `SSH_MSG_KEX_DH_GEX_REQUEST_OLD` message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(big, magic = 30_u8)]
pub struct KexGexRequestOld {
    /// The preferred group size in bits.
    pub n: u32,
}

/// The `SSH_MSG_KEX_DH_GEX_REQUEST` message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(big, magic = 34_u8)]
pub struct KexGexRequest {
    /// The minimal acceptable group size in bits.
    pub min: u32,

    /// The preferred group size in bits.
    pub n: u32,

    /// The maximal acceptable group size in bits.
    pub max: u32,
}

/// The `SSH_MSG_KEX_DH_GEX_GROUP` message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(big, magic = 31_u8)]
pub struct KexGexGroup<'b> {
    /// The safe prime `p`.
    pub p: MpInt<'b>,

    /// The generator `g`.
    pub g: MpInt<'b>,
}

/// The `SSH_MSG_KEX_DH_GEX_INIT` message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(big, magic = 32_u8)]
pub struct KexGexInit<'b> {
    /// The client's public value `e`.
    pub e: MpInt<'b>,
}

/// The `SSH_MSG_KEX_DH_GEX_REPLY` message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(big, magic = 33_u8)]
pub struct KexGexReply<'b> {
    /// The server's public host key blob `K_S`.
    pub k_s: Bytes<'b>,

    /// The server's public value `f`.
    pub f: MpInt<'b>,

    /// The signature of the exchange hash.
    pub signature: Bytes<'b>,
}
