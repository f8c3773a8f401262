//! The received [`Packet`]s, the message numbers and the transport-layer messages.

use std::{fmt, io::Cursor};

use ssh_packet::binrw::{meta::ReadMagic, BinRead, BinWrite};

use crate::{Error, Result, Role};

pub mod trans;

/// The message number, first byte of every packet payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageType(pub u8);

macro_rules! message_types {
    ($($(#[$meta:meta])* $name:ident = $value:literal,)*) => {
        impl MessageType {
            $(
                $(#[$meta])*
                pub const $name: Self = Self($value);
            )*

            /// The name of the message type, as registered in the IANA tables.
            pub fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(concat!("SSH_MSG_", stringify!($name))),)*
                    _ => None,
                }
            }
        }
    };
}

message_types! {
    /// `SSH_MSG_DISCONNECT`.
    DISCONNECT = 1,
    /// `SSH_MSG_IGNORE`.
    IGNORE = 2,
    /// `SSH_MSG_UNIMPLEMENTED`.
    UNIMPLEMENTED = 3,
    /// `SSH_MSG_DEBUG`.
    DEBUG = 4,
    /// `SSH_MSG_SERVICE_REQUEST`.
    SERVICE_REQUEST = 5,
    /// `SSH_MSG_SERVICE_ACCEPT`.
    SERVICE_ACCEPT = 6,
    /// `SSH_MSG_KEXINIT`.
    KEXINIT = 20,
    /// `SSH_MSG_NEWKEYS`.
    NEWKEYS = 21,
    /// `SSH_MSG_KEXDH_INIT`, shared with `SSH_MSG_KEX_ECDH_INIT` and `SSH_MSG_KEX_DH_GEX_REQUEST_OLD`.
    KEXDH_INIT = 30,
    /// `SSH_MSG_KEXDH_REPLY`, shared with `SSH_MSG_KEX_ECDH_REPLY` and `SSH_MSG_KEX_DH_GEX_GROUP`.
    KEXDH_REPLY = 31,
    /// `SSH_MSG_KEX_DH_GEX_INIT`.
    KEX_DH_GEX_INIT = 32,
    /// `SSH_MSG_KEX_DH_GEX_REPLY`.
    KEX_DH_GEX_REPLY = 33,
    /// `SSH_MSG_KEX_DH_GEX_REQUEST`.
    KEX_DH_GEX_REQUEST = 34,
    /// `SSH_MSG_USERAUTH_REQUEST`.
    USERAUTH_REQUEST = 50,
    /// `SSH_MSG_USERAUTH_FAILURE`.
    USERAUTH_FAILURE = 51,
    /// `SSH_MSG_USERAUTH_SUCCESS`.
    USERAUTH_SUCCESS = 52,
    /// `SSH_MSG_USERAUTH_BANNER`.
    USERAUTH_BANNER = 53,
    /// `SSH_MSG_USERAUTH_PK_OK`, shared with `SSH_MSG_USERAUTH_PASSWD_CHANGEREQ` and `SSH_MSG_USERAUTH_INFO_REQUEST`.
    USERAUTH_PK_OK = 60,
    /// `SSH_MSG_USERAUTH_INFO_RESPONSE`.
    USERAUTH_INFO_RESPONSE = 61,
    /// `SSH_MSG_GLOBAL_REQUEST`.
    GLOBAL_REQUEST = 80,
    /// `SSH_MSG_REQUEST_SUCCESS`.
    REQUEST_SUCCESS = 81,
    /// `SSH_MSG_REQUEST_FAILURE`.
    REQUEST_FAILURE = 82,
    /// `SSH_MSG_CHANNEL_OPEN`.
    CHANNEL_OPEN = 90,
    /// `SSH_MSG_CHANNEL_OPEN_CONFIRMATION`.
    CHANNEL_OPEN_CONFIRMATION = 91,
    /// `SSH_MSG_CHANNEL_OPEN_FAILURE`.
    CHANNEL_OPEN_FAILURE = 92,
    /// `SSH_MSG_CHANNEL_WINDOW_ADJUST`.
    CHANNEL_WINDOW_ADJUST = 93,
    /// `SSH_MSG_CHANNEL_DATA`.
    CHANNEL_DATA = 94,
    /// `SSH_MSG_CHANNEL_EXTENDED_DATA`.
    CHANNEL_EXTENDED_DATA = 95,
    /// `SSH_MSG_CHANNEL_EOF`.
    CHANNEL_EOF = 96,
    /// `SSH_MSG_CHANNEL_CLOSE`.
    CHANNEL_CLOSE = 97,
    /// `SSH_MSG_CHANNEL_REQUEST`.
    CHANNEL_REQUEST = 98,
    /// `SSH_MSG_CHANNEL_SUCCESS`.
    CHANNEL_SUCCESS = 99,
    /// `SSH_MSG_CHANNEL_FAILURE`.
    CHANNEL_FAILURE = 100,
}

impl MessageType {
    /// Whether the message is chatter that carries no protocol state.
    pub fn is_noop(&self) -> bool {
        matches!(*self, Self::IGNORE | Self::DEBUG | Self::USERAUTH_BANNER)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "SSH_MSG_UNKNOWN({})", self.0),
        }
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A message that can be read from a [`Packet`], its message number being the binrw _magic_.
pub trait Decode: for<'r> BinRead<Args<'r> = ()> + ReadMagic<MagicType = u8> + fmt::Debug {}

impl<T> Decode for T where
    for<'r> T: BinRead<Args<'r> = ()> + ReadMagic<MagicType = u8> + fmt::Debug
{
}

/// A message that can be written into a packet payload.
pub trait Encode: Sized + for<'w> BinWrite<Args<'w> = ()> + fmt::Debug {
    /// Serialize the message as a full packet payload, starting with its message number.
    fn to_payload(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_be(&mut cursor)?;

        Ok(cursor.into_inner())
    }
}

impl<T> Encode for T where for<'w> T: BinWrite<Args<'w> = ()> + fmt::Debug {}

/// A packet payload received from the peer.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
    seq: u32,
    from: Role,
}

impl Packet {
    pub(crate) fn new(payload: Vec<u8>, seq: u32, from: Role) -> Self {
        Self { payload, seq, from }
    }

    /// The message number of the packet.
    pub fn kind(&self) -> MessageType {
        MessageType(self.payload.first().copied().unwrap_or_default())
    }

    /// The receive sequence number of the packet.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// The role of the sender of the packet.
    pub fn from(&self) -> Role {
        self.from
    }

    /// The whole payload of the packet, starting with the message number.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload of the packet after the message number.
    pub fn body(&self) -> &[u8] {
        self.payload.get(1..).unwrap_or_default()
    }

    /// Whether the packet holds a message of type `M`.
    pub fn is<M: Decode>(&self) -> bool {
        self.kind().0 == M::MAGIC
    }

    /// Deserialize the packet as a message of type `M`.
    pub fn to<M: Decode>(&self) -> Result<M> {
        if !self.is::<M>() {
            return Err(Error::UnexpectedMessage {
                role: self.from,
                expected: MessageType(M::MAGIC),
                got: self.kind(),
            });
        }

        M::read_be(&mut Cursor::new(&self.payload)).map_err(|source| Error::Parse {
            role: self.from,
            message: self.kind(),
            source,
        })
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("kind", &self.kind())
            .field("seq", &self.seq)
            .field("len", &self.payload.len())
            .finish()
    }
}
