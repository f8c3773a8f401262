//! Known peer non-conformances, detected from the identification string.
//!
//! Detection is a pure lookup in [`TABLE`], each entry matching a vendor and
//! a version range to a set of workaround [`Quirks`].

use bitflags::bitflags;

use crate::Id;

bitflags! {
    /// Workarounds to apply when talking to a peer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Quirks: u32 {
        /// The peer only knows the `SSH_MSG_KEX_DH_GEX_REQUEST_OLD` group-exchange request.
        const OLD_GEX = 1 << 0;

        /// The peer rejects RSA signatures shorter than the key modulus.
        const PAD_RSA_SIGNATURE = 1 << 1;

        /// The peer chokes on large channel windows.
        const SMALL_WINDOW = 1 << 2;

        /// The peer addresses channel messages with its own channel number.
        const ASYMMETRIC_CHANNEL_IDS = 1 << 3;

        /// The peer routes password authentication through `keyboard-interactive`.
        const INTERACTIVE_PASSWORD = 1 << 4;
    }
}

/// A `(major, minor)` version tuple.
pub type Version = (u32, u32);

/// An entry of the quirks table.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    /// The vendor name, matched case-sensitively.
    pub vendor: &'static str,

    /// The first affected version, inclusive.
    pub since: Option<Version>,

    /// The first fixed version, exclusive.
    pub until: Option<Version>,

    /// The workarounds to apply.
    pub quirks: Quirks,
}

/// The quirks table, indexed by vendor and version range.
pub const TABLE: &[Entry] = &[
    Entry {
        vendor: "OpenSSH",
        since: None,
        until: Some((2, 5)),
        quirks: Quirks::OLD_GEX,
    },
    Entry {
        vendor: "SSH",
        since: None,
        until: Some((3, 1)),
        quirks: Quirks::PAD_RSA_SIGNATURE.union(Quirks::OLD_GEX),
    },
    Entry {
        vendor: "F-Secure",
        since: None,
        until: Some((3, 1)),
        quirks: Quirks::PAD_RSA_SIGNATURE,
    },
    Entry {
        vendor: "WeOnlyDo",
        since: None,
        until: None,
        quirks: Quirks::PAD_RSA_SIGNATURE.union(Quirks::SMALL_WINDOW),
    },
    Entry {
        vendor: "PuTTY_Release",
        since: None,
        until: Some((0, 59)),
        quirks: Quirks::SMALL_WINDOW,
    },
    Entry {
        vendor: "Cisco",
        since: None,
        until: Some((1, 26)),
        quirks: Quirks::SMALL_WINDOW.union(Quirks::ASYMMETRIC_CHANNEL_IDS),
    },
    Entry {
        vendor: "Sun_SSH",
        since: Some((1, 0)),
        until: Some((1, 2)),
        quirks: Quirks::INTERACTIVE_PASSWORD,
    },
];

impl Quirks {
    /// Look up the workarounds for the peer identified by `id`.
    pub fn of(id: &Id) -> Self {
        let Some((vendor, version)) = vendor_version(id) else {
            return Self::empty();
        };

        TABLE
            .iter()
            .filter(|entry| entry.vendor == vendor)
            .filter(|entry| entry.since.map_or(true, |since| version >= since))
            .filter(|entry| entry.until.map_or(true, |until| version < until))
            .fold(Self::empty(), |quirks, entry| quirks | entry.quirks)
    }
}

/// Split the identification into the vendor name and its version.
///
/// Most implementations advertise `Vendor_1.2` or `Vendor-1.2`, while some
/// only put a bare version in the software field and their name in the comments.
fn vendor_version(id: &Id) -> Option<(&str, Version)> {
    let software = id.softwareversion.as_str();

    let (vendor, version) = if software.starts_with(|c: char| c.is_ascii_digit()) {
        let vendor = id.comments.as_deref()?.split_whitespace().next()?;

        (vendor, software)
    } else {
        let split = software
            .char_indices()
            .filter(|(_, c)| *c == '_' || *c == '-')
            .find(|(idx, _)| software[idx + 1..].starts_with(|c: char| c.is_ascii_digit()))
            .map(|(idx, _)| idx)?;

        (&software[..split], &software[split + 1..])
    };

    let mut numbers = version
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .split(|c: char| !c.is_ascii_digit())
        .map(str::parse::<u32>);

    let major = numbers.next()?.ok()?;
    let minor = numbers.next().and_then(Result::ok).unwrap_or_default();

    Some((vendor, (major, minor)))
}
