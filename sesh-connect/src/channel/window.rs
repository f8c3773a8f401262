//! Per-channel flow-control windows.

use sesh::Quirks;

/// The maximum size of the data in a single packet we accept.
pub const MAXIMUM_PACKET_SIZE: u32 = 32768; // 32KiB

/// The window advertised by default.
///
/// The window is only replenished with what the application read,
/// so it also bounds the data buffered for a channel.
pub const LARGE_WINDOW: u32 = 32 * MAXIMUM_PACKET_SIZE; // 1MiB

/// The window advertised to peers that choke on large windows.
pub const SMALL_WINDOW: u32 = 4 * MAXIMUM_PACKET_SIZE;

/// The window we granted to the peer, consumed by the data it sends us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWindow {
    size: u32,
    count: u32,
}

impl LocalWindow {
    /// A window of `size` bytes.
    pub fn new(size: u32) -> Self {
        Self { size, count: size }
    }

    /// The window to grant to a peer with the provided `quirks`.
    pub fn for_peer(quirks: Quirks) -> Self {
        if quirks.contains(Quirks::SMALL_WINDOW) {
            Self::new(SMALL_WINDOW)
        } else {
            Self::new(LARGE_WINDOW)
        }
    }

    /// The window size, as advertised.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The bytes the peer may still send.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Account for `len` bytes received, failing when the peer overran the window.
    pub fn consume(&mut self, len: u32) -> Option<()> {
        self.count = self.count.checked_sub(len)?;

        Some(())
    }

    /// Replenish the window with the space the application freed by reading,
    /// once it reaches half of the window, `buffered` bytes being still unread.
    ///
    /// Returns the bytes to add in a `SSH_MSG_CHANNEL_WINDOW_ADJUST`,
    /// the window count and the buffered bytes never exceeding the window size together.
    pub fn adjustable(&mut self, buffered: usize) -> Option<u32> {
        let buffered = u32::try_from(buffered).unwrap_or(u32::MAX);
        let freed = self
            .size
            .saturating_sub(self.count)
            .saturating_sub(buffered);

        if freed == 0 || freed < self.size / 2 {
            return None;
        }

        self.count += freed;

        Some(freed)
    }
}

/// The window the peer granted to us, consumed by the data we send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteWindow {
    count: u32,
}

impl RemoteWindow {
    /// The bytes we may still send.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Add `bytes_to_add` to the window, failing if it would overflow.
    pub fn replenish(&mut self, bytes_to_add: u32) -> Option<()> {
        self.count = self.count.checked_add(bytes_to_add)?;

        Some(())
    }

    /// Reserve up to `amount` bytes in the window, returning the reserved size.
    pub fn reserve(&mut self, amount: usize) -> u32 {
        let reserved = u32::try_from(amount).unwrap_or(u32::MAX).min(self.count);
        self.count -= reserved;

        reserved
    }
}

impl From<u32> for RemoteWindow {
    fn from(count: u32) -> Self {
        Self { count }
    }
}
