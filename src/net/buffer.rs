//! Fixed-size circular buffers for frames and received datagrams
//!
//! Both rings keep free-running 16-bit head/tail counters and mask them
//! with `N - 1` when indexing a slot, so `N` must be a power of two. That
//! is checked when the ring is constructed. The ring is empty exactly when
//! head == tail.

use core::net::Ipv4Addr;

use crate::config::UDP_DATA_SIZE;
use crate::net::ethernet::MAX_FRAME_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    Full,
    PacketTooLarge,
}

impl core::fmt::Display for BufferError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BufferError::Full => write!(f, "ring full"),
            BufferError::PacketTooLarge => write!(f, "frame exceeds slot size"),
        }
    }
}

impl core::error::Error for BufferError {}

struct FrameSlot {
    data: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl FrameSlot {
    const EMPTY: Self = Self {
        data: [0; MAX_FRAME_SIZE],
        len: 0,
    };
}

/// Ring of whole Ethernet frames; refuses new frames while full.
pub struct FrameRing<const N: usize> {
    slots: [FrameSlot; N],
    head: u16,
    tail: u16,
}

impl<const N: usize> FrameRing<N> {
    const MASK: u16 = {
        assert!(N.is_power_of_two(), "ring size must be a power of two");
        assert!(N <= 0x8000, "ring size must fit the 16-bit counters");
        (N - 1) as u16
    };

    pub const fn new() -> Self {
        let _ = Self::MASK;
        Self {
            slots: [const { FrameSlot::EMPTY }; N],
            head: 0,
            tail: 0,
        }
    }

    /// Copy a frame into the next free slot
    pub fn push(&mut self, frame: &[u8]) -> Result<(), BufferError> {
        if self.is_full() {
            return Err(BufferError::Full);
        }
        if frame.len() > MAX_FRAME_SIZE {
            return Err(BufferError::PacketTooLarge);
        }

        let slot = &mut self.slots[(self.head & Self::MASK) as usize];
        slot.data[..frame.len()].copy_from_slice(frame);
        slot.len = frame.len();

        self.head = self.head.wrapping_add(1);
        Ok(())
    }

    /// Oldest frame, left in place
    pub fn front(&self) -> Option<&[u8]> {
        if self.is_empty() {
            return None;
        }
        let slot = &self.slots[(self.tail & Self::MASK) as usize];
        Some(&slot.data[..slot.len])
    }

    /// Drop the oldest frame
    pub fn discard(&mut self) {
        if !self.is_empty() {
            self.tail = self.tail.wrapping_add(1);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    pub fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail) as usize
    }

    pub fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for FrameRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// One received datagram as stored in a port's queue.
#[derive(Clone)]
pub struct QueueEntry {
    data: [u8; UDP_DATA_SIZE],
    from_ip: Ipv4Addr,
    from_port: u16,
    size: u16,
    wire_len: u16,
}

impl QueueEntry {
    const EMPTY: Self = Self {
        data: [0; UDP_DATA_SIZE],
        from_ip: Ipv4Addr::UNSPECIFIED,
        from_port: 0,
        size: 0,
        wire_len: 0,
    };

    /// Stored payload, at most `UDP_DATA_SIZE` bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }

    pub fn from_ip(&self) -> Ipv4Addr {
        self.from_ip
    }

    pub fn from_port(&self) -> u16 {
        self.from_port
    }

    /// Payload length the sender put on the wire
    pub fn wire_len(&self) -> usize {
        self.wire_len as usize
    }

    /// True when the payload did not fit the slot and was cut
    pub fn is_truncated(&self) -> bool {
        self.wire_len > self.size
    }
}

/// Per-port receive queue.
///
/// Never refuses a datagram: when all `N` slots hold unread entries the
/// oldest one is overwritten.
pub struct RxQueue<const N: usize> {
    entries: [QueueEntry; N],
    head: u16,
    tail: u16,
}

impl<const N: usize> RxQueue<N> {
    const MASK: u16 = {
        assert!(N.is_power_of_two(), "queue size must be a power of two");
        assert!(N <= 0x8000, "queue size must fit the 16-bit counters");
        (N - 1) as u16
    };

    pub const fn new() -> Self {
        let _ = Self::MASK;
        Self {
            entries: [const { QueueEntry::EMPTY }; N],
            head: 0,
            tail: 0,
        }
    }

    /// Store a datagram, truncating the payload to the slot size.
    ///
    /// Returns `true` when an unread entry had to be overwritten.
    pub fn push(&mut self, from_ip: Ipv4Addr, from_port: u16, payload: &[u8]) -> bool {
        let overwritten = self.len() == N;
        if overwritten {
            self.tail = self.tail.wrapping_add(1);
        }

        let size = payload.len().min(UDP_DATA_SIZE);
        let entry = &mut self.entries[(self.head & Self::MASK) as usize];
        entry.data[..size].copy_from_slice(&payload[..size]);
        entry.from_ip = from_ip;
        entry.from_port = from_port;
        entry.size = size as u16;
        entry.wire_len = payload.len().min(u16::MAX as usize) as u16;

        self.head = self.head.wrapping_add(1);
        overwritten
    }

    /// Take the oldest entry. The slot stays readable until the next push.
    pub fn pop(&mut self) -> Option<&QueueEntry> {
        if self.is_empty() {
            return None;
        }
        let index = (self.tail & Self::MASK) as usize;
        self.tail = self.tail.wrapping_add(1);
        Some(&self.entries[index])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail) as usize
    }

    pub fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for RxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
