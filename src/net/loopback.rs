//! Loopback network interface
//!
//! A virtual device that echoes every transmitted frame back as a received
//! frame. This allows running the whole data plane on a host without a MAC.

use crate::net::buffer::{BufferError, FrameRing};
use crate::net::device::{FrameIo, LinkStatus, TransmitError};

/// Loopback network device
///
/// Transmitted frames are copied into a ring of `N` slots and handed out
/// again, oldest first, by `receive()`. A full ring refuses new frames.
pub struct LoopbackDevice<const N: usize> {
    ring: FrameRing<N>,
}

impl<const N: usize> LoopbackDevice<N> {
    pub const fn new() -> Self {
        Self {
            ring: FrameRing::new(),
        }
    }

    /// Frames waiting to be received
    pub fn pending(&self) -> usize {
        self.ring.len()
    }
}

impl<const N: usize> Default for LoopbackDevice<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameIo for LoopbackDevice<N> {
    fn receive(&mut self) -> Option<&[u8]> {
        self.ring.front()
    }

    fn free_received(&mut self) {
        self.ring.discard();
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        self.ring.push(frame).map_err(|e| match e {
            BufferError::Full => TransmitError::BufferFull,
            BufferError::PacketTooLarge => TransmitError::PacketTooLarge,
        })
    }

    fn link_status(&self) -> LinkStatus {
        // Loopback is always up
        LinkStatus::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ethernet::MAX_FRAME_SIZE;

    #[test]
    fn test_loopback_echo() {
        let mut lo = LoopbackDevice::<4>::new();
        assert!(lo.receive().is_none());

        lo.transmit(&[1, 2, 3]).unwrap();
        lo.transmit(&[4, 5]).unwrap();

        assert_eq!(lo.receive(), Some(&[1u8, 2, 3][..]));
        // Not consumed until freed
        assert_eq!(lo.receive(), Some(&[1u8, 2, 3][..]));
        lo.free_received();
        assert_eq!(lo.receive(), Some(&[4u8, 5][..]));
        lo.free_received();
        assert!(lo.receive().is_none());
    }

    #[test]
    fn test_loopback_full() {
        let mut lo = LoopbackDevice::<2>::new();
        lo.transmit(&[0]).unwrap();
        lo.transmit(&[0]).unwrap();
        assert_eq!(lo.transmit(&[0]), Err(TransmitError::BufferFull));
        assert_eq!(lo.pending(), 2);

        lo.free_received();
        lo.transmit(&[1]).unwrap();
        assert_eq!(lo.pending(), 2);
    }

    #[test]
    fn test_loopback_oversize() {
        let mut lo = LoopbackDevice::<2>::new();
        let big = [0u8; MAX_FRAME_SIZE + 1];
        assert_eq!(lo.transmit(&big), Err(TransmitError::PacketTooLarge));
        assert_eq!(lo.link_status(), LinkStatus::Up);
    }
}
