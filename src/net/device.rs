//! Frame I/O boundary to the Ethernet MAC driver.

use core::fmt;

/// Link status of a network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Down,
    Unknown,
}

/// Errors that can occur during frame transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitError {
    /// Frame too large for the device
    PacketTooLarge,
    /// TX descriptors are all in use, try again later
    BufferFull,
    /// Link is down or the MAC is not running
    NotReady,
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitError::PacketTooLarge => write!(f, "frame too large"),
            TransmitError::BufferFull => write!(f, "transmit buffer full"),
            TransmitError::NotReady => write!(f, "device not ready"),
        }
    }
}

impl core::error::Error for TransmitError {}

/// Receive/transmit primitives every MAC driver provides.
///
/// Reception is a two step protocol: [`receive`](FrameIo::receive) lends
/// the oldest pending frame, and [`free_received`](FrameIo::free_received)
/// hands its buffer back to the driver. The network core always frees a
/// frame it received before it transmits anything.
pub trait FrameIo {
    /// Borrow the next received frame, if any. Never blocks.
    fn receive(&mut self) -> Option<&[u8]>;

    /// Release the frame returned by the last `receive`.
    fn free_received(&mut self);

    /// Transmit one complete Ethernet frame (without CRC).
    fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError>;

    /// Current link status
    fn link_status(&self) -> LinkStatus {
        LinkStatus::Unknown
    }
}
