//! Address bootstrap collaborators: DHCP client and RFC 3927 link-local.
//!
//! Both own their retry timing. The network core only asks for a result
//! and falls back from DHCP to zeroconf when DHCP fails. While they run,
//! the core lends them its device, resolver, IP layer and UDP transport
//! through a [`BootstrapContext`].

use core::fmt;
use core::net::Ipv4Addr;

use crate::net::arp::AddressResolver;
use crate::net::device::{FrameIo, TransmitError};
use crate::net::ethernet::{self, ETHERTYPE_ARP, ETHERTYPE_IPV4, MacAddr};
use crate::net::ipv4::{IpConfig, IpLayer};
use crate::net::stack::Transport;
use crate::net::udp::{SendError, UdpHandle};

/// The parts of the stack a bootstrap client may drive.
///
/// DHCP binds port 68 on `udp` and exchanges datagrams through
/// [`send`](Self::send) and [`poll`](Self::poll); link-local negotiation
/// puts its ARP probes on the wire with [`transmit`](Self::transmit).
pub struct BootstrapContext<'a> {
    pub mac: MacAddr,
    pub device: &'a mut dyn FrameIo,
    pub resolver: &'a mut dyn AddressResolver,
    pub ip: &'a mut dyn IpLayer,
    pub udp: &'a mut Transport,
}

impl<'a> BootstrapContext<'a> {
    pub fn new(
        mac: MacAddr,
        device: &'a mut dyn FrameIo,
        resolver: &'a mut dyn AddressResolver,
        ip: &'a mut dyn IpLayer,
        udp: &'a mut Transport,
    ) -> Self {
        Self {
            mac,
            device,
            resolver,
            ip,
            udp,
        }
    }

    /// Send a datagram from a port bound on the transport
    pub fn send(&mut self, handle: UdpHandle, payload: &[u8], to_ip: Ipv4Addr, to_port: u16) -> Result<(), SendError> {
        self.udp
            .send(&mut *self.device, &mut *self.resolver, handle, payload, to_ip, to_port)
    }

    /// Put a raw frame on the wire
    pub fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        self.device.transmit(frame)
    }

    /// Receive and dispatch at most one frame.
    ///
    /// IPv4 goes through the IP layer into the transport, ARP to the
    /// resolver. The frame is freed before any ARP reply is sent.
    /// Returns whether a frame was received.
    pub fn poll(&mut self) -> bool {
        let mut reply = None;

        let Some(frame) = self.device.receive() else {
            return false;
        };

        match ethernet::ethertype(frame) {
            Some(ETHERTYPE_IPV4) => self.ip.handle(frame, &mut *self.udp),
            Some(ETHERTYPE_ARP) => reply = self.resolver.handle(frame),
            _ => {}
        }
        self.device.free_received();

        if let Some(reply) = reply {
            if let Err(e) = self.device.transmit(&reply) {
                log::warn!(target: "net", "ARP reply lost: {}", e);
            }
        }

        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpError {
    /// No offer or no ack before the client gave up
    Timeout,
    /// The server refused the request
    Nak,
    /// The client is not available on this build
    Unsupported,
}

impl fmt::Display for DhcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhcpError::Timeout => write!(f, "DHCP timed out"),
            DhcpError::Nak => write!(f, "DHCP request refused"),
            DhcpError::Unsupported => write!(f, "DHCP not supported"),
        }
    }
}

impl core::error::Error for DhcpError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroconfError {
    /// Every probed link-local address was in use
    NoFreeAddress,
    /// Link-local addressing is not available on this build
    Unsupported,
}

impl fmt::Display for ZeroconfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZeroconfError::NoFreeAddress => write!(f, "no free link-local address"),
            ZeroconfError::Unsupported => write!(f, "zeroconf not supported"),
        }
    }
}

impl core::error::Error for ZeroconfError {}

/// DHCP client
pub trait DhcpClient {
    /// Run the DHCP exchange to completion
    fn acquire(&mut self, ctx: &mut BootstrapContext<'_>, hostname: &str) -> Result<IpConfig, DhcpError>;

    /// Give the lease back to the server
    fn release(&mut self, ctx: &mut BootstrapContext<'_>);

    /// Lease renewal and rebinding, called once per poll cycle
    fn run_timers(&mut self, _ctx: &mut BootstrapContext<'_>) {}
}

/// RFC 3927 link-local address negotiation
pub trait Zeroconf {
    /// Pick and defend a 169.254/16 address. `current` is the configuration
    /// in effect; fields the negotiation does not decide are kept from it.
    fn negotiate(&mut self, ctx: &mut BootstrapContext<'_>, current: &IpConfig) -> Result<IpConfig, ZeroconfError>;
}

/// Stand-in for builds without a DHCP client
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDhcp;

impl DhcpClient for NoDhcp {
    fn acquire(&mut self, _ctx: &mut BootstrapContext<'_>, _hostname: &str) -> Result<IpConfig, DhcpError> {
        Err(DhcpError::Unsupported)
    }

    fn release(&mut self, _ctx: &mut BootstrapContext<'_>) {}
}

/// Stand-in for builds without link-local support
#[derive(Debug, Default, Clone, Copy)]
pub struct NoZeroconf;

impl Zeroconf for NoZeroconf {
    fn negotiate(&mut self, _ctx: &mut BootstrapContext<'_>, _current: &IpConfig) -> Result<IpConfig, ZeroconfError> {
        Err(ZeroconfError::Unsupported)
    }
}
