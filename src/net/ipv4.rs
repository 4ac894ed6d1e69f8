//! IPv4 Protocol Implementation
//!
//! Address configuration, the RFC 1071 checksum, inbound header validation
//! and the [`IpLayer`] boundary the network core drives. [`Ipv4Input`] is
//! the in-crate IP layer: it validates inbound packets and hands UDP to the
//! transport; there is no fragmentation, reassembly or forwarding.
//!
//! # References
//! - RFC 791: Internet Protocol (IPv4)
//! - RFC 1071: Computing the Internet Checksum

use core::fmt;

/// IPv4 Address type (re-export for convenience)
pub use core::net::Ipv4Addr;

use crate::net::ethernet::{self, MacAddr};
use crate::net::udp::UdpInput;

/// IPv4 Protocol Numbers (IANA assigned)
pub mod protocol {
    pub const UDP: u8 = 17;
}

/// IPv4 header flag bits, as found in the 3-bit flags field
pub mod flags {
    pub const DONT_FRAGMENT: u8 = 0b010;
    pub const MORE_FRAGMENTS: u8 = 0b001;
}

/// Default TTL (Time To Live) value
pub const DEFAULT_TTL: u8 = 64;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Version 4, five 32-bit words
pub const VERSION_IHL: u8 = 0x45;

/// Byte offsets inside an option-less header
pub mod offset {
    pub const VERSION_IHL: usize = 0;
    pub const TOS: usize = 1;
    pub const TOTAL_LENGTH: usize = 2;
    pub const IDENTIFICATION: usize = 4;
    pub const FLAGS_FRAGMENT: usize = 6;
    pub const TTL: usize = 8;
    pub const PROTOCOL: usize = 9;
    pub const CHECKSUM: usize = 10;
    pub const SOURCE: usize = 12;
    pub const DESTINATION: usize = 16;
}

/// Address, netmask and gateway of the interface.
///
/// A gateway of 0.0.0.0 means no default route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpConfig {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl IpConfig {
    pub const fn new(address: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            address,
            netmask,
            gateway,
        }
    }

    /// All zeros, the state before DHCP or zeroconf produced anything
    pub const fn unconfigured() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED)
    }

    /// Check if configuration is valid (IP is not 0.0.0.0)
    pub fn is_valid(&self) -> bool {
        !self.address.is_unspecified()
    }

    /// Host bits of the subnet (`!netmask`)
    pub fn broadcast_mask(&self) -> u32 {
        !u32::from(self.netmask)
    }

    /// Network part of our own address (`address & netmask`)
    pub fn on_network_mask(&self) -> u32 {
        u32::from(self.address) & u32::from(self.netmask)
    }

    /// Directed broadcast address of the subnet
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) | self.broadcast_mask())
    }

    /// Prefix length, assuming a contiguous mask
    pub fn netmask_cidr(&self) -> u32 {
        u32::from(self.netmask).count_ones()
    }

    /// Check if `ip` shares our subnet
    pub fn is_local(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        (u32::from(self.address) & mask) == (u32::from(ip) & mask)
    }
}

impl Default for IpConfig {
    fn default() -> Self {
        Self::unconfigured()
    }
}

/// Calculate the Internet checksum (RFC 1071)
///
/// The checksum is the 16-bit one's complement of the one's complement sum
/// of all 16-bit words. Run it over a header whose checksum field is zero
/// to produce the value to store; run it over a received header to get 0
/// when the header is intact.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for chunk in data.chunks(2) {
        let word = if chunk.len() == 2 {
            u16::from_be_bytes([chunk[0], chunk[1]])
        } else {
            // Odd length: pad with 0
            u16::from_be_bytes([chunk[0], 0])
        };
        sum += word as u32;
    }

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// Parsed fixed part of an inbound IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Internet Header Length in 32-bit words (5-15)
    pub ihl: u8,
    /// Total packet length (header + data) in bytes
    pub total_length: u16,
    pub identification: u16,
    /// 3-bit flags field, see [`flags`]
    pub flags: u8,
    /// Fragment offset in 8-byte blocks
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
}

impl Ipv4Header {
    /// Parse and validate an IPv4 header
    ///
    /// # Returns
    /// - `Ok((Ipv4Header, payload_offset))` - Parsed header and offset to payload data
    /// - `Err(Ipv4Error)` - Parse error
    ///
    /// # Validation
    /// - version is 4 and IHL >= 5
    /// - total length covers the header and fits the buffer
    /// - header checksum verifies
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), Ipv4Error> {
        if data.len() < MIN_HEADER_SIZE {
            return Err(Ipv4Error::PacketTooShort);
        }

        let version = data[0] >> 4;
        let ihl = data[0] & 0x0F;

        if version != 4 {
            return Err(Ipv4Error::InvalidVersion(version));
        }

        if ihl < 5 {
            return Err(Ipv4Error::InvalidIhl(ihl));
        }

        let header_len = (ihl as usize) * 4;
        if data.len() < header_len {
            return Err(Ipv4Error::PacketTooShort);
        }

        let total_length = u16::from_be_bytes([data[2], data[3]]);
        if (total_length as usize) < header_len || (total_length as usize) > data.len() {
            return Err(Ipv4Error::InvalidLength);
        }

        if checksum(&data[..header_len]) != 0 {
            return Err(Ipv4Error::ChecksumMismatch);
        }

        let flags_frag = u16::from_be_bytes([data[6], data[7]]);

        let header = Self {
            ihl,
            total_length,
            identification: u16::from_be_bytes([data[4], data[5]]),
            flags: (flags_frag >> 13) as u8,
            fragment_offset: flags_frag & 0x1FFF,
            ttl: data[8],
            protocol: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            src_ip: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dest_ip: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        };

        Ok((header, header_len))
    }

    /// Check if this packet is a fragment
    pub fn is_fragmented(&self) -> bool {
        (self.flags & flags::MORE_FRAGMENTS) != 0 || self.fragment_offset != 0
    }

    /// Get the header length in bytes
    pub fn header_length(&self) -> usize {
        (self.ihl as usize) * 4
    }
}

/// IPv4 Error Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv4Error {
    /// Packet is too short to contain a valid header
    PacketTooShort,
    /// Invalid IP version (not 4)
    InvalidVersion(u8),
    /// Invalid IHL (Internet Header Length < 5)
    InvalidIhl(u8),
    /// Invalid total length field
    InvalidLength,
    /// Header checksum mismatch
    ChecksumMismatch,
}

impl fmt::Display for Ipv4Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ipv4Error::PacketTooShort => write!(f, "Packet too short"),
            Ipv4Error::InvalidVersion(v) => write!(f, "Invalid IP version: {}", v),
            Ipv4Error::InvalidIhl(ihl) => write!(f, "Invalid IHL: {}", ihl),
            Ipv4Error::InvalidLength => write!(f, "Invalid total length"),
            Ipv4Error::ChecksumMismatch => write!(f, "Checksum mismatch"),
        }
    }
}

impl core::error::Error for Ipv4Error {}

/// The IP layer as seen by the network core.
///
/// Both [`reinit`](IpLayer::reinit) and [`set_address`](IpLayer::set_address)
/// are called again whenever the interface configuration changes.
pub trait IpLayer {
    /// Reset all state for a (possibly new) interface configuration
    fn reinit(&mut self, mac: MacAddr, config: &IpConfig);

    /// Adopt a new address configuration
    fn set_address(&mut self, config: &IpConfig);

    fn shutdown(&mut self);

    /// Handle one received frame carrying EtherType IPv4
    fn handle(&mut self, frame: &[u8], udp: &mut dyn UdpInput);

    /// Periodic work, called once per poll cycle
    fn run_timers(&mut self) {}
}

/// Minimal receive-side IPv4: validate, filter by destination, deliver UDP.
#[derive(Debug)]
pub struct Ipv4Input {
    mac: MacAddr,
    config: IpConfig,
    running: bool,
}

impl Ipv4Input {
    pub const fn new() -> Self {
        Self {
            mac: MacAddr::ZERO,
            config: IpConfig::unconfigured(),
            running: false,
        }
    }

    pub fn config(&self) -> &IpConfig {
        &self.config
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Destination filter.
    ///
    /// While unconfigured everything is accepted so DHCP offers addressed
    /// to the prospective address reach the client.
    fn accepts(&self, dest: Ipv4Addr) -> bool {
        if !self.config.is_valid() {
            return true;
        }

        dest == self.config.address
            || dest.is_broadcast()
            || dest == self.config.broadcast()
            || dest.is_multicast()
    }
}

impl Default for Ipv4Input {
    fn default() -> Self {
        Self::new()
    }
}

impl IpLayer for Ipv4Input {
    fn reinit(&mut self, mac: MacAddr, config: &IpConfig) {
        self.mac = mac;
        self.config = *config;
        self.running = true;
    }

    fn set_address(&mut self, config: &IpConfig) {
        self.config = *config;
    }

    fn shutdown(&mut self) {
        self.running = false;
    }

    fn handle(&mut self, frame: &[u8], udp: &mut dyn UdpInput) {
        if !self.running || frame.len() < ethernet::HEADER_SIZE {
            return;
        }

        let packet = &frame[ethernet::HEADER_SIZE..];
        let (header, header_len) = match Ipv4Header::from_bytes(packet) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::trace!(target: "ip", "dropping packet: {}", e);
                return;
            }
        };

        if header.is_fragmented() {
            log::debug!(target: "ip", "fragment from {} dropped (id {})", header.src_ip, header.identification);
            return;
        }

        if !self.accepts(header.dest_ip) {
            return;
        }

        let payload = &packet[header_len..header.total_length as usize];

        match header.protocol {
            protocol::UDP => udp.input(header.src_ip, payload),
            other => {
                log::trace!(target: "ip", "protocol {} from {} not handled", other, header.src_ip);
            }
        }
    }
}
