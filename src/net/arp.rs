//! ARP (Address Resolution Protocol) - RFC 826
//!
//! Maps IPv4 addresses to MAC addresses on local networks.
//! Packet format: [HW Type (2)][Proto Type (2)][HW Len (1)][Proto Len (1)]
//!                [Operation (2)][Sender MAC (6)][Sender IP (4)]
//!                [Target MAC (6)][Target IP (4)]
//!
//! The transmit path only ever asks [`AddressResolver::lookup`]; a miss
//! records the address so a request goes out on the next poll cycle, and
//! the datagram that missed is dropped by the caller.

use core::fmt;
use core::net::Ipv4Addr;

use crate::net::ethernet::{self, ETHERTYPE_ARP, ETHERTYPE_IPV4, MacAddr};
use crate::net::ipv4::IpConfig;

/// ARP hardware type for Ethernet
pub const HW_TYPE_ETHERNET: u16 = 1;

/// ARP protocol type for IPv4
pub const PROTO_TYPE_IPV4: u16 = ETHERTYPE_IPV4;

/// ARP operation codes
pub const ARP_REQUEST: u16 = 1;
pub const ARP_REPLY: u16 = 2;

/// ARP packet size (fixed at 28 bytes)
pub const ARP_PACKET_SIZE: usize = 28;

/// Ethernet header plus ARP packet
pub const ARP_FRAME_SIZE: usize = ethernet::HEADER_SIZE + ARP_PACKET_SIZE;

/// A complete ARP frame ready for the MAC
pub type ArpFrame = [u8; ARP_FRAME_SIZE];

/// Errors that can occur during ARP operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpError {
    /// Packet is too short to be valid
    PacketTooShort,
    /// Invalid hardware type (not Ethernet)
    InvalidHardwareType,
    /// Invalid protocol type (not IPv4)
    InvalidProtocolType,
    /// Invalid hardware or protocol address length
    InvalidAddressLength,
    /// Unknown operation code
    UnknownOperation,
}

impl fmt::Display for ArpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArpError::PacketTooShort => write!(f, "ARP packet too short"),
            ArpError::InvalidHardwareType => write!(f, "ARP hardware type is not Ethernet"),
            ArpError::InvalidProtocolType => write!(f, "ARP protocol type is not IPv4"),
            ArpError::InvalidAddressLength => write!(f, "ARP address length mismatch"),
            ArpError::UnknownOperation => write!(f, "unknown ARP operation"),
        }
    }
}

impl core::error::Error for ArpError {}

/// ARP packet structure (Ethernet/IPv4 only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// Operation (1 = request, 2 = reply)
    pub operation: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Create a new ARP request packet
    pub fn new_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ARP_REQUEST,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// Create a new ARP reply packet
    pub fn new_reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ARP_REPLY,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Parse an ARP packet from raw bytes (at least 28 bytes)
    pub fn from_bytes(data: &[u8]) -> Result<Self, ArpError> {
        if data.len() < ARP_PACKET_SIZE {
            return Err(ArpError::PacketTooShort);
        }

        if u16::from_be_bytes([data[0], data[1]]) != HW_TYPE_ETHERNET {
            return Err(ArpError::InvalidHardwareType);
        }

        if u16::from_be_bytes([data[2], data[3]]) != PROTO_TYPE_IPV4 {
            return Err(ArpError::InvalidProtocolType);
        }

        if data[4] != 6 || data[5] != 4 {
            return Err(ArpError::InvalidAddressLength);
        }

        let operation = u16::from_be_bytes([data[6], data[7]]);
        if operation != ARP_REQUEST && operation != ARP_REPLY {
            return Err(ArpError::UnknownOperation);
        }

        let mut sender_mac = [0u8; 6];
        sender_mac.copy_from_slice(&data[8..14]);
        let mut target_mac = [0u8; 6];
        target_mac.copy_from_slice(&data[18..24]);

        Ok(Self {
            operation,
            sender_mac: MacAddr(sender_mac),
            sender_ip: Ipv4Addr::new(data[14], data[15], data[16], data[17]),
            target_mac: MacAddr(target_mac),
            target_ip: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
        })
    }

    /// Convert the ARP packet to bytes for transmission
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut bytes = [0u8; ARP_PACKET_SIZE];
        bytes[0..2].copy_from_slice(&HW_TYPE_ETHERNET.to_be_bytes());
        bytes[2..4].copy_from_slice(&PROTO_TYPE_IPV4.to_be_bytes());
        bytes[4] = 6;
        bytes[5] = 4;
        bytes[6..8].copy_from_slice(&self.operation.to_be_bytes());
        bytes[8..14].copy_from_slice(&self.sender_mac.0);
        bytes[14..18].copy_from_slice(&self.sender_ip.octets());
        bytes[18..24].copy_from_slice(&self.target_mac.0);
        bytes[24..28].copy_from_slice(&self.target_ip.octets());
        bytes
    }

    /// Wrap the packet in an Ethernet header
    pub fn to_frame(&self, dest: MacAddr) -> ArpFrame {
        let mut frame = [0u8; ARP_FRAME_SIZE];
        ethernet::write_header(&mut frame, dest, self.sender_mac, ETHERTYPE_ARP);
        frame[ethernet::HEADER_SIZE..].copy_from_slice(&self.to_bytes());
        frame
    }

    pub fn is_request(&self) -> bool {
        self.operation == ARP_REQUEST
    }

    pub fn is_reply(&self) -> bool {
        self.operation == ARP_REPLY
    }
}

/// IP to MAC resolution, consulted by the UDP transmit path.
pub trait AddressResolver {
    /// Forget everything and adopt a new interface configuration
    fn reinit(&mut self, mac: MacAddr, config: &IpConfig);

    /// Cached MAC for `ip`. A miss starts resolution as a side effect.
    fn lookup(&mut self, ip: Ipv4Addr) -> Option<MacAddr>;

    /// Handle one received ARP frame, returning a reply to transmit
    fn handle(&mut self, frame: &[u8]) -> Option<ArpFrame>;

    /// Next outstanding request to put on the wire
    fn poll_request(&mut self) -> Option<ArpFrame> {
        None
    }

    /// Periodic work, called once per poll cycle
    fn run_timers(&mut self) {}
}

/// ARP cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

/// Fixed-size ARP table.
///
/// When full, the entry learned or refreshed longest ago is replaced.
pub struct ArpCache<const N: usize> {
    entries: [Option<ArpEntry>; N],
    /// Insertion stamp per slot, compared with wrapping arithmetic
    stamps: [u32; N],
    clock: u32,
    pending: Option<Ipv4Addr>,
    mac: MacAddr,
    config: IpConfig,
}

impl<const N: usize> ArpCache<N> {
    pub const fn new() -> Self {
        Self {
            entries: [None; N],
            stamps: [0; N],
            clock: 0,
            pending: None,
            mac: MacAddr::ZERO,
            config: IpConfig::unconfigured(),
        }
    }

    /// Add or update an entry
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        let known = self.entries.iter().position(|e| e.is_some_and(|entry| entry.ip == ip));
        let free = || self.entries.iter().position(Option::is_none);

        let Some(slot) = known.or_else(free).or_else(|| self.oldest()) else {
            return;
        };

        self.entries[slot] = Some(ArpEntry { ip, mac });
        self.stamps[slot] = self.clock;
        self.clock = self.clock.wrapping_add(1);
    }

    /// Slot whose entry was stamped longest ago
    fn oldest(&self) -> Option<usize> {
        (0..N).max_by_key(|&slot| self.clock.wrapping_sub(self.stamps[slot]))
    }

    /// Look up without starting resolution
    pub fn get(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.ip == ip)
            .map(|e| e.mac)
    }

    pub fn remove(&mut self, ip: Ipv4Addr) -> Option<ArpEntry> {
        let slot = self.entries.iter_mut().find(|e| e.is_some_and(|entry| entry.ip == ip))?;
        slot.take()
    }

    pub fn clear(&mut self) {
        self.entries = [None; N];
        self.stamps = [0; N];
        self.clock = 0;
        self.pending = None;
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> impl Iterator<Item = &ArpEntry> {
        self.entries.iter().flatten()
    }
}

impl<const N: usize> Default for ArpCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AddressResolver for ArpCache<N> {
    fn reinit(&mut self, mac: MacAddr, config: &IpConfig) {
        self.clear();
        self.mac = mac;
        self.config = *config;
    }

    fn lookup(&mut self, ip: Ipv4Addr) -> Option<MacAddr> {
        let found = self.get(ip);
        if found.is_none() {
            self.pending = Some(ip);
        }
        found
    }

    fn handle(&mut self, frame: &[u8]) -> Option<ArpFrame> {
        let packet = match frame.get(ethernet::HEADER_SIZE..).map(ArpPacket::from_bytes) {
            Some(Ok(packet)) => packet,
            Some(Err(e)) => {
                log::trace!(target: "arp", "dropping packet: {}", e);
                return None;
            }
            None => return None,
        };

        // Learn the sender (gratuitous ARP support)
        if !packet.sender_ip.is_unspecified() {
            self.insert(packet.sender_ip, packet.sender_mac);
            if self.pending == Some(packet.sender_ip) {
                self.pending = None;
            }
        }

        if packet.is_request() && self.config.is_valid() && packet.target_ip == self.config.address {
            let reply = ArpPacket::new_reply(
                self.mac,
                self.config.address,
                packet.sender_mac,
                packet.sender_ip,
            );
            return Some(reply.to_frame(packet.sender_mac));
        }

        None
    }

    fn poll_request(&mut self) -> Option<ArpFrame> {
        let target = self.pending.take()?;
        log::debug!(target: "arp", "who-has {} tell {}", target, self.config.address);
        let request = ArpPacket::new_request(self.mac, self.config.address, target);
        Some(request.to_frame(MacAddr::BROADCAST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUR_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x10]);
    const PEER_MAC: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn cache() -> ArpCache<4> {
        let mut cache = ArpCache::new();
        cache.reinit(
            OUR_MAC,
            &IpConfig::new(
                Ipv4Addr::new(192, 168, 1, 10),
                Ipv4Addr::new(255, 255, 255, 0),
                Ipv4Addr::new(192, 168, 1, 1),
            ),
        );
        cache
    }

    #[test]
    fn test_arp_packet_parsing() {
        let original =
            ArpPacket::new_request(PEER_MAC, Ipv4Addr::new(192, 168, 1, 20), Ipv4Addr::new(192, 168, 1, 1));
        let parsed = ArpPacket::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.is_request());
    }

    #[test]
    fn test_arp_packet_rejects_bad_fields() {
        let mut bytes = ArpPacket::new_request(PEER_MAC, Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST).to_bytes();
        assert_eq!(ArpPacket::from_bytes(&bytes[..10]), Err(ArpError::PacketTooShort));
        bytes[7] = 9;
        assert_eq!(ArpPacket::from_bytes(&bytes), Err(ArpError::UnknownOperation));
        bytes[1] = 6;
        assert_eq!(ArpPacket::from_bytes(&bytes), Err(ArpError::InvalidHardwareType));
    }

    #[test]
    fn test_replies_to_request_for_us() {
        let mut cache = cache();
        let request =
            ArpPacket::new_request(PEER_MAC, Ipv4Addr::new(192, 168, 1, 20), Ipv4Addr::new(192, 168, 1, 10));

        let reply = cache.handle(&request.to_frame(MacAddr::BROADCAST)).unwrap();
        assert_eq!(ethernet::destination(&reply), Some(PEER_MAC));
        let parsed = ArpPacket::from_bytes(&reply[ethernet::HEADER_SIZE..]).unwrap();
        assert!(parsed.is_reply());
        assert_eq!(parsed.sender_mac, OUR_MAC);
        assert_eq!(parsed.target_ip, Ipv4Addr::new(192, 168, 1, 20));

        // Sender was learned on the way
        assert_eq!(cache.get(Ipv4Addr::new(192, 168, 1, 20)), Some(PEER_MAC));
    }

    #[test]
    fn test_request_for_other_host_is_learned_not_answered() {
        let mut cache = cache();
        let request =
            ArpPacket::new_request(PEER_MAC, Ipv4Addr::new(192, 168, 1, 20), Ipv4Addr::new(192, 168, 1, 99));
        assert!(cache.handle(&request.to_frame(MacAddr::BROADCAST)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_queues_one_request() {
        let mut cache = cache();
        let gateway = Ipv4Addr::new(192, 168, 1, 1);

        assert_eq!(cache.lookup(gateway), None);
        let frame = cache.poll_request().unwrap();
        assert_eq!(ethernet::destination(&frame), Some(MacAddr::BROADCAST));
        let request = ArpPacket::from_bytes(&frame[ethernet::HEADER_SIZE..]).unwrap();
        assert_eq!(request.target_ip, gateway);
        assert!(cache.poll_request().is_none());
    }

    #[test]
    fn test_full_table_replaces_oldest() {
        let mut cache = cache();
        for i in 1..=5u8 {
            cache.insert(Ipv4Addr::new(10, 0, 0, i), MacAddr([0, 0, 0, 0, 0, i]));
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(Ipv4Addr::new(10, 0, 0, 1)), None);
        assert_eq!(cache.get(Ipv4Addr::new(10, 0, 0, 5)), Some(MacAddr([0, 0, 0, 0, 0, 5])));
    }

    #[test]
    fn test_refilled_slot_is_not_evicted_first() {
        let mut cache = cache();
        for i in 1..=4u8 {
            cache.insert(Ipv4Addr::new(10, 0, 0, i), MacAddr([0, 0, 0, 0, 0, i]));
        }
        cache.remove(Ipv4Addr::new(10, 0, 0, 2));

        // .5 refills the hole; .6 and .7 must push out .1 and .3
        for i in 5..=7u8 {
            cache.insert(Ipv4Addr::new(10, 0, 0, i), MacAddr([0, 0, 0, 0, 0, i]));
        }

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(Ipv4Addr::new(10, 0, 0, 1)), None);
        assert_eq!(cache.get(Ipv4Addr::new(10, 0, 0, 3)), None);
        for i in [4u8, 5, 6, 7] {
            assert_eq!(cache.get(Ipv4Addr::new(10, 0, 0, i)), Some(MacAddr([0, 0, 0, 0, 0, i])));
        }
    }

    #[test]
    fn test_update_refreshes_age() {
        let mut cache = cache();
        for i in 1..=4u8 {
            cache.insert(Ipv4Addr::new(10, 0, 0, i), MacAddr([0, 0, 0, 0, 0, i]));
        }
        cache.insert(Ipv4Addr::new(10, 0, 0, 1), PEER_MAC);
        cache.insert(Ipv4Addr::new(10, 0, 0, 5), MacAddr([0, 0, 0, 0, 0, 5]));

        assert_eq!(cache.get(Ipv4Addr::new(10, 0, 0, 1)), Some(PEER_MAC));
        assert_eq!(cache.get(Ipv4Addr::new(10, 0, 0, 2)), None);
    }

    #[test]
    fn test_reinit_clears() {
        let mut cache = cache();
        cache.insert(Ipv4Addr::new(10, 0, 0, 1), PEER_MAC);
        cache.reinit(OUR_MAC, &IpConfig::unconfigured());
        assert!(cache.is_empty());
    }
}
