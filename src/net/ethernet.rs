//Ethernet Frame Layer (OSI Layer 2)
//
//Header layout and link-layer addressing helpers. Frames are never copied
//into an owned structure; callers work on the driver's buffer in place.
//Frame structure: [Dest MAC (6)][Src MAC (6)][EtherType (2)][Payload (46-1500)]

use core::fmt;
use core::net::Ipv4Addr;

/// EtherType constants
pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// Ethernet frame header size (excluding CRC)
pub const HEADER_SIZE: usize = 14;

/// Maximum Ethernet payload size (MTU)
pub const MAX_PAYLOAD_SIZE: usize = 1500;

/// Largest frame handed to or taken from the MAC (CRC handled in hardware)
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Fixed IANA prefix of IPv4 multicast MAC addresses
pub const MULTICAST_OUI: [u8; 3] = [0x01, 0x00, 0x5E];

/// A 48-bit link-layer address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// FF:FF:FF:FF:FF:FF
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group bit set and not broadcast
    pub fn is_multicast(&self) -> bool {
        (self.0[0] & 0x01) != 0 && !self.is_broadcast()
    }

    pub fn is_unicast(&self) -> bool {
        (self.0[0] & 0x01) == 0
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Link-layer group address for an IPv4 multicast group (RFC 1112 §6.4).
///
/// The low 23 bits of the group address are placed behind `01:00:5E`; the
/// top bit of the second IP octet is dropped.
pub fn multicast_mac(group: Ipv4Addr) -> MacAddr {
    let ip = group.octets();
    MacAddr([
        MULTICAST_OUI[0],
        MULTICAST_OUI[1],
        MULTICAST_OUI[2],
        ip[1] & 0x7F,
        ip[2],
        ip[3],
    ])
}

/// EtherType of a raw frame, `None` for runts
pub fn ethertype(frame: &[u8]) -> Option<u16> {
    if frame.len() < HEADER_SIZE {
        return None;
    }
    Some(u16::from_be_bytes([frame[12], frame[13]]))
}

/// Destination address of a raw frame
pub fn destination(frame: &[u8]) -> Option<MacAddr> {
    let bytes: [u8; 6] = frame.get(0..6)?.try_into().ok()?;
    Some(MacAddr(bytes))
}

/// Source address of a raw frame
pub fn source(frame: &[u8]) -> Option<MacAddr> {
    let bytes: [u8; 6] = frame.get(6..12)?.try_into().ok()?;
    Some(MacAddr(bytes))
}

/// Write an Ethernet header at the start of `buf`
///
/// `buf` must hold at least [`HEADER_SIZE`] bytes.
pub fn write_header(buf: &mut [u8], dest: MacAddr, src: MacAddr, ethertype: u16) {
    buf[0..6].copy_from_slice(&dest.0);
    buf[6..12].copy_from_slice(&src.0);
    buf[12..14].copy_from_slice(&ethertype.to_be_bytes());
}
