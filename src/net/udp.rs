//! UDP Protocol Implementation (RFC 768)
//!
//! A fixed table of bound ports multiplexes the single interface into
//! independent endpoints. Each bound port owns a small [`RxQueue`]; every
//! outgoing datagram is assembled in one reusable Ethernet+IPv4+UDP
//! template and handed straight to the MAC.
//!
//! What is dropped on purpose, without telling anyone:
//! - datagrams for ports below 1024 that are not on the system allow-list
//! - datagrams for ports nobody bound (no ICMP port unreachable)
//! - the oldest unread datagram when a port's queue is full
//! - payload bytes beyond [`UDP_DATA_SIZE`], on receive and on transmit

use core::fmt;
use core::net::Ipv4Addr;

use crate::config::{SYSTEM_PORTS, UDP_DATA_SIZE, UNPRIVILEGED_PORT_START};
use crate::net::arp::AddressResolver;
use crate::net::buffer::{QueueEntry, RxQueue};
use crate::net::device::FrameIo;
use crate::net::ethernet::{self, ETHERTYPE_IPV4, MAX_FRAME_SIZE, MacAddr};
use crate::net::ipv4::{self, DEFAULT_TTL, IpConfig, VERSION_IHL, offset, protocol};

/// UDP protocol number for IPv4
pub const UDP_PROTOCOL: u8 = protocol::UDP;

/// UDP header size (8 bytes)
pub const UDP_HEADER_SIZE: usize = 8;

/// IPv4 and UDP headers
pub const IPV4_UDP_HEADERS_SIZE: usize = ipv4::MIN_HEADER_SIZE + UDP_HEADER_SIZE;

/// Ethernet, IPv4 and UDP headers
pub const UDP_PACKET_HEADERS_SIZE: usize = ethernet::HEADER_SIZE + IPV4_UDP_HEADERS_SIZE;

const IP_START: usize = ethernet::HEADER_SIZE;
const UDP_START: usize = IP_START + ipv4::MIN_HEADER_SIZE;
const DATA_START: usize = UDP_PACKET_HEADERS_SIZE;

/// Flags/fragment word with only Don't Fragment set
const FLAGS_DF: u16 = 0x4000;

/// UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dest_port: u16,
    /// Length of UDP header + data (minimum 8 bytes)
    pub length: u16,
    /// Checksum (optional for IPv4, 0 = none)
    pub checksum: u16,
}

impl UdpHeader {
    /// Parse the header at the start of a UDP segment
    ///
    /// The length field must cover the header and fit in `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UdpError> {
        if bytes.len() < UDP_HEADER_SIZE {
            return Err(UdpError::PacketTooShort);
        }

        let header = Self {
            src_port: u16::from_be_bytes([bytes[0], bytes[1]]),
            dest_port: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            checksum: u16::from_be_bytes([bytes[6], bytes[7]]),
        };

        if (header.length as usize) < UDP_HEADER_SIZE || header.length as usize > bytes.len() {
            return Err(UdpError::InvalidLength);
        }

        Ok(header)
    }

    /// Payload length announced by the header
    pub fn payload_len(&self) -> usize {
        self.length as usize - UDP_HEADER_SIZE
    }
}

/// Errors that can occur while parsing a UDP segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpError {
    /// Segment is too short to contain a UDP header
    PacketTooShort,
    /// Length field doesn't match the segment
    InvalidLength,
}

impl fmt::Display for UdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UdpError::PacketTooShort => write!(f, "UDP segment too short"),
            UdpError::InvalidLength => write!(f, "UDP length field invalid"),
        }
    }
}

impl core::error::Error for UdpError {}

/// Socket bind errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    /// Every slot of the port table is in use
    TableFull,
    /// Port 0 cannot be bound
    InvalidPort,
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::TableFull => write!(f, "port table full"),
            BindError::InvalidPort => write!(f, "invalid port"),
        }
    }
}

impl core::error::Error for BindError {}

/// Socket unbind errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbindError {
    NotBound,
}

impl fmt::Display for UnbindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port not bound")
    }
}

impl core::error::Error for UnbindError {}

/// Socket send errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The handle does not refer to a bound port
    NotBound,
    /// No ARP entry for the on-link destination
    ArpUnresolved,
    /// No ARP entry for the default gateway
    GatewayUnresolved,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotBound => write!(f, "handle not bound"),
            SendError::ArpUnresolved => write!(f, "ARP lookup failed"),
            SendError::GatewayUnresolved => write!(f, "ARP lookup failed -> default gateway"),
        }
    }
}

impl core::error::Error for SendError {}

/// Socket receive errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// No data available
    WouldBlock,
    /// The handle does not refer to a bound port
    NotBound,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::WouldBlock => write!(f, "no datagram queued"),
            RecvError::NotBound => write!(f, "handle not bound"),
        }
    }
}

impl core::error::Error for RecvError {}

/// Index of a slot in the port table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpHandle(usize);

impl UdpHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where the IP layer hands received UDP segments
pub trait UdpInput {
    /// `segment` is the UDP header plus payload, bounded by the IP total length
    fn input(&mut self, src_ip: Ipv4Addr, segment: &[u8]);
}

/// The one outgoing frame. Fields that never change are written once by
/// [`init`](TxTemplate::init); [`stage`](TxTemplate::stage) fills in the rest.
struct TxTemplate {
    frame: [u8; MAX_FRAME_SIZE],
}

impl TxTemplate {
    const fn new() -> Self {
        Self {
            frame: [0; MAX_FRAME_SIZE],
        }
    }

    fn init(&mut self, mac: MacAddr) {
        self.frame = [0; MAX_FRAME_SIZE];
        ethernet::write_header(&mut self.frame, MacAddr::ZERO, mac, ETHERTYPE_IPV4);

        let ip = &mut self.frame[IP_START..UDP_START];
        ip[offset::VERSION_IHL] = VERSION_IHL;
        ip[offset::TOS] = 0;
        ip[offset::FLAGS_FRAGMENT..offset::FLAGS_FRAGMENT + 2].copy_from_slice(&FLAGS_DF.to_be_bytes());
        ip[offset::TTL] = DEFAULT_TTL;
        ip[offset::PROTOCOL] = UDP_PROTOCOL;
    }

    fn set_source(&mut self, address: Ipv4Addr) {
        let at = IP_START + offset::SOURCE;
        self.frame[at..at + 4].copy_from_slice(&address.octets());
    }

    /// Fill in the per-datagram fields and return the finished frame.
    /// `payload` must already be cut to `UDP_DATA_SIZE`.
    fn stage(
        &mut self,
        dest_mac: MacAddr,
        dest_ip: Ipv4Addr,
        id: u16,
        src_port: u16,
        dest_port: u16,
        payload: &[u8],
    ) -> &[u8] {
        let size = payload.len();
        self.frame[0..6].copy_from_slice(&dest_mac.0);

        let ip = &mut self.frame[IP_START..UDP_START];
        let total_length = (size + IPV4_UDP_HEADERS_SIZE) as u16;
        ip[offset::TOTAL_LENGTH..offset::TOTAL_LENGTH + 2].copy_from_slice(&total_length.to_be_bytes());
        ip[offset::IDENTIFICATION..offset::IDENTIFICATION + 2].copy_from_slice(&id.to_be_bytes());
        ip[offset::DESTINATION..offset::DESTINATION + 4].copy_from_slice(&dest_ip.octets());
        ip[offset::CHECKSUM..offset::CHECKSUM + 2].fill(0);
        let sum = ipv4::checksum(ip);
        ip[offset::CHECKSUM..offset::CHECKSUM + 2].copy_from_slice(&sum.to_be_bytes());

        let udp = &mut self.frame[UDP_START..DATA_START];
        udp[0..2].copy_from_slice(&src_port.to_be_bytes());
        udp[2..4].copy_from_slice(&dest_port.to_be_bytes());
        udp[4..6].copy_from_slice(&((size + UDP_HEADER_SIZE) as u16).to_be_bytes());
        udp[6..8].fill(0);

        self.frame[DATA_START..DATA_START + size].copy_from_slice(payload);
        &self.frame[..DATA_START + size]
    }
}

struct BoundPort<const E: usize> {
    /// 0 = free slot
    port: u16,
    queue: RxQueue<E>,
}

impl<const E: usize> BoundPort<E> {
    const FREE: Self = Self {
        port: 0,
        queue: RxQueue::new(),
    };
}

/// Fixed-capacity UDP endpoint table with per-port receive queues.
///
/// `PORTS` bounds the number of simultaneously bound ports, `ENTRIES` the
/// datagrams buffered per port (a power of two).
pub struct UdpTransport<const PORTS: usize, const ENTRIES: usize> {
    ports: [BoundPort<ENTRIES>; PORTS],
    template: TxTemplate,
    id: u16,
    broadcast_mask: u32,
    on_network_mask: u32,
    gateway: Ipv4Addr,
    system_ports: &'static [u16],
}

impl<const PORTS: usize, const ENTRIES: usize> UdpTransport<PORTS, ENTRIES> {
    pub const fn new() -> Self {
        Self {
            ports: [const { BoundPort::FREE }; PORTS],
            template: TxTemplate::new(),
            id: 0,
            broadcast_mask: u32::MAX,
            on_network_mask: 0,
            gateway: Ipv4Addr::UNSPECIFIED,
            system_ports: &SYSTEM_PORTS,
        }
    }

    /// Clear every binding and queue and prime the transmit template
    pub fn init(&mut self, mac: MacAddr, config: &IpConfig) {
        for slot in self.ports.iter_mut() {
            slot.port = 0;
            slot.queue.clear();
        }
        self.id = 0;
        self.template.init(mac);
        self.set_ip_config(config);
    }

    /// Adopt a new interface configuration.
    ///
    /// Not observed automatically: whoever changes the configuration must
    /// call this before the next send.
    pub fn set_ip_config(&mut self, config: &IpConfig) {
        self.broadcast_mask = config.broadcast_mask();
        self.on_network_mask = config.on_network_mask();
        self.gateway = config.gateway;
        self.template.set_source(config.address);
    }

    /// Replace the allow-list of ports below 1024 that may receive traffic
    pub fn set_system_ports(&mut self, ports: &'static [u16]) {
        self.system_ports = ports;
    }

    pub fn system_ports(&self) -> &'static [u16] {
        self.system_ports
    }

    /// Bind a local port.
    ///
    /// Binding a port that is already bound returns its existing handle.
    pub fn bind(&mut self, port: u16) -> Result<UdpHandle, BindError> {
        if port == 0 {
            return Err(BindError::InvalidPort);
        }

        if let Some(handle) = self.handle_of(port) {
            return Ok(handle);
        }

        let Some(index) = self.ports.iter().position(|slot| slot.port == 0) else {
            log::error!(target: "udp", "bind {}: port table full", port);
            return Err(BindError::TableFull);
        };

        let slot = &mut self.ports[index];
        slot.port = port;
        slot.queue.clear();

        log::debug!(target: "udp", "bound port {} to slot {}", port, index);
        Ok(UdpHandle(index))
    }

    /// Release a local port and drop whatever it had queued
    pub fn unbind(&mut self, port: u16) -> Result<(), UnbindError> {
        let Some(handle) = self.handle_of(port) else {
            log::error!(target: "udp", "unbind {}: not bound", port);
            return Err(UnbindError::NotBound);
        };

        let slot = &mut self.ports[handle.0];
        slot.port = 0;
        slot.queue.clear();

        log::debug!(target: "udp", "unbound port {}", port);
        Ok(())
    }

    /// Handle of the slot bound to `port`
    pub fn handle_of(&self, port: u16) -> Option<UdpHandle> {
        self.ports
            .iter()
            .position(|slot| slot.port == port && port != 0)
            .map(UdpHandle)
    }

    pub fn is_bound(&self, port: u16) -> bool {
        self.handle_of(port).is_some()
    }

    /// Local port of a handle, `None` when the slot is free
    pub fn bound_port(&self, handle: UdpHandle) -> Option<u16> {
        self.ports
            .get(handle.0)
            .map(|slot| slot.port)
            .filter(|&port| port != 0)
    }

    /// Unread datagrams queued on a handle
    pub fn pending(&self, handle: UdpHandle) -> usize {
        self.ports.get(handle.0).map_or(0, |slot| slot.queue.len())
    }

    /// Number of bound ports
    pub fn bound_count(&self) -> usize {
        self.ports.iter().filter(|slot| slot.port != 0).count()
    }

    /// Identification the next datagram will carry
    pub fn next_id(&self) -> u16 {
        self.id
    }

    fn bound_slot(&mut self, handle: UdpHandle) -> Result<&mut BoundPort<ENTRIES>, RecvError> {
        match self.ports.get_mut(handle.0) {
            Some(slot) if slot.port != 0 => Ok(slot),
            _ => Err(RecvError::NotBound),
        }
    }

    /// Copy the oldest queued datagram into `buf` (non-blocking)
    ///
    /// # Returns
    /// * `Ok((len, source_ip, source_port))` - at most `buf.len()` bytes copied
    /// * `Err(RecvError::WouldBlock)` - nothing queued
    pub fn recv(&mut self, handle: UdpHandle, buf: &mut [u8]) -> Result<(usize, Ipv4Addr, u16), RecvError> {
        let entry = self.recv_ref(handle)?;
        let payload = entry.payload();
        let len = payload.len().min(buf.len());
        buf[..len].copy_from_slice(&payload[..len]);
        Ok((len, entry.from_ip(), entry.from_port()))
    }

    /// Zero-copy variant of [`recv`](Self::recv): borrow the queue slot.
    ///
    /// The borrow ends before the transport can be used again, so the slot
    /// cannot be overwritten while it is being read.
    pub fn recv_ref(&mut self, handle: UdpHandle) -> Result<&QueueEntry, RecvError> {
        self.bound_slot(handle)?.queue.pop().ok_or(RecvError::WouldBlock)
    }

    /// Link-layer destination for `to_ip`, in priority order:
    /// limited or subnet broadcast, multicast, off-link via the gateway,
    /// on-link via ARP.
    fn destination_mac<A>(&self, resolver: &mut A, to_ip: Ipv4Addr) -> Result<MacAddr, SendError>
    where
        A: AddressResolver + ?Sized,
    {
        let to = u32::from(to_ip);

        if to_ip.is_broadcast() || (to & self.broadcast_mask) == self.broadcast_mask {
            return Ok(MacAddr::BROADCAST);
        }

        if to_ip.is_multicast() {
            return Ok(ethernet::multicast_mac(to_ip));
        }

        if (to & self.on_network_mask) != self.on_network_mask {
            return resolver.lookup(self.gateway).ok_or_else(|| {
                log::warn!(target: "udp", "ARP lookup failed -> default gateway {}", self.gateway);
                SendError::GatewayUnresolved
            });
        }

        resolver.lookup(to_ip).ok_or_else(|| {
            log::warn!(target: "udp", "ARP lookup failed for {}", to_ip);
            SendError::ArpUnresolved
        })
    }

    /// Send a datagram from a bound port.
    ///
    /// Payload beyond `UDP_DATA_SIZE` bytes is cut off. A frame the MAC
    /// refuses is lost like any other frame on the wire; only an unbound
    /// handle or a failed ARP lookup is reported.
    pub fn send<D, A>(
        &mut self,
        device: &mut D,
        resolver: &mut A,
        handle: UdpHandle,
        payload: &[u8],
        to_ip: Ipv4Addr,
        to_port: u16,
    ) -> Result<(), SendError>
    where
        D: FrameIo + ?Sized,
        A: AddressResolver + ?Sized,
    {
        let Some(src_port) = self.bound_port(handle) else {
            log::debug!(target: "udp", "send on unbound slot {}", handle.0);
            return Err(SendError::NotBound);
        };

        let dest_mac = self.destination_mac(resolver, to_ip)?;

        let id = self.id;
        self.id = self.id.wrapping_add(1);

        let payload = &payload[..payload.len().min(UDP_DATA_SIZE)];
        let frame = self.template.stage(dest_mac, to_ip, id, src_port, to_port, payload);

        log::trace!(target: "udp", "{} -> {}:{} ({} bytes, id {})", src_port, to_ip, to_port, payload.len(), id);

        if let Err(e) = device.transmit(frame) {
            log::warn!(target: "udp", "frame to {}:{} lost: {}", to_ip, to_port, e);
        }

        Ok(())
    }
}

impl<const PORTS: usize, const ENTRIES: usize> Default for UdpTransport<PORTS, ENTRIES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const PORTS: usize, const ENTRIES: usize> UdpInput for UdpTransport<PORTS, ENTRIES> {
    fn input(&mut self, src_ip: Ipv4Addr, segment: &[u8]) {
        let header = match UdpHeader::from_bytes(segment) {
            Ok(header) => header,
            Err(e) => {
                log::trace!(target: "udp", "from {}: {}", src_ip, e);
                return;
            }
        };

        let dest_port = header.dest_port;

        if dest_port < UNPRIVILEGED_PORT_START && !self.system_ports.contains(&dest_port) {
            log::debug!(target: "udp", "Not supported -> {}:{}", src_ip, dest_port);
            return;
        }

        let Some(slot) = self
            .ports
            .iter_mut()
            .find(|slot| slot.port == dest_port && dest_port != 0)
        else {
            log::trace!(target: "udp", "{}:{} -> unbound port {}", src_ip, header.src_port, dest_port);
            return;
        };

        let data = &segment[UDP_HEADER_SIZE..UDP_HEADER_SIZE + header.payload_len()];
        if slot.queue.push(src_ip, header.src_port, data) {
            log::trace!(target: "udp", "port {} queue full, oldest datagram overwritten", dest_port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Udp = UdpTransport<4, 2>;

    #[test]
    fn test_header_parsing() {
        let data = [
            0x13, 0x88, // src port: 5000
            0x1F, 0x40, // dest port: 8000
            0x00, 0x0C, // length: 12
            0x00, 0x00, // checksum: 0 (disabled)
            0xDE, 0xAD, 0xBE, 0xEF,
        ];

        let header = UdpHeader::from_bytes(&data).unwrap();
        assert_eq!(header.src_port, 5000);
        assert_eq!(header.dest_port, 8000);
        assert_eq!(header.payload_len(), 4);
    }

    #[test]
    fn test_header_invalid() {
        assert_eq!(UdpHeader::from_bytes(&[0, 1, 0, 2]), Err(UdpError::PacketTooShort));
        let short_len = [0x13, 0x88, 0x1F, 0x40, 0x00, 0x05, 0x00, 0x00];
        assert_eq!(UdpHeader::from_bytes(&short_len), Err(UdpError::InvalidLength));
        let long_len = [0x13, 0x88, 0x1F, 0x40, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(UdpHeader::from_bytes(&long_len), Err(UdpError::InvalidLength));
    }

    #[test]
    fn test_bind_first_fit_and_idempotent() {
        let mut udp = Udp::new();
        let a = udp.bind(6454).unwrap();
        let b = udp.bind(5568).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(udp.bind(6454), Ok(a));
        assert_eq!(udp.bound_count(), 2);
    }

    #[test]
    fn test_bind_never_duplicates_after_hole() {
        let mut udp = Udp::new();
        udp.bind(5001).unwrap();
        let later = udp.bind(6454).unwrap();
        udp.unbind(5001).unwrap();

        // Slot 0 is free again, but 6454 still lives in slot 1
        assert_eq!(udp.bind(6454), Ok(later));
        assert_eq!(udp.bound_count(), 1);
    }

    #[test]
    fn test_bind_table_full_and_port_zero() {
        let mut udp = Udp::new();
        for port in 5000..5004 {
            udp.bind(port).unwrap();
        }
        assert_eq!(udp.bind(6000), Err(BindError::TableFull));
        assert_eq!(udp.bind(0), Err(BindError::InvalidPort));
        assert_eq!(udp.bound_count(), 4);
    }

    #[test]
    fn test_unbind_unknown() {
        let mut udp = Udp::new();
        assert_eq!(udp.unbind(6454), Err(UnbindError::NotBound));
        assert_eq!(udp.unbind(0), Err(UnbindError::NotBound));
    }

    #[test]
    fn test_recv_on_free_slot() {
        let mut udp = Udp::new();
        let mut buf = [0u8; 16];
        assert_eq!(udp.recv(UdpHandle(0), &mut buf), Err(RecvError::NotBound));
        assert_eq!(udp.recv(UdpHandle(99), &mut buf), Err(RecvError::NotBound));

        let handle = udp.bind(6454).unwrap();
        assert_eq!(udp.recv(handle, &mut buf), Err(RecvError::WouldBlock));
    }
}
