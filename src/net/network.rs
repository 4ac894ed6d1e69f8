//! Application-facing network API
//!
//! [`Network`] wraps the [`NetCore`] with what application and remote
//! config code needs: UDP begin/end/send/receive by port and handle,
//! address queries, immediate or queued mode changes, host and domain
//! name storage, and a console dump of the configuration.

use core::net::Ipv4Addr;

use bitflags::bitflags;

use crate::config::{ARP_TABLE_SIZE, DOMAINNAME_SIZE, HOSTNAME_SIZE, LOOPBACK_FRAMES, NetworkParams};
use crate::net::arp::{AddressResolver, ArpCache};
use crate::net::bootstrap::{DhcpClient, NoDhcp, NoZeroconf, Zeroconf};
use crate::net::buffer::QueueEntry;
use crate::net::device::FrameIo;
use crate::net::ethernet::MacAddr;
use crate::net::ipv4::{IpConfig, IpLayer, Ipv4Input};
use crate::net::loopback::LoopbackDevice;
use crate::net::stack::{AddressingMode, NetCore};
use crate::net::udp::{BindError, RecvError, SendError, UdpHandle, UnbindError};
use crate::serial_println;

/// Fully in-crate stack on the loopback device, for self-tests and hosts
pub type LoopbackNetwork =
    Network<LoopbackDevice<LOOPBACK_FRAMES>, ArpCache<ARP_TABLE_SIZE>, Ipv4Input, NoDhcp, NoZeroconf>;

bitflags! {
    /// Mode changes waiting for [`Network::apply_queued_config`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueuedChanges: u32 {
        const STATIC_IP = 1 << 0;
        const NET_MASK = 1 << 1;
        const DHCP = 1 << 2;
        const ZEROCONF = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy)]
struct QueuedConfig {
    changes: QueuedChanges,
    address: Ipv4Addr,
    netmask: Ipv4Addr,
}

/// A name in a fixed buffer, cut to `N - 1` bytes on a char boundary
struct NameBuf<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> NameBuf<N> {
    const fn new() -> Self {
        Self { bytes: [0; N], len: 0 }
    }

    fn set(&mut self, name: &str) {
        let mut len = name.len().min(N - 1);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        self.bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        self.len = len;
    }

    fn as_str(&self) -> &str {
        // Only ever filled from a &str cut on a char boundary
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }
}

/// The network as application code sees it
pub struct Network<D, A, I, H, Z> {
    core: NetCore<D, A, I, H, Z>,
    hostname: NameBuf<HOSTNAME_SIZE>,
    domain: NameBuf<DOMAINNAME_SIZE>,
    queued: QueuedConfig,
}

impl<D, A, I, H, Z> Network<D, A, I, H, Z>
where
    D: FrameIo,
    A: AddressResolver,
    I: IpLayer,
    H: DhcpClient,
    Z: Zeroconf,
{
    pub const fn new(device: D, resolver: A, ip: I, dhcp: H, zeroconf: Z) -> Self {
        Self {
            core: NetCore::new(device, resolver, ip, dhcp, zeroconf),
            hostname: NameBuf::new(),
            domain: NameBuf::new(),
            queued: QueuedConfig {
                changes: QueuedChanges::empty(),
                address: Ipv4Addr::UNSPECIFIED,
                netmask: Ipv4Addr::UNSPECIFIED,
            },
        }
    }

    /// Bring the interface up with the boot parameters.
    ///
    /// Returns the configuration in effect afterwards.
    pub fn start(&mut self, mac: MacAddr, params: &NetworkParams<'_>) -> IpConfig {
        self.hostname.set(params.hostname);

        let (config, _) = self
            .core
            .init(mac, &params.ip_config, self.hostname.as_str(), params.use_dhcp);

        self.queued = QueuedConfig {
            changes: QueuedChanges::empty(),
            address: config.address,
            netmask: config.netmask,
        };

        config
    }

    pub fn shutdown(&mut self) {
        self.core.shutdown();
    }

    /// One poll cycle; call from the main loop
    pub fn run(&mut self) {
        self.core.dispatch();
    }

    // UDP

    /// Bind `port`; returns the existing handle when already bound
    pub fn begin(&mut self, port: u16) -> Result<UdpHandle, BindError> {
        self.core.bind(port)
    }

    pub fn end(&mut self, port: u16) -> Result<(), UnbindError> {
        self.core.unbind(port)
    }

    pub fn recv_from(&mut self, handle: UdpHandle, buf: &mut [u8]) -> Result<(usize, Ipv4Addr, u16), RecvError> {
        self.core.recv(handle, buf)
    }

    pub fn recv_from_ref(&mut self, handle: UdpHandle) -> Result<&QueueEntry, RecvError> {
        self.core.recv_ref(handle)
    }

    pub fn send_to(&mut self, handle: UdpHandle, data: &[u8], to_ip: Ipv4Addr, to_port: u16) -> Result<(), SendError> {
        self.core.send(handle, data, to_ip, to_port)
    }

    // Immediate mode changes

    pub fn set_ip(&mut self, address: Ipv4Addr) {
        if address == self.ip() && self.addressing_mode() == AddressingMode::Static {
            return;
        }
        self.core.set_ip(address);
    }

    pub fn set_netmask(&mut self, netmask: Ipv4Addr) {
        if netmask != self.netmask() {
            self.core.set_netmask(netmask);
        }
    }

    pub fn set_gateway_ip(&mut self, gateway: Ipv4Addr) {
        if gateway != self.gateway_ip() {
            self.core.set_gateway(gateway);
        }
    }

    /// Switch to DHCP; zeroconf is tried when no server answers
    pub fn enable_dhcp(&mut self) -> bool {
        self.core.set_dhcp(self.hostname.as_str())
    }

    pub fn set_zeroconf(&mut self) -> bool {
        self.core.set_zeroconf()
    }

    // Queued mode changes

    /// Queue a static address and netmask. 0.0.0.0 keeps the value
    /// queued before (initially the one in effect).
    pub fn set_queued_static_ip(&mut self, address: Ipv4Addr, netmask: Ipv4Addr) {
        if !address.is_unspecified() {
            self.queued.address = address;
        }
        if !netmask.is_unspecified() {
            self.queued.netmask = netmask;
        }
        self.queued.changes |= QueuedChanges::STATIC_IP | QueuedChanges::NET_MASK;
    }

    pub fn set_queued_dhcp(&mut self) {
        self.queued.changes |= QueuedChanges::DHCP;
    }

    pub fn set_queued_zeroconf(&mut self) {
        self.queued.changes |= QueuedChanges::ZEROCONF;
    }

    pub fn queued_changes(&self) -> QueuedChanges {
        self.queued.changes
    }

    /// Apply queued changes: netmask before address, then DHCP, then
    /// zeroconf. Returns false when nothing was queued.
    pub fn apply_queued_config(&mut self) -> bool {
        if self.queued.changes.is_empty() {
            return false;
        }

        log::info!(
            target: "net",
            "applying queued {:?} ({} / {})",
            self.queued.changes,
            self.queued.address,
            self.queued.netmask
        );

        if self.queued.changes.contains(QueuedChanges::NET_MASK) {
            self.set_netmask(self.queued.netmask);
            self.queued.changes.remove(QueuedChanges::NET_MASK);
        }

        if self.queued.changes.contains(QueuedChanges::STATIC_IP) {
            self.set_ip(self.queued.address);
            self.queued.changes.remove(QueuedChanges::STATIC_IP);
        }

        if self.queued.changes.contains(QueuedChanges::DHCP) {
            self.enable_dhcp();
            self.queued.changes.remove(QueuedChanges::DHCP);
        }

        if self.queued.changes.contains(QueuedChanges::ZEROCONF) {
            self.set_zeroconf();
            self.queued.changes.remove(QueuedChanges::ZEROCONF);
        }

        true
    }

    // Queries

    pub fn ip(&self) -> Ipv4Addr {
        self.core.ip_config().address
    }

    pub fn netmask(&self) -> Ipv4Addr {
        self.core.ip_config().netmask
    }

    pub fn gateway_ip(&self) -> Ipv4Addr {
        self.core.ip_config().gateway
    }

    pub fn broadcast_ip(&self) -> Ipv4Addr {
        self.core.ip_config().broadcast()
    }

    pub fn netmask_cidr(&self) -> u32 {
        self.core.ip_config().netmask_cidr()
    }

    pub fn mac(&self) -> MacAddr {
        self.core.mac()
    }

    pub fn is_dhcp_used(&self) -> bool {
        self.core.is_dhcp()
    }

    pub fn is_zeroconf_used(&self) -> bool {
        self.core.is_zeroconf()
    }

    pub fn addressing_mode(&self) -> AddressingMode {
        self.core.addressing_mode()
    }

    /// Whether `ip` is on our subnet
    pub fn is_valid_ip(&self, ip: Ipv4Addr) -> bool {
        let netmask = u32::from(self.netmask());
        (u32::from(self.ip()) & netmask) == (u32::from(ip) & netmask)
    }

    pub fn set_hostname(&mut self, name: &str) {
        self.hostname.set(name);
    }

    pub fn hostname(&self) -> &str {
        self.hostname.as_str()
    }

    pub fn set_domain_name(&mut self, name: &str) {
        self.domain.set(name);
    }

    pub fn domain_name(&self) -> &str {
        self.domain.as_str()
    }

    pub fn core(&self) -> &NetCore<D, A, I, H, Z> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut NetCore<D, A, I, H, Z> {
        &mut self.core
    }

    /// Dump the configuration to the serial console
    pub fn print(&self) {
        serial_println!("Network");
        serial_println!(" Hostname  : {}", self.hostname());
        serial_println!(" Domain    : {}", self.domain_name());
        serial_println!(" Inet      : {}/{}", self.ip(), self.netmask_cidr());
        serial_println!(" Netmask   : {}", self.netmask());
        serial_println!(" Gateway   : {}", self.gateway_ip());
        serial_println!(" Broadcast : {}", self.broadcast_ip());
        serial_println!(" Mac       : {}", self.mac());
        serial_println!(" Mode      : {}", self.addressing_mode().as_char());
    }
}

impl LoopbackNetwork {
    /// Loopback stack without bootstrap collaborators. The MAC is given to
    /// [`start`](Network::start).
    pub const fn loopback() -> Self {
        Self::new(
            LoopbackDevice::new(),
            ArpCache::new(),
            Ipv4Input::new(),
            NoDhcp,
            NoZeroconf,
        )
    }
}
