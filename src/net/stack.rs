//! Network Stack Integration
//!
//! [`NetCore`] owns the interface configuration and the collaborators below
//! it, and is the single dispatch point for inbound frames and periodic
//! work. Everything runs from one poll loop: nothing here blocks and
//! nothing is locked.

use core::net::Ipv4Addr;

use crate::config::{UDP_MAX_PORTS, UDP_RX_ENTRIES};
use crate::net::arp::AddressResolver;
use crate::net::bootstrap::{BootstrapContext, DhcpClient, Zeroconf};
use crate::net::buffer::QueueEntry;
use crate::net::device::FrameIo;
use crate::net::ethernet::{self, ETHERTYPE_ARP, ETHERTYPE_IPV4, MacAddr};
use crate::net::ipv4::{IpConfig, IpLayer};
use crate::net::udp::{BindError, RecvError, SendError, UdpHandle, UdpTransport, UnbindError};

/// Lend the core's collaborators to a bootstrap client. A macro so the
/// borrows stay per field and `self.dhcp` / `self.zeroconf` stay usable.
macro_rules! bootstrap_context {
    ($core:expr) => {
        BootstrapContext::new(
            $core.mac,
            &mut $core.device,
            &mut $core.resolver,
            &mut $core.ip,
            &mut $core.udp,
        )
    };
}

/// UDP transport sized by the compile-time configuration
pub type Transport = UdpTransport<UDP_MAX_PORTS, UDP_RX_ENTRIES>;

/// How the current address was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Static,
    Dhcp,
    Zeroconf,
}

impl AddressingMode {
    /// One-letter code used on the console and in remote config
    pub fn as_char(&self) -> char {
        match self {
            AddressingMode::Static => 'S',
            AddressingMode::Dhcp => 'D',
            AddressingMode::Zeroconf => 'Z',
        }
    }
}

/// The network core: configuration owner and frame dispatcher.
///
/// Generic over its collaborators:
/// * `D` - Ethernet MAC driver
/// * `A` - address resolution (ARP)
/// * `I` - IPv4 input layer
/// * `H` - DHCP client
/// * `Z` - link-local (zeroconf) negotiation
pub struct NetCore<D, A, I, H, Z> {
    device: D,
    resolver: A,
    ip: I,
    dhcp: H,
    zeroconf: Z,
    udp: Transport,
    mac: MacAddr,
    config: IpConfig,
    is_dhcp: bool,
    is_zeroconf: bool,
}

impl<D, A, I, H, Z> NetCore<D, A, I, H, Z>
where
    D: FrameIo,
    A: AddressResolver,
    I: IpLayer,
    H: DhcpClient,
    Z: Zeroconf,
{
    pub const fn new(device: D, resolver: A, ip: I, dhcp: H, zeroconf: Z) -> Self {
        Self {
            device,
            resolver,
            ip,
            dhcp,
            zeroconf,
            udp: UdpTransport::new(),
            mac: MacAddr::ZERO,
            config: IpConfig::unconfigured(),
            is_dhcp: false,
            is_zeroconf: false,
        }
    }

    /// Bring the stack up
    ///
    /// # Arguments
    /// * `mac` - interface hardware address
    /// * `config` - static configuration, used as-is unless DHCP succeeds
    /// * `hostname` - sent to the DHCP server
    /// * `use_dhcp` - try DHCP first, falling back to zeroconf
    ///
    /// # Returns
    /// The configuration in effect and whether it came from zeroconf.
    /// Never fails: without DHCP or zeroconf the device runs with the
    /// static (possibly empty) configuration.
    pub fn init(&mut self, mac: MacAddr, config: &IpConfig, hostname: &str, use_dhcp: bool) -> (IpConfig, bool) {
        self.mac = mac;
        self.config = *config;
        self.is_dhcp = false;
        self.is_zeroconf = false;

        self.udp.init(mac, &self.config);
        self.ip.reinit(mac, &self.config);

        if use_dhcp {
            self.is_dhcp = self.run_dhcp(hostname);
        }

        self.reprime();

        log::info!(
            target: "net",
            "up: {}/{} gw {} mode {}",
            self.config.address,
            self.config.netmask_cidr(),
            self.config.gateway,
            self.addressing_mode().as_char()
        );

        (self.config, self.is_zeroconf)
    }

    /// Give back a DHCP lease and stop the IP layer.
    ///
    /// A later [`init`](Self::init) starts from scratch.
    pub fn shutdown(&mut self) {
        if self.is_dhcp {
            let mut ctx = bootstrap_context!(self);
            self.dhcp.release(&mut ctx);
        }

        self.ip.shutdown();

        log::info!(target: "net", "shutdown");
    }

    /// Switch to a static address. A DHCP lease in use is released first.
    pub fn set_ip(&mut self, address: Ipv4Addr) {
        if self.is_dhcp {
            self.dhcp_release();
        }
        self.is_zeroconf = false;

        self.config.address = address;
        self.reprime();

        log::info!(target: "net", "static address {}", address);
    }

    pub fn set_netmask(&mut self, netmask: Ipv4Addr) {
        self.config.netmask = netmask;
        self.reprime();
    }

    pub fn set_gateway(&mut self, gateway: Ipv4Addr) {
        self.config.gateway = gateway;
        self.reprime();
    }

    /// Run DHCP again, falling back to zeroconf on failure.
    ///
    /// Returns whether DHCP succeeded; see [`is_zeroconf`](Self::is_zeroconf)
    /// for the fallback result.
    pub fn set_dhcp(&mut self, hostname: &str) -> bool {
        self.is_zeroconf = false;
        self.is_dhcp = self.run_dhcp(hostname);
        self.reprime();
        self.is_dhcp
    }

    /// Negotiate a link-local address.
    ///
    /// On failure the previous configuration stays in effect.
    pub fn set_zeroconf(&mut self) -> bool {
        let mut ctx = bootstrap_context!(self);

        match self.zeroconf.negotiate(&mut ctx, &self.config) {
            Ok(config) => {
                self.config = config;
                self.is_dhcp = false;
                self.is_zeroconf = true;
                self.reprime();
                log::info!(target: "net", "zeroconf address {}", self.config.address);
                true
            }
            Err(e) => {
                log::warn!(target: "net", "Zeroconf failed: {}", e);
                false
            }
        }
    }

    /// Release the DHCP lease and leave DHCP mode
    pub fn dhcp_release(&mut self) {
        let mut ctx = bootstrap_context!(self);
        self.dhcp.release(&mut ctx);
        self.is_dhcp = false;
    }

    /// DHCP, then zeroconf when DHCP fails. Returns whether DHCP succeeded.
    fn run_dhcp(&mut self, hostname: &str) -> bool {
        let mut ctx = bootstrap_context!(self);

        match self.dhcp.acquire(&mut ctx, hostname) {
            Ok(config) => {
                self.config = config;
                true
            }
            Err(e) => {
                log::warn!(target: "net", "DHCP Client failed: {}", e);
                match self.zeroconf.negotiate(&mut ctx, &self.config) {
                    Ok(config) => {
                        self.config = config;
                        self.is_zeroconf = true;
                    }
                    Err(e) => log::warn!(target: "net", "Zeroconf failed: {}", e),
                }
                false
            }
        }
    }

    /// Rebuild every layer that caches address state
    fn reprime(&mut self) {
        self.resolver.reinit(self.mac, &self.config);
        self.ip.set_address(&self.config);
        self.udp.set_ip_config(&self.config);
    }

    /// One poll cycle.
    ///
    /// Handles at most one received frame and hands its buffer back to the
    /// driver before anything is transmitted, then runs the collaborators'
    /// timers and sends a pending ARP request.
    pub fn dispatch(&mut self) {
        let mut reply = None;

        if let Some(frame) = self.device.receive() {
            match ethernet::ethertype(frame) {
                Some(ETHERTYPE_IPV4) => self.ip.handle(frame, &mut self.udp),
                Some(ETHERTYPE_ARP) => reply = self.resolver.handle(frame),
                Some(other) => log::debug!(target: "net", "type {:04x} is not implemented", other),
                None => log::trace!(target: "net", "runt frame ({} bytes)", frame.len()),
            }

            self.device.free_received();
        }

        if let Some(reply) = reply {
            self.transmit(&reply);
        }

        self.resolver.run_timers();
        self.ip.run_timers();
        let mut ctx = bootstrap_context!(self);
        self.dhcp.run_timers(&mut ctx);

        if let Some(request) = self.resolver.poll_request() {
            self.transmit(&request);
        }
    }

    fn transmit(&mut self, frame: &[u8]) {
        if let Err(e) = self.device.transmit(frame) {
            log::warn!(target: "net", "transmit failed: {}", e);
        }
    }

    // UDP

    pub fn bind(&mut self, port: u16) -> Result<UdpHandle, BindError> {
        self.udp.bind(port)
    }

    pub fn unbind(&mut self, port: u16) -> Result<(), UnbindError> {
        self.udp.unbind(port)
    }

    pub fn recv(&mut self, handle: UdpHandle, buf: &mut [u8]) -> Result<(usize, Ipv4Addr, u16), RecvError> {
        self.udp.recv(handle, buf)
    }

    pub fn recv_ref(&mut self, handle: UdpHandle) -> Result<&QueueEntry, RecvError> {
        self.udp.recv_ref(handle)
    }

    pub fn send(&mut self, handle: UdpHandle, payload: &[u8], to_ip: Ipv4Addr, to_port: u16) -> Result<(), SendError> {
        self.udp
            .send(&mut self.device, &mut self.resolver, handle, payload, to_ip, to_port)
    }

    // Accessors

    pub fn ip_config(&self) -> &IpConfig {
        &self.config
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn is_dhcp(&self) -> bool {
        self.is_dhcp
    }

    pub fn is_zeroconf(&self) -> bool {
        self.is_zeroconf
    }

    pub fn addressing_mode(&self) -> AddressingMode {
        if self.is_zeroconf {
            AddressingMode::Zeroconf
        } else if self.is_dhcp {
            AddressingMode::Dhcp
        } else {
            AddressingMode::Static
        }
    }

    pub fn udp(&self) -> &Transport {
        &self.udp
    }

    pub fn udp_mut(&mut self) -> &mut Transport {
        &mut self.udp
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn dhcp(&self) -> &H {
        &self.dhcp
    }

    pub fn dhcp_mut(&mut self) -> &mut H {
        &mut self.dhcp
    }

    pub fn zeroconf(&self) -> &Z {
        &self.zeroconf
    }

    pub fn resolver(&self) -> &A {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut A {
        &mut self.resolver
    }
}
