//! Recording collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use lightnode_net::net::arp::{AddressResolver, ArpFrame};
use lightnode_net::net::bootstrap::{BootstrapContext, DhcpClient, DhcpError, Zeroconf, ZeroconfError};
use lightnode_net::net::device::{FrameIo, TransmitError};
use lightnode_net::net::ethernet::{self, ETHERTYPE_IPV4, MacAddr};
use lightnode_net::net::ipv4::{self, IpConfig};
use lightnode_net::net::udp::UDP_PROTOCOL;

pub const OUR_MAC: MacAddr = MacAddr([0x02, 0x4C, 0x4E, 0x00, 0x00, 0x01]);
pub const PEER_MAC: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
pub const GATEWAY_MAC: MacAddr = MacAddr([0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);

pub fn lan_config() -> IpConfig {
    IpConfig::new(
        Ipv4Addr::new(192, 168, 1, 10),
        Ipv4Addr::new(255, 255, 255, 0),
        Ipv4Addr::new(192, 168, 1, 1),
    )
}

/// Frame I/O that serves scripted frames and records transmits
#[derive(Default)]
pub struct MockDevice {
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub freed: usize,
    pub fail_transmit: bool,
    /// Transmits attempted while a received frame was still held
    pub sent_while_holding: usize,
    holding: bool,
}

impl MockDevice {
    pub fn inject(&mut self, frame: Vec<u8>) {
        self.inbound.push_back(frame);
    }
}

impl FrameIo for MockDevice {
    fn receive(&mut self) -> Option<&[u8]> {
        let frame = self.inbound.front()?;
        self.holding = true;
        Some(frame.as_slice())
    }

    fn free_received(&mut self) {
        if self.inbound.pop_front().is_some() {
            self.freed += 1;
        }
        self.holding = false;
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        if self.holding {
            self.sent_while_holding += 1;
        }
        if self.fail_transmit {
            return Err(TransmitError::BufferFull);
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }
}

/// Resolver backed by a fixed table; records every lookup
#[derive(Default)]
pub struct TableResolver {
    pub table: Vec<(Ipv4Addr, MacAddr)>,
    pub lookups: Vec<Ipv4Addr>,
    pub reinits: usize,
    pub handled: usize,
    pub timer_runs: usize,
    pub config: Option<IpConfig>,
    pub reply: Option<ArpFrame>,
}

impl TableResolver {
    pub fn with(entries: &[(Ipv4Addr, MacAddr)]) -> Self {
        Self {
            table: entries.to_vec(),
            ..Self::default()
        }
    }
}

impl AddressResolver for TableResolver {
    fn reinit(&mut self, _mac: MacAddr, config: &IpConfig) {
        self.reinits += 1;
        self.config = Some(*config);
    }

    fn lookup(&mut self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.lookups.push(ip);
        self.table.iter().find(|(addr, _)| *addr == ip).map(|(_, mac)| *mac)
    }

    fn handle(&mut self, _frame: &[u8]) -> Option<ArpFrame> {
        self.handled += 1;
        self.reply.take()
    }

    fn run_timers(&mut self) {
        self.timer_runs += 1;
    }
}

pub struct ScriptedDhcp {
    pub result: Result<IpConfig, DhcpError>,
    pub acquired: usize,
    pub released: usize,
    pub hostname: String,
}

impl ScriptedDhcp {
    pub fn failing() -> Self {
        Self::returning(Err(DhcpError::Timeout))
    }

    pub fn returning(result: Result<IpConfig, DhcpError>) -> Self {
        Self {
            result,
            acquired: 0,
            released: 0,
            hostname: String::new(),
        }
    }
}

impl DhcpClient for ScriptedDhcp {
    fn acquire(&mut self, _ctx: &mut BootstrapContext<'_>, hostname: &str) -> Result<IpConfig, DhcpError> {
        self.acquired += 1;
        self.hostname = hostname.to_string();
        self.result
    }

    fn release(&mut self, _ctx: &mut BootstrapContext<'_>) {
        self.released += 1;
    }
}

pub struct ScriptedZeroconf {
    pub result: Result<IpConfig, ZeroconfError>,
    pub calls: usize,
}

impl ScriptedZeroconf {
    pub fn link_local() -> Self {
        Self {
            result: Ok(IpConfig::new(
                Ipv4Addr::new(169, 254, 7, 9),
                Ipv4Addr::new(255, 255, 0, 0),
                Ipv4Addr::UNSPECIFIED,
            )),
            calls: 0,
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(ZeroconfError::NoFreeAddress),
            calls: 0,
        }
    }
}

impl Zeroconf for ScriptedZeroconf {
    fn negotiate(&mut self, _ctx: &mut BootstrapContext<'_>, _current: &IpConfig) -> Result<IpConfig, ZeroconfError> {
        self.calls += 1;
        self.result
    }
}

/// Ethernet + IPv4 + UDP frame as a peer would send it
pub fn udp_frame(
    src_ip: Ipv4Addr,
    dest_ip: Ipv4Addr,
    src_port: u16,
    dest_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = 8 + payload.len();
    let total_len = 20 + udp_len;

    let mut frame = vec![0u8; ethernet::HEADER_SIZE];
    ethernet::write_header(&mut frame, OUR_MAC, PEER_MAC, ETHERTYPE_IPV4);

    let mut ip = [0u8; 20];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    ip[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
    ip[6] = 0x40;
    ip[8] = 64;
    ip[9] = UDP_PROTOCOL;
    ip[12..16].copy_from_slice(&src_ip.octets());
    ip[16..20].copy_from_slice(&dest_ip.octets());
    let sum = ipv4::checksum(&ip);
    ip[10..12].copy_from_slice(&sum.to_be_bytes());
    frame.extend_from_slice(&ip);

    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dest_port.to_be_bytes());
    frame.extend_from_slice(&(udp_len as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(payload);
    frame
}

/// Field accessors for frames the stack transmitted
pub mod sent {
    use super::*;

    pub fn dest_mac(frame: &[u8]) -> MacAddr {
        MacAddr(frame[0..6].try_into().unwrap())
    }

    pub fn ip_id(frame: &[u8]) -> u16 {
        u16::from_be_bytes([frame[18], frame[19]])
    }

    pub fn src_ip(frame: &[u8]) -> Ipv4Addr {
        Ipv4Addr::new(frame[26], frame[27], frame[28], frame[29])
    }

    pub fn dest_ip(frame: &[u8]) -> Ipv4Addr {
        Ipv4Addr::new(frame[30], frame[31], frame[32], frame[33])
    }

    pub fn src_port(frame: &[u8]) -> u16 {
        u16::from_be_bytes([frame[34], frame[35]])
    }

    pub fn dest_port(frame: &[u8]) -> u16 {
        u16::from_be_bytes([frame[36], frame[37]])
    }

    pub fn payload(frame: &[u8]) -> &[u8] {
        &frame[42..]
    }
}
