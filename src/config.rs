//! Stack sizing and boot parameters.
//!
//! Everything that decides how much memory the stack occupies is a
//! compile-time constant here; the values that change per boot live in
//! [`NetworkParams`].

use crate::net::ipv4::IpConfig;

/// Port table capacity of the default stack.
pub const UDP_MAX_PORTS: usize = 16;

/// Receive queue depth per bound port. Must be a power of two.
pub const UDP_RX_ENTRIES: usize = 2;

/// Largest UDP payload the stack stores or transmits (1500 - 20 - 8).
pub const UDP_DATA_SIZE: usize = 1472;

/// DHCP client port.
pub const DHCP_PORT_CLIENT: u16 = 68;

/// TFTP server port (firmware recovery).
pub const TFTP_PORT_SERVER: u16 = 69;

/// NTP server port (time sync).
pub const NTP_PORT_SERVER: u16 = 123;

/// Ports below 1024 that are still delivered to a bound slot.
pub const SYSTEM_PORTS: [u16; 3] = [DHCP_PORT_CLIENT, TFTP_PORT_SERVER, NTP_PORT_SERVER];

/// Lowest port number that needs no allow-list entry.
pub const UNPRIVILEGED_PORT_START: u16 = 1024;

pub const HOSTNAME_SIZE: usize = 64;
pub const DOMAINNAME_SIZE: usize = 64;

/// Entries in the in-crate ARP table.
pub const ARP_TABLE_SIZE: usize = 16;

/// Frames the loopback device can hold before rejecting transmits.
pub const LOOPBACK_FRAMES: usize = 8;

/// Per-boot network parameters, normally loaded from the config store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams<'a> {
    /// Static configuration, also the starting point for DHCP.
    pub ip_config: IpConfig,
    /// Try DHCP first, falling back to link-local on failure.
    pub use_dhcp: bool,
    /// Name announced to the DHCP server.
    pub hostname: &'a str,
}

impl Default for NetworkParams<'_> {
    fn default() -> Self {
        Self {
            ip_config: IpConfig::unconfigured(),
            use_dhcp: true,
            hostname: "lightnode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_depth_is_power_of_two() {
        assert!(UDP_RX_ENTRIES.is_power_of_two());
        assert!(LOOPBACK_FRAMES.is_power_of_two());
    }

    #[test]
    fn test_system_ports_are_privileged() {
        for port in SYSTEM_PORTS {
            assert!(port < UNPRIVILEGED_PORT_START);
        }
    }

    #[test]
    fn test_default_params_use_dhcp() {
        let params = NetworkParams::default();
        assert!(params.use_dhcp);
        assert!(!params.ip_config.is_valid());
    }
}
