//! Allocation-free IPv4/UDP data plane for a bare-metal lighting node.
//!
//! The stack runs on top of a raw Ethernet MAC: one poll loop calls
//! [`Network::run`], which pulls at most one frame from the driver,
//! dispatches it by EtherType and then drives the collaborators' timers.
//! UDP endpoints live in a fixed port table with small circular receive
//! queues, and every datagram is built in one reusable transmit template.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod serial;

//Networking infrastructure
pub mod net;

pub use config::NetworkParams;
pub use net::stack::{AddressingMode, NetCore};
pub use net::ethernet::MacAddr;
pub use net::ipv4::IpConfig;
pub use net::network::{LoopbackNetwork, Network};
pub use net::udp::{UdpHandle, UdpTransport};
