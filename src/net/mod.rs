//! Network stack implementation
//!
//! Leaf layers first: frame I/O, buffers and wire formats, then the
//! collaborators the core talks to, then the core and its facade.

pub mod device;
pub mod buffer;
pub mod loopback;
pub mod ethernet;
pub mod arp;
pub mod ipv4;
pub mod bootstrap;
pub mod udp;
pub mod stack;
pub mod network;
