//! # husk-network
//!
//! Container networking for husk.
//!
//! Networks are Linux bridges with a NAT masquerade rule. Containers attach
//! through a veth pair whose peer is configured inside the container's network
//! namespace, and exposed ports become DNAT rules. Addresses come from a small
//! bitmap allocator persisted on disk.

#![warn(missing_docs)]

mod cmd;

pub mod bridge;
pub mod driver;
pub mod ipam;
pub mod netns;
pub mod network;
pub mod portmap;
pub mod veth;

pub use bridge::{BridgeDriver, BridgeManager};
pub use driver::{BRIDGE_DRIVER, Endpoint, NetworkDriver};
pub use ipam::{Ipam, parse_subnet};
pub use netns::with_netns;
pub use network::{Network, NetworkManager};
pub use portmap::{PortMapping, RuleAction};
pub use veth::VethPair;
