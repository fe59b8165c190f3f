//! The network driver seam and the endpoints it connects.

use std::net::Ipv4Addr;

use husk_common::HuskResult;

use crate::network::Network;
use crate::portmap::PortMapping;
use crate::veth::{self, VethPair};

/// Name of the only built-in driver.
pub const BRIDGE_DRIVER: &str = "bridge";

/// A way of realizing networks on the host.
pub trait NetworkDriver {
    /// Driver name as stored in network records.
    fn name(&self) -> &str;

    /// Set up host-side state for a new network.
    fn create(&self, network: &Network) -> HuskResult<()>;

    /// Tear down host-side state of a network.
    fn delete(&self, network: &Network) -> HuskResult<()>;

    /// Attach the container whose init process is `pid`.
    fn connect(&self, network: &Network, endpoint: &Endpoint, pid: i32) -> HuskResult<()>;

    /// Undo what `connect` installed on the host.
    fn disconnect(&self, network: &Network, endpoint: &Endpoint) -> HuskResult<()>;
}

/// One container's attachment to one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `<container id>-<network name>`.
    pub id: String,
    /// The veth pair carrying the traffic.
    pub device: VethPair,
    /// Address allocated to the container.
    pub ip_address: Ipv4Addr,
    /// MAC set on the container side.
    pub mac_address: String,
    /// Ports exposed on the host.
    pub port_mapping: Vec<PortMapping>,
}

impl Endpoint {
    /// Build the endpoint for `container_id` on `network`.
    ///
    /// Malformed port mapping entries are dropped with a warning.
    #[must_use]
    pub fn new<S: AsRef<str>>(
        container_id: &str,
        network: &str,
        ip_address: Ipv4Addr,
        port_mapping: &[S],
    ) -> Self {
        Self {
            id: format!("{container_id}-{network}"),
            device: VethPair::for_container(container_id),
            ip_address,
            mac_address: veth::mac_for(ip_address),
            port_mapping: PortMapping::parse_all(port_mapping),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn endpoint_fields() {
        let endpoint = Endpoint::new(
            "0123456789",
            "br0",
            Ipv4Addr::new(10, 0, 0, 2),
            &["8080:80", "8080"],
        );
        assert_eq!(endpoint.id, "0123456789-br0");
        assert_eq!(endpoint.device.peer, "cif0123456789");
        assert_eq!(endpoint.mac_address, "02:42:0a:00:00:02");
        assert_eq!(endpoint.port_mapping, vec![PortMapping::new(8080, 80)]);
    }
}
