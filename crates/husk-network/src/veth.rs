//! Virtual ethernet pair management.

use std::net::Ipv4Addr;

use husk_common::HuskResult;
use ipnetwork::Ipv4Network;

use crate::cmd;

/// Virtual ethernet pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// Host-side interface name, attached to the bridge.
    pub host: String,
    /// Peer interface name, moved into the container.
    pub peer: String,
}

impl VethPair {
    /// Interface names for a container id. Both fit the 15 byte limit.
    #[must_use]
    pub fn for_container(container_id: &str) -> Self {
        let short = container_id.get(..10).unwrap_or(container_id);
        Self {
            host: format!("veth{short}"),
            peer: format!("cif{short}"),
        }
    }

    /// Create the pair and bring the host side up.
    pub fn create(&self) -> HuskResult<()> {
        tracing::debug!(host = %self.host, peer = %self.peer, "Creating veth pair");

        cmd::ip(&[
            "link", "add", &self.host, "type", "veth", "peer", "name", &self.peer,
        ])?;
        cmd::ip(&["link", "set", &self.host, "up"])?;
        Ok(())
    }

    /// Move the peer into the network namespace of `pid`.
    pub fn move_to_netns(&self, pid: i32) -> HuskResult<()> {
        tracing::debug!(interface = %self.peer, pid, "Moving to netns");
        cmd::ip(&["link", "set", &self.peer, "netns", &pid.to_string()])
    }

    /// Address the peer and route through `gateway`.
    ///
    /// Must run inside the container's network namespace.
    pub fn configure_peer(
        &self,
        address: Ipv4Network,
        mac: &str,
        gateway: Ipv4Addr,
    ) -> HuskResult<()> {
        let gateway = gateway.to_string();
        cmd::ip(&["addr", "add", &address.to_string(), "dev", &self.peer])?;
        cmd::ip(&["link", "set", &self.peer, "address", mac])?;
        cmd::ip(&["link", "set", &self.peer, "up"])?;
        cmd::ip(&["link", "set", "lo", "up"])?;
        cmd::ip(&["route", "add", "default", "via", &gateway, "dev", &self.peer])?;
        Ok(())
    }

    /// Delete the pair through its host side. Missing links are not an error.
    pub fn delete(&self) {
        if !cmd::link_exists(&self.host) {
            return;
        }
        if let Err(e) = cmd::ip(&["link", "delete", &self.host]) {
            tracing::warn!(host = %self.host, error = %e, "Failed to delete veth pair");
        }
    }
}

/// Locally administered MAC derived from an IPv4 address.
#[must_use]
pub fn mac_for(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("02:42:{a:02x}:{b:02x}:{c:02x}:{d:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_fit_interface_limit() {
        let veth = VethPair::for_container("0123456789");
        assert_eq!(veth.host, "veth0123456789");
        assert_eq!(veth.peer, "cif0123456789");
        assert!(veth.host.len() <= 15);

        let short = VethPair::for_container("abc");
        assert_eq!(short.host, "vethabc");
    }

    #[test]
    fn mac_from_ip() {
        assert_eq!(mac_for(Ipv4Addr::new(10, 0, 0, 2)), "02:42:0a:00:00:02");
        assert_eq!(mac_for(Ipv4Addr::new(172, 17, 255, 1)), "02:42:ac:11:ff:01");
    }
}
