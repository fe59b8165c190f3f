//! Linux bridge management and the bridge network driver.

use husk_common::{HuskError, HuskResult};
use ipnetwork::Ipv4Network;

use crate::cmd;
use crate::driver::{BRIDGE_DRIVER, Endpoint, NetworkDriver};
use crate::netns;
use crate::network::Network;
use crate::portmap::{self, RuleAction};

/// A Linux bridge device.
#[derive(Debug, Clone)]
pub struct BridgeManager {
    /// Bridge name.
    name: String,
}

impl BridgeManager {
    /// Handle for the bridge called `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Check if a bridge exists.
    #[must_use]
    pub fn exists(name: &str) -> bool {
        cmd::link_exists(name)
    }

    /// Get the bridge name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the device unless it is already there.
    pub fn ensure(&self) -> HuskResult<()> {
        if Self::exists(&self.name) {
            tracing::debug!(name = %self.name, "Bridge already exists");
            return Ok(());
        }

        tracing::debug!(name = %self.name, "Creating bridge");
        cmd::ip(&["link", "add", "name", &self.name, "type", "bridge"])
    }

    /// Set IP address on the bridge.
    pub fn set_ip(&self, address: Ipv4Network) -> HuskResult<()> {
        tracing::debug!(bridge = %self.name, %address, "Setting IP address");
        cmd::ip(&["addr", "add", &address.to_string(), "dev", &self.name])
    }

    /// Bring the bridge interface up.
    pub fn up(&self) -> HuskResult<()> {
        cmd::ip(&["link", "set", &self.name, "up"])
    }

    /// Add an interface to the bridge.
    pub fn add_interface(&self, interface: &str) -> HuskResult<()> {
        tracing::debug!(bridge = %self.name, interface, "Adding interface to bridge");
        cmd::ip(&["link", "set", interface, "master", &self.name])
    }

    /// Delete the bridge.
    pub fn delete(&self) -> HuskResult<()> {
        tracing::debug!(name = %self.name, "Deleting bridge");
        cmd::ip(&["link", "delete", &self.name, "type", "bridge"])
    }
}

/// Realizes each network as a bridge named after it, NATed to the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeDriver;

impl NetworkDriver for BridgeDriver {
    fn name(&self) -> &str {
        BRIDGE_DRIVER
    }

    fn create(&self, network: &Network) -> HuskResult<()> {
        let bridge = BridgeManager::new(&network.name);
        bridge.ensure()?;
        bridge.set_ip(network.ip_range)?;
        bridge.up()?;

        let masquerade = portmap::masquerade_rule(RuleAction::Append, &network.subnet(), bridge.name());
        cmd::iptables(&masquerade)?;

        tracing::info!(name = %network.name, ip_range = %network.ip_range, "Bridge created");
        Ok(())
    }

    fn delete(&self, network: &Network) -> HuskResult<()> {
        let bridge = BridgeManager::new(&network.name);

        let masquerade = portmap::masquerade_rule(RuleAction::Delete, &network.subnet(), bridge.name());
        if let Err(e) = cmd::iptables(&masquerade) {
            tracing::warn!(name = %network.name, error = %e, "Failed to remove masquerade rule");
        }

        if BridgeManager::exists(bridge.name()) {
            bridge.delete()?;
        }
        Ok(())
    }

    fn connect(&self, network: &Network, endpoint: &Endpoint, pid: i32) -> HuskResult<()> {
        let veth = &endpoint.device;
        veth.create()?;

        // Deleting the host end takes the peer with it, wherever it lives.
        if let Err(e) = attach(network, endpoint, pid) {
            veth.delete();
            return Err(e);
        }

        tracing::info!(
            endpoint = %endpoint.id,
            ip = %endpoint.ip_address,
            network = %network.name,
            "Endpoint connected"
        );
        Ok(())
    }

    fn disconnect(&self, network: &Network, endpoint: &Endpoint) -> HuskResult<()> {
        portmap::unexpose_ports(endpoint.ip_address, &endpoint.port_mapping);
        endpoint.device.delete();

        tracing::info!(endpoint = %endpoint.id, network = %network.name, "Endpoint disconnected");
        Ok(())
    }
}

/// Wire an existing veth pair into the bridge and the container.
fn attach(network: &Network, endpoint: &Endpoint, pid: i32) -> HuskResult<()> {
    let bridge = BridgeManager::new(&network.name);
    let veth = &endpoint.device;

    bridge.add_interface(&veth.host)?;
    veth.move_to_netns(pid)?;

    let address = Ipv4Network::new(endpoint.ip_address, network.ip_range.prefix())
        .map_err(|e| HuskError::Internal {
            message: format!("endpoint address: {e}"),
        })?;
    let gateway = network.gateway();
    netns::with_netns(pid, || {
        veth.configure_peer(address, &endpoint.mac_address, gateway)
    })?;

    portmap::expose_ports(endpoint.ip_address, &endpoint.port_mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_exists_nonexistent() {
        assert!(!BridgeManager::exists("nonexistent_bridge_12345"));
    }

    #[test]
    fn bridge_driver_name() {
        assert_eq!(BridgeDriver.name(), "bridge");
    }
}
