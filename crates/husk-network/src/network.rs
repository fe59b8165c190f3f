//! Network records and the manager that owns them.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use husk_common::store::read_json;
use husk_common::{ContainerRecord, HuskError, HuskPaths, HuskResult, LockedStore};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::bridge::BridgeDriver;
use crate::driver::{Endpoint, NetworkDriver};
use crate::ipam::{self, Ipam};

/// A persisted network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Unique name, also the bridge device name.
    pub name: String,
    /// Gateway address with the block's prefix, e.g. `10.0.0.1/24`.
    #[serde(with = "cidr_string")]
    pub ip_range: Ipv4Network,
    /// Driver that realizes the network.
    pub driver: String,
}

impl Network {
    /// The gateway address.
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.ip_range.ip()
    }

    /// The normalized CIDR block, e.g. `10.0.0.0/24`.
    #[must_use]
    pub fn subnet(&self) -> Ipv4Network {
        Ipv4Network::new(self.ip_range.network(), self.ip_range.prefix()).unwrap_or(self.ip_range)
    }
}

mod cidr_string {
    use ipnetwork::Ipv4Network;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Ipv4Network, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Ipv4Network, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Owns the IPAM table, the registered drivers and the known networks.
///
/// Built once per process and passed to every network operation.
pub struct NetworkManager {
    dir: PathBuf,
    ipam: Ipam,
    drivers: HashMap<String, Box<dyn NetworkDriver>>,
    networks: BTreeMap<String, Network>,
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("dir", &self.dir)
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .field("networks", &self.networks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl NetworkManager {
    /// Manager with the bridge driver, loading networks persisted under `paths`.
    pub fn new(paths: &HuskPaths) -> HuskResult<Self> {
        Self::with_drivers(paths, vec![Box::new(BridgeDriver)])
    }

    /// Manager with an explicit set of drivers.
    pub fn with_drivers(
        paths: &HuskPaths,
        drivers: Vec<Box<dyn NetworkDriver>>,
    ) -> HuskResult<Self> {
        let dir = paths.networks();
        std::fs::create_dir_all(&dir)?;

        let drivers = drivers
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect();

        let mut manager = Self {
            networks: load_networks(&dir),
            dir,
            ipam: Ipam::new(paths.ipam_table()),
            drivers,
        };
        manager.networks.retain(|name, network| {
            let known = manager.drivers.contains_key(&network.driver);
            if !known {
                tracing::warn!(name, driver = %network.driver, "Network uses an unknown driver");
            }
            known
        });
        Ok(manager)
    }

    fn record(&self, name: &str) -> LockedStore {
        LockedStore::new(self.dir.join(name))
    }

    fn release_gateway(&self, name: &str, subnet: &Ipv4Network, gateway: Ipv4Addr) {
        if let Err(e) = self.ipam.release(subnet, gateway) {
            tracing::warn!(name, error = %e, "Failed to release gateway after error");
        }
    }

    fn driver(&self, name: &str) -> HuskResult<&dyn NetworkDriver> {
        self.drivers
            .get(name)
            .map(|driver| &**driver)
            .ok_or_else(|| HuskError::config(format!("unknown network driver '{name}'")))
    }

    /// Look up a network by name.
    pub fn get(&self, name: &str) -> HuskResult<&Network> {
        self.networks
            .get(name)
            .ok_or_else(|| HuskError::NetworkNotFound {
                name: name.to_string(),
            })
    }

    /// All networks, sorted by name.
    pub fn list(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    /// The address allocator.
    #[must_use]
    pub const fn ipam(&self) -> &Ipam {
        &self.ipam
    }

    /// Create `name` over `subnet` with `driver`.
    ///
    /// The first address of the block becomes the gateway.
    pub fn create(&mut self, driver: &str, subnet: &str, name: &str) -> HuskResult<&Network> {
        husk_common::validate_name(name).map_err(|_| {
            HuskError::config(format!("invalid network name '{name}'"))
        })?;
        if self.networks.contains_key(name) {
            return Err(HuskError::config(format!("network '{name}' already exists")));
        }
        let driver_impl = self.driver(driver)?;
        let subnet = ipam::parse_subnet(subnet)?;

        let gateway = self.ipam.allocate(&subnet)?;
        let network = Network {
            name: name.to_string(),
            ip_range: Ipv4Network::new(gateway, subnet.prefix()).map_err(|e| {
                HuskError::Internal {
                    message: format!("gateway range: {e}"),
                }
            })?,
            driver: driver.to_string(),
        };

        let reserved = self.record(name).update(|slot: &mut Option<Network>| {
            if slot.is_some() {
                return Err(HuskError::config(format!("network '{name}' already exists")));
            }
            *slot = Some(network.clone());
            Ok(())
        });
        if let Err(e) = reserved {
            self.release_gateway(name, &subnet, gateway);
            return Err(e);
        }

        if let Err(e) = driver_impl.create(&network) {
            if let Err(undo) = driver_impl.delete(&network) {
                tracing::warn!(name, error = %undo, "Failed to undo driver state");
            }
            if let Err(undo) = self.record(name).remove() {
                tracing::warn!(name, error = %undo, "Failed to remove network record");
            }
            self.release_gateway(name, &subnet, gateway);
            return Err(e);
        }

        tracing::info!(name, ip_range = %network.ip_range, driver, "Network created");
        Ok(self.networks.entry(name.to_string()).or_insert(network))
    }

    /// Delete a network: tear down the driver state, remove the record and
    /// release its gateway.
    ///
    /// The gateway is only given back once nothing else refers to it.
    pub fn delete(&mut self, name: &str) -> HuskResult<()> {
        let network = self.get(name)?.clone();

        self.driver(&network.driver)?.delete(&network)?;
        self.record(name).remove()?;
        self.networks.remove(name);
        self.ipam.release(&network.subnet(), network.gateway())?;

        tracing::info!(name, "Network deleted");
        Ok(())
    }

    /// Attach the container described by `record` to `network`.
    ///
    /// The allocated address is released again if the driver fails.
    pub fn connect(&self, network: &str, record: &ContainerRecord) -> HuskResult<Endpoint> {
        let network = self.get(network)?;
        let pid = record.pid_number()?;
        let subnet = network.subnet();

        let ip = self.ipam.allocate(&subnet)?;
        let endpoint = Endpoint::new(&record.id, &network.name, ip, &record.port_mapping);

        if let Err(e) = self.driver(&network.driver)?.connect(network, &endpoint, pid) {
            if let Err(release) = self.ipam.release(&subnet, ip) {
                tracing::warn!(%ip, error = %release, "Failed to release address after error");
            }
            return Err(e);
        }
        Ok(endpoint)
    }

    /// Detach the container described by `record`, releasing its address.
    pub fn disconnect(&self, record: &ContainerRecord) -> HuskResult<()> {
        if !record.has_endpoint() {
            return Ok(());
        }
        let network = self.get(&record.network)?;
        let ip: Ipv4Addr = record.ip_address.parse().map_err(|_| {
            HuskError::config(format!("container {} has invalid address '{}'", record.name, record.ip_address))
        })?;

        let endpoint = Endpoint::new(&record.id, &network.name, ip, &record.port_mapping);
        self.driver(&network.driver)?.disconnect(network, &endpoint)?;
        self.ipam.release(&network.subnet(), ip)
    }
}

fn load_networks(dir: &Path) -> BTreeMap<String, Network> {
    walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !name.ends_with(".lock")
        })
        .filter_map(|entry| match read_json::<Network>(entry.path()) {
            Ok(network) => Some((network.name.clone(), network)),
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable network");
                None
            }
        })
        .collect()
}
