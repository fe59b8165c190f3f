//! Network manager tests driven through a recording fake driver.

use std::net::Ipv4Addr;
use std::sync::Arc;

use husk_common::{ContainerRecord, HuskError, HuskPaths, HuskResult};
use husk_network::portmap::dnat_rule;
use husk_network::{Endpoint, Network, NetworkDriver, NetworkManager, PortMapping, RuleAction};
use parking_lot::Mutex;
use tempfile::TempDir;

#[derive(Default)]
struct Recorded {
    events: Vec<String>,
    endpoints: Vec<Endpoint>,
}

#[derive(Clone, Default)]
struct FakeDriver {
    recorded: Arc<Mutex<Recorded>>,
    fail_create: bool,
    fail_delete: bool,
    fail_connect: bool,
}

impl NetworkDriver for FakeDriver {
    fn name(&self) -> &str {
        "bridge"
    }

    fn create(&self, network: &Network) -> HuskResult<()> {
        self.recorded
            .lock()
            .events
            .push(format!("create {} {}", network.name, network.ip_range));
        if self.fail_create {
            return Err(HuskError::command("iptables", "masquerade rule rejected"));
        }
        Ok(())
    }

    fn delete(&self, network: &Network) -> HuskResult<()> {
        self.recorded.lock().events.push(format!("delete {}", network.name));
        if self.fail_delete {
            return Err(HuskError::command("ip", "link delete failed"));
        }
        Ok(())
    }

    fn connect(&self, network: &Network, endpoint: &Endpoint, pid: i32) -> HuskResult<()> {
        if self.fail_connect {
            return Err(HuskError::command("ip", "link add failed"));
        }
        let mut recorded = self.recorded.lock();
        recorded.events.push(format!(
            "connect {} {} {} pid={pid}",
            network.name, endpoint.id, endpoint.ip_address
        ));
        recorded.endpoints.push(endpoint.clone());
        Ok(())
    }

    fn disconnect(&self, network: &Network, endpoint: &Endpoint) -> HuskResult<()> {
        self.recorded
            .lock()
            .events
            .push(format!("disconnect {} {}", network.name, endpoint.ip_address));
        Ok(())
    }
}

fn setup(driver: &FakeDriver) -> (TempDir, HuskPaths, NetworkManager) {
    let dir = tempfile::tempdir().unwrap();
    let paths = HuskPaths::with_root(dir.path());
    let manager = NetworkManager::with_drivers(&paths, vec![Box::new(driver.clone())]).unwrap();
    (dir, paths, manager)
}

fn container(id: &str, ports: &[&str]) -> ContainerRecord {
    ContainerRecord::running(
        id,
        id,
        std::process::id(),
        &["sh".to_string()],
        "",
        ports.iter().map(ToString::to_string).collect(),
    )
}

fn attach(manager: &NetworkManager, network: &str, record: &mut ContainerRecord) -> Endpoint {
    let endpoint = manager.connect(network, record).unwrap();
    record.network = network.to_string();
    record.ip_address = endpoint.ip_address.to_string();
    endpoint
}

#[test]
fn gateway_and_container_addresses() {
    let driver = FakeDriver::default();
    let (_dir, _paths, mut manager) = setup(&driver);

    let network = manager.create("bridge", "10.0.0.0/24", "br0").unwrap();
    assert_eq!(network.gateway(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(network.ip_range.to_string(), "10.0.0.1/24");

    let mut first = container("1111111111", &[]);
    let mut second = container("2222222222", &[]);
    let a = attach(&manager, "br0", &mut first);
    let b = attach(&manager, "br0", &mut second);
    assert_eq!(a.ip_address, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(b.ip_address, Ipv4Addr::new(10, 0, 0, 3));
    assert_eq!(a.id, "1111111111-br0");

    manager.disconnect(&first).unwrap();
    manager.disconnect(&second).unwrap();
    manager.delete("br0").unwrap();
    assert!(manager.get("br0").unwrap_err().is_not_found());

    let again = manager.create("bridge", "10.0.0.0/24", "br0").unwrap();
    assert_eq!(again.gateway(), Ipv4Addr::new(10, 0, 0, 1));

    let events = driver.recorded.lock().events.clone();
    assert_eq!(events[0], "create br0 10.0.0.1/24");
    assert!(events.contains(&"disconnect br0 10.0.0.3".to_string()));
    assert_eq!(events.last().unwrap(), "create br0 10.0.0.1/24");
}

#[test]
fn released_address_is_reused() {
    let driver = FakeDriver::default();
    let (_dir, _paths, mut manager) = setup(&driver);
    manager.create("bridge", "10.9.0.0/24", "net9").unwrap();

    let mut first = container("1111111111", &[]);
    attach(&manager, "net9", &mut first);
    manager.disconnect(&first).unwrap();

    let mut second = container("2222222222", &[]);
    let endpoint = attach(&manager, "net9", &mut second);
    assert_eq!(endpoint.ip_address, Ipv4Addr::new(10, 9, 0, 2));
}

#[test]
fn port_mapping_yields_one_dnat_rule() {
    let driver = FakeDriver::default();
    let (_dir, _paths, mut manager) = setup(&driver);
    manager.create("bridge", "10.0.0.0/24", "br0").unwrap();

    let mut record = container("3333333333", &["8080", "8080:80"]);
    attach(&manager, "br0", &mut record);

    let recorded = driver.recorded.lock();
    let endpoint = &recorded.endpoints[0];
    assert_eq!(endpoint.port_mapping, vec![PortMapping::new(8080, 80)]);

    let rules: Vec<_> = endpoint
        .port_mapping
        .iter()
        .map(|m| dnat_rule(RuleAction::Append, endpoint.ip_address, *m).join(" "))
        .collect();
    assert_eq!(
        rules,
        vec!["-t nat -A PREROUTING -p tcp -m tcp --dport 8080 -j DNAT --to-destination 10.0.0.2:80"]
    );
}

#[test]
fn networks_survive_reload() {
    let driver = FakeDriver::default();
    let (_dir, paths, mut manager) = setup(&driver);
    manager.create("bridge", "192.168.50.0/24", "lan").unwrap();
    manager.create("bridge", "10.10.0.0/16", "backend").unwrap();

    let reloaded = NetworkManager::with_drivers(&paths, vec![Box::new(driver.clone())]).unwrap();
    let names: Vec<_> = reloaded.list().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["backend", "lan"]);
    assert_eq!(
        reloaded.get("lan").unwrap().gateway(),
        Ipv4Addr::new(192, 168, 50, 1)
    );
}

#[test]
fn duplicate_network_is_rejected() {
    let driver = FakeDriver::default();
    let (_dir, _paths, mut manager) = setup(&driver);
    manager.create("bridge", "10.0.0.0/24", "br0").unwrap();

    let err = manager.create("bridge", "10.1.0.0/24", "br0").unwrap_err();
    assert!(matches!(err, HuskError::Config { .. }));
    assert!(!manager.ipam().table().unwrap().contains_key("10.1.0.0/24"));
}

#[test]
fn failed_connect_releases_address() {
    let driver = FakeDriver {
        fail_connect: true,
        ..FakeDriver::default()
    };
    let (_dir, _paths, mut manager) = setup(&driver);
    manager.create("bridge", "10.0.0.0/24", "br0").unwrap();

    let record = container("4444444444", &[]);
    let err = manager.connect("br0", &record).unwrap_err();
    assert!(matches!(err, HuskError::Command { .. }));

    let table = manager.ipam().table().unwrap();
    assert!(table["10.0.0.0/24"].starts_with("10"));
}

#[test]
fn connect_to_unknown_network() {
    let driver = FakeDriver::default();
    let (_dir, _paths, manager) = setup(&driver);
    let record = container("5555555555", &[]);
    assert!(manager.connect("nope", &record).unwrap_err().is_not_found());
}

#[test]
fn invalid_subnet_is_rejected() {
    let driver = FakeDriver::default();
    let (_dir, _paths, mut manager) = setup(&driver);
    let err = manager.create("bridge", "10.0.0.0/31", "tiny").unwrap_err();
    assert!(matches!(err, HuskError::InvalidSubnet { .. }));
    assert!(driver.recorded.lock().events.is_empty());
}

#[test]
fn failed_create_undoes_driver_state() {
    let failing = FakeDriver {
        fail_create: true,
        ..FakeDriver::default()
    };
    let (_dir, paths, mut manager) = setup(&failing);

    let err = manager.create("bridge", "10.0.0.0/24", "br0").unwrap_err();
    assert!(matches!(err, HuskError::Command { .. }));
    assert_eq!(
        failing.recorded.lock().events,
        vec!["create br0 10.0.0.1/24", "delete br0"]
    );
    assert!(manager.get("br0").unwrap_err().is_not_found());

    let driver = FakeDriver::default();
    let mut manager = NetworkManager::with_drivers(&paths, vec![Box::new(driver)]).unwrap();
    let network = manager.create("bridge", "10.0.0.0/24", "br0").unwrap();
    assert_eq!(network.gateway(), Ipv4Addr::new(10, 0, 0, 1));
}

#[test]
fn failed_delete_keeps_gateway_allocated() {
    let driver = FakeDriver {
        fail_delete: true,
        ..FakeDriver::default()
    };
    let (_dir, paths, mut manager) = setup(&driver);
    manager.create("bridge", "10.0.0.0/24", "br0").unwrap();

    assert!(manager.delete("br0").is_err());
    assert!(manager.get("br0").is_ok());

    let reloaded = NetworkManager::with_drivers(&paths, vec![Box::new(driver.clone())]).unwrap();
    assert!(reloaded.get("br0").is_ok());

    let other = manager.create("bridge", "10.0.0.0/24", "br1").unwrap();
    assert_ne!(other.gateway(), Ipv4Addr::new(10, 0, 0, 1));
}

#[test]
fn name_taken_by_another_manager_leaves_its_bridge_alone() {
    let first = FakeDriver::default();
    let (_dir, paths, mut manager) = setup(&first);
    let stale = FakeDriver::default();
    let mut other = NetworkManager::with_drivers(&paths, vec![Box::new(stale.clone())]).unwrap();

    manager.create("bridge", "10.0.0.0/24", "br0").unwrap();

    let err = other.create("bridge", "10.0.1.0/24", "br0").unwrap_err();
    assert!(matches!(err, HuskError::Config { .. }));
    assert!(stale.recorded.lock().events.is_empty());
    assert!(!manager.ipam().table().unwrap()["10.0.1.0/24"].contains('1'));
}
