//! Port mapping and masquerading.
//!
//! This module builds the iptables NAT rules that expose container ports on
//! the host and give a bridge network outbound connectivity. Rule builders are
//! pure so the exact argument vectors can be checked without root.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use husk_common::{HuskError, HuskResult};
use ipnetwork::Ipv4Network;

use crate::cmd;

/// Whether a rule is appended or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// `-A`
    Append,
    /// `-D`
    Delete,
}

impl RuleAction {
    const fn flag(self) -> &'static str {
        match self {
            Self::Append => "-A",
            Self::Delete => "-D",
        }
    }
}

/// A TCP port mapping between host and container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Host port.
    pub host_port: u16,
    /// Container port.
    pub container_port: u16,
}

impl PortMapping {
    /// Create a new mapping.
    #[must_use]
    pub const fn new(host_port: u16, container_port: u16) -> Self {
        Self {
            host_port,
            container_port,
        }
    }

    /// Parse every `host:container` entry, skipping malformed ones.
    #[must_use]
    pub fn parse_all<S: AsRef<str>>(entries: &[S]) -> Vec<Self> {
        entries
            .iter()
            .filter_map(|entry| {
                let entry = entry.as_ref();
                match entry.parse() {
                    Ok(mapping) => Some(mapping),
                    Err(e) => {
                        tracing::warn!(entry, error = %e, "Skipping malformed port mapping");
                        None
                    }
                }
            })
            .collect()
    }
}

impl FromStr for PortMapping {
    type Err = HuskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || HuskError::config(format!("port mapping '{s}' is not hostPort:containerPort"));
        let (host, container) = s.split_once(':').ok_or_else(bad)?;
        Ok(Self {
            host_port: host.trim().parse().map_err(|_| bad())?,
            container_port: container.trim().parse().map_err(|_| bad())?,
        })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_port, self.container_port)
    }
}

/// The PREROUTING DNAT rule sending `host_port` to `container_ip:container_port`.
#[must_use]
pub fn dnat_rule(action: RuleAction, container_ip: Ipv4Addr, mapping: PortMapping) -> Vec<String> {
    vec![
        "-t".into(),
        "nat".into(),
        action.flag().into(),
        "PREROUTING".into(),
        "-p".into(),
        "tcp".into(),
        "-m".into(),
        "tcp".into(),
        "--dport".into(),
        mapping.host_port.to_string(),
        "-j".into(),
        "DNAT".into(),
        "--to-destination".into(),
        format!("{container_ip}:{}", mapping.container_port),
    ]
}

/// The POSTROUTING rule masquerading traffic that leaves `subnet` through any
/// interface other than `bridge`.
#[must_use]
pub fn masquerade_rule(action: RuleAction, subnet: &Ipv4Network, bridge: &str) -> Vec<String> {
    vec![
        "-t".into(),
        "nat".into(),
        action.flag().into(),
        "POSTROUTING".into(),
        "-s".into(),
        subnet.to_string(),
        "!".into(),
        "-o".into(),
        bridge.into(),
        "-j".into(),
        "MASQUERADE".into(),
    ]
}

/// Install the DNAT rules for every mapping.
///
/// If one rule cannot be added, the ones added before it are removed again.
pub fn expose_ports(container_ip: Ipv4Addr, mappings: &[PortMapping]) -> HuskResult<()> {
    expose_with(container_ip, mappings, cmd::iptables::<String>)
}

fn expose_with<F>(container_ip: Ipv4Addr, mappings: &[PortMapping], mut run: F) -> HuskResult<()>
where
    F: FnMut(&[String]) -> HuskResult<()>,
{
    for (added, mapping) in mappings.iter().enumerate() {
        tracing::debug!(%container_ip, %mapping, "Adding port mapping");
        if let Err(e) = run(&dnat_rule(RuleAction::Append, container_ip, *mapping)) {
            for done in &mappings[..added] {
                if let Err(undo) = run(&dnat_rule(RuleAction::Delete, container_ip, *done)) {
                    tracing::warn!(%container_ip, mapping = %done, error = %undo, "Failed to remove port mapping");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Remove the DNAT rules for every mapping, logging failures.
pub fn unexpose_ports(container_ip: Ipv4Addr, mappings: &[PortMapping]) {
    for mapping in mappings {
        if let Err(e) = cmd::iptables(&dnat_rule(RuleAction::Delete, container_ip, *mapping)) {
            tracing::warn!(%container_ip, %mapping, error = %e, "Failed to remove port mapping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mapping() {
        let mapping: PortMapping = "8080:80".parse().unwrap();
        assert_eq!(mapping, PortMapping::new(8080, 80));
        assert_eq!(mapping.to_string(), "8080:80");
    }

    #[test]
    fn malformed_mappings_are_skipped() {
        let parsed = PortMapping::parse_all(&["8080", "8080:80", "a:b", "1:70000", "53:53"]);
        assert_eq!(parsed, vec![PortMapping::new(8080, 80), PortMapping::new(53, 53)]);
    }

    #[test]
    fn dnat_rule_args() {
        let args = dnat_rule(
            RuleAction::Append,
            Ipv4Addr::new(10, 0, 0, 2),
            PortMapping::new(8080, 80),
        );
        insta::assert_snapshot!(args.join(" "), @"-t nat -A PREROUTING -p tcp -m tcp --dport 8080 -j DNAT --to-destination 10.0.0.2:80");
    }

    #[test]
    fn masquerade_rule_args() {
        let subnet: Ipv4Network = "10.0.0.0/24".parse().unwrap();
        let args = masquerade_rule(RuleAction::Delete, &subnet, "br0");
        insta::assert_snapshot!(args.join(" "), @"-t nat -D POSTROUTING -s 10.0.0.0/24 ! -o br0 -j MASQUERADE");
    }

    #[test_log::test]
    fn failed_mapping_removes_earlier_rules() {
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        let mappings = [
            PortMapping::new(8080, 80),
            PortMapping::new(8443, 443),
            PortMapping::new(2222, 22),
        ];
        let mut issued = Vec::new();

        let result = expose_with(ip, &mappings, |args| {
            issued.push(args.join(" "));
            if args.contains(&"8443".to_string()) && args.contains(&"-A".to_string()) {
                return Err(husk_common::HuskError::command("iptables", "rule rejected"));
            }
            Ok(())
        });

        assert!(result.is_err());
        insta::assert_snapshot!(issued.join("\n"), @r"
        -t nat -A PREROUTING -p tcp -m tcp --dport 8080 -j DNAT --to-destination 10.0.0.2:80
        -t nat -A PREROUTING -p tcp -m tcp --dport 8443 -j DNAT --to-destination 10.0.0.2:443
        -t nat -D PREROUTING -p tcp -m tcp --dport 8080 -j DNAT --to-destination 10.0.0.2:80
        ");
    }
}
