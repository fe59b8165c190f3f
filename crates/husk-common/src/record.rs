//! The persisted container record and resource limits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HuskError, HuskResult};

/// Timestamp layout used for `createTime`.
pub const CREATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Runtime status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// The init process is alive.
    Running,
    /// Stopped by `stop`.
    Stopped,
    /// The process went away on its own.
    Exited,
}

impl ContainerStatus {
    /// Whether a container in this status may be removed.
    #[must_use]
    pub const fn can_remove(self) -> bool {
        matches!(self, Self::Stopped | Self::Exited)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Exited => "exited",
        };
        write!(f, "{s}")
    }
}

/// Identity and runtime state of one container.
///
/// `pid` is non-empty exactly when `status` is [`ContainerStatus::Running`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    /// Short random token, never changes.
    pub id: String,
    /// Unique name, also the on-disk key.
    pub name: String,
    /// Host pid of the init process, empty when not running.
    pub pid: String,
    /// The argument vector joined with spaces.
    pub command: String,
    /// Creation time, `YYYY-MM-DD HH:MM:SS` local time.
    pub create_time: String,
    /// Current status.
    pub status: ContainerStatus,
    /// Raw `host:container` volume spec or empty.
    pub volume: String,
    /// `hostPort:containerPort` entries.
    #[serde(default)]
    pub port_mapping: Vec<String>,
    /// Network the container is attached to, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,
    /// Address allocated on `network`, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
}

impl ContainerRecord {
    /// Create a record for a freshly started init process.
    #[must_use]
    pub fn running(
        id: impl Into<String>,
        name: impl Into<String>,
        pid: u32,
        commands: &[String],
        volume: impl Into<String>,
        port_mapping: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pid: pid.to_string(),
            command: commands.join(" "),
            create_time: chrono::Local::now().format(CREATE_TIME_FORMAT).to_string(),
            status: ContainerStatus::Running,
            volume: volume.into(),
            port_mapping,
            network: String::new(),
            ip_address: String::new(),
        }
    }

    /// Parse the stored pid.
    pub fn pid_number(&self) -> HuskResult<i32> {
        match self.pid.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(pid),
            _ => Err(HuskError::InvalidPid {
                name: self.name.clone(),
                pid: self.pid.clone(),
            }),
        }
    }

    /// Transition to [`ContainerStatus::Stopped`].
    pub fn mark_stopped(&mut self) {
        self.status = ContainerStatus::Stopped;
        self.pid.clear();
    }

    /// Transition to [`ContainerStatus::Exited`].
    pub fn mark_exited(&mut self) {
        self.status = ContainerStatus::Exited;
        self.pid.clear();
    }

    /// Whether the record is attached to a network.
    #[must_use]
    pub fn has_endpoint(&self) -> bool {
        !self.network.is_empty() && !self.ip_address.is_empty()
    }
}

/// Requested resource limits.
///
/// Values are passed through to the cgroup files verbatim; an empty string
/// means "no limit for this resource".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Memory limit, e.g. `100m`.
    #[serde(default)]
    pub memory_limit: String,
    /// Relative CPU share, e.g. `512`.
    #[serde(default)]
    pub cpu_share: String,
    /// CPU set, e.g. `0-1`.
    #[serde(default)]
    pub cpu_set: String,
}

impl ResourceConfig {
    /// Whether no limit is requested at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory_limit.is_empty() && self.cpu_share.is_empty() && self.cpu_set.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContainerRecord {
        ContainerRecord::running(
            "0123456789",
            "web",
            4242,
            &["top".to_string(), "-b".to_string()],
            "/data:/data",
            vec!["8080:80".to_string()],
        )
    }

    #[test]
    fn running_record_fields() {
        let record = sample();
        assert_eq!(record.pid, "4242");
        assert_eq!(record.command, "top -b");
        assert_eq!(record.status, ContainerStatus::Running);
        assert_eq!(record.create_time.len(), 19);
        assert_eq!(record.pid_number().unwrap(), 4242);
    }

    #[test]
    fn json_layout() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["createTime"].as_str().unwrap().len(), 19);
        assert_eq!(json["portMapping"][0], "8080:80");
        assert!(json.get("network").is_none());
        assert!(json.get("ipAddress").is_none());
    }

    #[test]
    fn stop_clears_pid() {
        let mut record = sample();
        record.mark_stopped();
        assert_eq!(record.status, ContainerStatus::Stopped);
        assert!(record.pid.is_empty());
        assert!(matches!(
            record.pid_number(),
            Err(HuskError::InvalidPid { .. })
        ));
    }

    #[test]
    fn removable_statuses() {
        assert!(!ContainerStatus::Running.can_remove());
        assert!(ContainerStatus::Stopped.can_remove());
        assert!(ContainerStatus::Exited.can_remove());
    }

    #[test]
    fn resource_config_empty() {
        assert!(ResourceConfig::default().is_empty());
        let res = ResourceConfig {
            cpu_set: "0".into(),
            ..Default::default()
        };
        assert!(!res.is_empty());
    }
}
