//! Cgroup resource control.
//!
//! A container gets one cgroup per subsystem (memory, cpu, cpuset). On a v1
//! host every subsystem has its own hierarchy, found through
//! `/proc/self/mountinfo`. On a v2 host the subsystems share one directory
//! under the unified hierarchy and use the v2 file names.

mod manager;
pub mod v1;

pub use manager::{CgroupLayout, CgroupManager};

use husk_common::{HuskError, HuskResult, ResourceConfig};

/// Root of the unified hierarchy.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Cgroup version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// Cgroups v1 (legacy).
    V1,
    /// Cgroups v2 (unified).
    V2,
}

impl CgroupVersion {
    /// Detect the cgroup version on the system.
    #[must_use]
    pub fn detect() -> Self {
        if std::path::Path::new(CGROUP_ROOT)
            .join("cgroup.controllers")
            .exists()
        {
            Self::V2
        } else {
            Self::V1
        }
    }

    /// File a pid is written to when joining a cgroup.
    #[must_use]
    pub const fn task_file(self) -> &'static str {
        match self {
            Self::V1 => "tasks",
            Self::V2 => "cgroup.procs",
        }
    }
}

/// A resource subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Memory limit.
    Memory,
    /// CPU share.
    Cpu,
    /// CPU set.
    Cpuset,
}

impl Subsystem {
    /// Every subsystem, in the order they are applied.
    pub const ALL: [Self; 3] = [Self::Memory, Self::Cpu, Self::Cpuset];

    /// Controller name as it appears in mount options.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Cpu => "cpu",
            Self::Cpuset => "cpuset",
        }
    }

    /// File holding this subsystem's limit.
    #[must_use]
    pub const fn limit_file(self, version: CgroupVersion) -> &'static str {
        match (self, version) {
            (Self::Memory, CgroupVersion::V1) => "memory.limit_in_bytes",
            (Self::Memory, CgroupVersion::V2) => "memory.max",
            (Self::Cpu, CgroupVersion::V1) => "cpu.shares",
            (Self::Cpu, CgroupVersion::V2) => "cpu.weight",
            (Self::Cpuset, _) => "cpuset.cpus",
        }
    }

    /// The value to write for `res`, or `None` when no limit is requested.
    pub fn limit_value(self, res: &ResourceConfig, version: CgroupVersion) -> HuskResult<Option<String>> {
        let raw = match self {
            Self::Memory => &res.memory_limit,
            Self::Cpu => &res.cpu_share,
            Self::Cpuset => &res.cpu_set,
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        match (self, version) {
            (Self::Cpu, CgroupVersion::V2) => shares_to_weight(raw).map(|w| Some(w.to_string())),
            _ => Ok(Some(raw.to_string())),
        }
    }
}

/// Convert v1 `cpu.shares` to v2 `cpu.weight`.
///
/// Shares range over `[2, 262144]`, weights over `[1, 10000]`.
pub fn shares_to_weight(shares: &str) -> HuskResult<u64> {
    let shares: u64 = shares
        .parse()
        .map_err(|_| HuskError::config(format!("cpu share '{shares}' is not a number")))?;
    let shares = shares.clamp(2, 262_144);
    Ok(1 + ((shares - 2) * 9999) / 262_142)
}
