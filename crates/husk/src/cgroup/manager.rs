//! Cgroup manager implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use husk_common::{HuskError, HuskResult, ResourceConfig};

use super::{CGROUP_ROOT, CgroupVersion, Subsystem, v1};

/// Where each subsystem's hierarchy lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupLayout {
    /// One hierarchy per subsystem. Missing entries are unavailable.
    V1 {
        /// Mount point per subsystem.
        mounts: HashMap<Subsystem, PathBuf>,
    },
    /// The unified hierarchy.
    V2 {
        /// Mount point of the unified hierarchy.
        root: PathBuf,
    },
}

impl CgroupLayout {
    /// Inspect the running system.
    #[must_use]
    pub fn detect() -> Self {
        match CgroupVersion::detect() {
            CgroupVersion::V2 => Self::V2 {
                root: PathBuf::from(CGROUP_ROOT),
            },
            CgroupVersion::V1 => Self::V1 {
                mounts: Subsystem::ALL
                    .into_iter()
                    .filter_map(|sub| v1::discover(sub).map(|path| (sub, path)))
                    .collect(),
            },
        }
    }

    /// Version of this layout.
    #[must_use]
    pub const fn version(&self) -> CgroupVersion {
        match self {
            Self::V1 { .. } => CgroupVersion::V1,
            Self::V2 { .. } => CgroupVersion::V2,
        }
    }

    fn hierarchy(&self, subsystem: Subsystem) -> Option<&Path> {
        match self {
            Self::V1 { mounts } => mounts.get(&subsystem).map(PathBuf::as_path),
            Self::V2 { root } => Some(root),
        }
    }
}

fn io_error(operation: &str, path: &Path, e: std::io::Error) -> HuskError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        HuskError::PermissionDenied {
            operation: format!("{operation} {}", path.display()),
        }
    } else {
        HuskError::Io(e)
    }
}

/// Manages the cgroup of one container.
///
/// `path` is relative to each hierarchy, e.g. `husk/<container id>`.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    /// Cgroup path.
    path: PathBuf,
    layout: CgroupLayout,
}

impl CgroupManager {
    /// Manager for `path` on the running system.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_layout(path, CgroupLayout::detect())
    }

    /// Manager for `path` on an explicit layout.
    pub fn with_layout(path: impl Into<PathBuf>, layout: CgroupLayout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }

    /// Directory of this cgroup in `subsystem`'s hierarchy.
    #[must_use]
    pub fn subsystem_path(&self, subsystem: Subsystem) -> Option<PathBuf> {
        self.layout
            .hierarchy(subsystem)
            .map(|root| root.join(&self.path))
    }

    /// Create the cgroup directory for `subsystem`.
    fn ensure(&self, subsystem: Subsystem) -> HuskResult<Option<PathBuf>> {
        let Some(dir) = self.subsystem_path(subsystem) else {
            tracing::warn!(subsystem = subsystem.name(), "Cgroup subsystem not mounted");
            return Ok(None);
        };
        std::fs::create_dir_all(&dir).map_err(|e| io_error("create cgroup", &dir, e))?;

        if let CgroupLayout::V2 { root } = &self.layout {
            enable_controllers(root, &self.path);
        }
        Ok(Some(dir))
    }

    /// Write the requested limits. Empty fields are left untouched.
    ///
    /// A subsystem whose limit cannot be written is logged and skipped, like
    /// in [`Self::apply`].
    pub fn set(&self, res: &ResourceConfig) {
        for subsystem in Subsystem::ALL {
            if let Err(e) = self.set_limit(subsystem, res) {
                tracing::warn!(subsystem = subsystem.name(), error = %e, "Failed to set cgroup limit");
            }
        }
    }

    fn set_limit(&self, subsystem: Subsystem, res: &ResourceConfig) -> HuskResult<()> {
        let version = self.layout.version();
        let Some(value) = subsystem.limit_value(res, version)? else {
            return Ok(());
        };
        let Some(dir) = self.ensure(subsystem)? else {
            return Ok(());
        };

        let file = dir.join(subsystem.limit_file(version));
        std::fs::write(&file, &value).map_err(|e| io_error("write", &file, e))?;
        tracing::debug!(
            subsystem = subsystem.name(),
            file = %file.display(),
            value,
            "Set cgroup limit"
        );
        Ok(())
    }

    /// Move `pid` into the cgroup of every subsystem.
    ///
    /// A subsystem that cannot be joined is logged and skipped.
    pub fn apply(&self, pid: i32) {
        let task_file = self.layout.version().task_file();
        for subsystem in Subsystem::ALL {
            let joined = self.ensure(subsystem).and_then(|dir| match dir {
                Some(dir) => {
                    let file = dir.join(task_file);
                    std::fs::write(&file, pid.to_string()).map_err(|e| io_error("write", &file, e))
                }
                None => Ok(()),
            });
            if let Err(e) = joined {
                tracing::warn!(subsystem = subsystem.name(), pid, error = %e, "Failed to apply cgroup");
            }
        }
        tracing::debug!(path = %self.path.display(), pid, "Applied cgroup");
    }

    /// Remove the cgroup from every hierarchy, stopping at the first failure.
    pub fn destroy(&self) -> HuskResult<()> {
        for subsystem in Subsystem::ALL {
            let Some(dir) = self.subsystem_path(subsystem) else {
                continue;
            };
            if dir.exists() {
                std::fs::remove_dir(&dir).map_err(|e| io_error("remove cgroup", &dir, e))?;
                tracing::debug!(path = %dir.display(), "Deleted cgroup");
            }
        }
        Ok(())
    }
}

/// Enable the controllers for every ancestor of `path` below `root`.
///
/// Controllers a kernel does not offer are simply not enabled.
fn enable_controllers(root: &Path, path: &Path) {
    let mut dir = root.to_path_buf();
    let ancestors: Vec<_> = path.components().collect();
    for component in &ancestors[..ancestors.len().saturating_sub(1)] {
        enable_in(&dir);
        dir.push(component);
    }
    enable_in(&dir);
}

fn enable_in(dir: &Path) {
    let control = dir.join("cgroup.subtree_control");
    for subsystem in Subsystem::ALL {
        if let Err(e) = std::fs::write(&control, format!("+{}", subsystem.name())) {
            tracing::trace!(dir = %dir.display(), subsystem = subsystem.name(), error = %e, "Controller not enabled");
        }
    }
}
