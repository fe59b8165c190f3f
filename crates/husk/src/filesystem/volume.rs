//! Host directory volumes.

use std::path::{Component, Path, PathBuf};

use husk_common::HuskResult;

use super::mounts;

/// A `host:container` volume specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Directory on the host.
    pub host: PathBuf,
    /// Path inside the container, relative to its root.
    pub container: PathBuf,
}

impl VolumeSpec {
    /// Parse a `host:container` spec.
    ///
    /// Returns `None` for an empty spec and for malformed ones, which are
    /// logged.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        if spec.is_empty() {
            return None;
        }

        let parts: Vec<&str> = spec.split(':').collect();
        let parsed = match parts.as_slice() {
            [host, container] if !host.is_empty() && !container.is_empty() => {
                let container: PathBuf = Path::new(container)
                    .components()
                    .filter(|c| matches!(c, Component::Normal(_)))
                    .collect();
                (!container.as_os_str().is_empty()).then(|| Self {
                    host: PathBuf::from(host),
                    container,
                })
            }
            _ => None,
        };

        if parsed.is_none() {
            tracing::error!(volume = spec, "Malformed volume, expected host:container");
        }
        parsed
    }

    /// Where the volume lands inside the mount point `root`.
    #[must_use]
    pub fn target(&self, root: &Path) -> PathBuf {
        root.join(&self.container)
    }

    /// Create both directories and bind the host one into `root`.
    pub fn mount(&self, root: &Path) -> HuskResult<()> {
        let target = self.target(root);
        std::fs::create_dir_all(&self.host)?;
        std::fs::create_dir_all(&target)?;
        mounts::bind_mount(&self.host, &target)?;

        tracing::info!(host = %self.host.display(), target = %target.display(), "Volume mounted");
        Ok(())
    }

    /// Unmount the volume from `root`.
    pub fn unmount(&self, root: &Path) -> HuskResult<()> {
        mounts::unmount(&self.target(root), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid() {
        let spec = VolumeSpec::parse("/data:/var/data").unwrap();
        assert_eq!(spec.host, PathBuf::from("/data"));
        assert_eq!(spec.container, PathBuf::from("var/data"));
        assert_eq!(spec.target(Path::new("/mnt/web")), PathBuf::from("/mnt/web/var/data"));
    }

    #[test_log::test]
    fn parse_malformed() {
        assert_eq!(VolumeSpec::parse(""), None);
        assert_eq!(VolumeSpec::parse("/data"), None);
        assert_eq!(VolumeSpec::parse(":/data"), None);
        assert_eq!(VolumeSpec::parse("/data:"), None);
        assert_eq!(VolumeSpec::parse("/a:/b:/c"), None);
        assert_eq!(VolumeSpec::parse("/data:/"), None);
    }

    #[test]
    fn container_path_cannot_escape() {
        let spec = VolumeSpec::parse("/data:../../etc").unwrap();
        assert_eq!(spec.container, PathBuf::from("etc"));
    }
}
