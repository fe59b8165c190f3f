//! Standard filesystem paths for husk.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Default root directory for husk data.
pub static HUSK_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("HUSK_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/husk"))
});

/// Default runtime directory for husk.
pub static HUSK_RUNTIME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("HUSK_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/run/husk"))
});

/// Name of the container record file.
pub const CONFIG_NAME: &str = "config.json";

/// Name of the detached container log file.
pub const LOG_NAME: &str = "container.log";

/// Standard paths used by the husk runtime.
#[derive(Debug, Clone)]
pub struct HuskPaths {
    /// Root data directory (default: /var/lib/husk).
    pub root: PathBuf,
    /// Runtime directory (default: /run/husk).
    pub runtime: PathBuf,
}

impl HuskPaths {
    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let runtime = root.join("run");
        Self { root, runtime }
    }

    /// Directory holding every container record.
    #[must_use]
    pub fn containers(&self) -> PathBuf {
        self.runtime.join("containers")
    }

    /// Metadata directory for a specific container.
    #[must_use]
    pub fn container(&self, name: &str) -> PathBuf {
        self.containers().join(name)
    }

    /// Container record file.
    #[must_use]
    pub fn container_config(&self, name: &str) -> PathBuf {
        self.container(name).join(CONFIG_NAME)
    }

    /// Detached container log file.
    #[must_use]
    pub fn container_log(&self, name: &str) -> PathBuf {
        self.container(name).join(LOG_NAME)
    }

    /// Directory for images and their extracted layers.
    #[must_use]
    pub fn images(&self) -> PathBuf {
        self.root.join("images")
    }

    /// Image archive.
    #[must_use]
    pub fn image_archive(&self, image: &str) -> PathBuf {
        self.images().join(format!("{image}.tar"))
    }

    /// Extracted read-only layer of an image.
    #[must_use]
    pub fn image_layer(&self, image: &str) -> PathBuf {
        self.images().join(image)
    }

    /// Directory for writable layers.
    #[must_use]
    pub fn layers(&self) -> PathBuf {
        self.root.join("layers")
    }

    /// Writable layer of a container.
    #[must_use]
    pub fn write_layer(&self, name: &str) -> PathBuf {
        self.layers().join(name)
    }

    /// Upper directory (for overlay).
    #[must_use]
    pub fn write_layer_diff(&self, name: &str) -> PathBuf {
        self.write_layer(name).join("diff")
    }

    /// Work directory (for overlay).
    #[must_use]
    pub fn write_layer_work(&self, name: &str) -> PathBuf {
        self.write_layer(name).join("work")
    }

    /// Directory for container mount points.
    #[must_use]
    pub fn mounts(&self) -> PathBuf {
        self.root.join("mnt")
    }

    /// Mount point (merged root) of a container.
    #[must_use]
    pub fn mount_point(&self, name: &str) -> PathBuf {
        self.mounts().join(name)
    }

    /// Network state directory.
    #[must_use]
    pub fn network(&self) -> PathBuf {
        self.runtime.join("network")
    }

    /// Directory with one record file per network.
    #[must_use]
    pub fn networks(&self) -> PathBuf {
        self.network().join("networks")
    }

    /// IPAM allocation table.
    #[must_use]
    pub fn ipam_table(&self) -> PathBuf {
        self.network().join("ipam").join("subnet.json")
    }

    /// Create all necessary directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.runtime)?;
        std::fs::create_dir_all(self.containers())?;
        std::fs::create_dir_all(self.images())?;
        std::fs::create_dir_all(self.layers())?;
        std::fs::create_dir_all(self.mounts())?;
        std::fs::create_dir_all(self.networks())?;
        Ok(())
    }
}

impl Default for HuskPaths {
    fn default() -> Self {
        Self {
            root: HUSK_ROOT.clone(),
            runtime: HUSK_RUNTIME_DIR.clone(),
        }
    }
}
