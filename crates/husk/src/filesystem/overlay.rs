//! OverlayFS setup for container rootfs.

use std::path::PathBuf;

use husk_common::{HuskPaths, HuskResult};

use super::mounts::{self, MountOptions};

/// OverlayFS configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFs {
    /// Lower directory (the read-only image layer).
    pub lower_dir: PathBuf,
    /// Upper directory (writable layer).
    pub upper_dir: PathBuf,
    /// Work directory (required by overlayfs).
    pub work_dir: PathBuf,
    /// Merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayFs {
    /// Overlay for container `name` running `image`.
    #[must_use]
    pub fn for_container(paths: &HuskPaths, name: &str, image: &str) -> Self {
        Self {
            lower_dir: paths.image_layer(image),
            upper_dir: paths.write_layer_diff(name),
            work_dir: paths.write_layer_work(name),
            merged_dir: paths.mount_point(name),
        }
    }

    /// Create the upper, work and merged directories.
    pub fn create_dirs(&self) -> HuskResult<()> {
        std::fs::create_dir_all(&self.upper_dir)?;
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(&self.merged_dir)?;
        Ok(())
    }

    /// Mount the overlay filesystem.
    pub fn mount(&self) -> HuskResult<()> {
        self.create_dirs()?;

        let options = self.mount_options();
        mounts::mount(
            "overlay",
            &self.merged_dir,
            "overlay",
            MountOptions::default(),
            Some(&options),
        )?;

        tracing::info!(merged = %self.merged_dir.display(), "OverlayFS mounted");
        Ok(())
    }

    /// Get the mount options string.
    #[must_use]
    pub fn mount_options(&self) -> String {
        format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower_dir.display(),
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }
}
