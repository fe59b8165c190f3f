//! Root filesystem setup, run by the init process inside its new namespaces.

use std::path::Path;

use husk_common::HuskResult;

use super::mounts::{self, MountOptions};
use super::pivot;

/// Turn the current working directory into the container root.
///
/// The mount tree is made private first so none of this propagates back to
/// the host. Afterwards `/proc` shows the container's own pid namespace and
/// `/dev` is a fresh tmpfs.
pub fn setup_rootfs() -> HuskResult<()> {
    let root = std::env::current_dir()?;
    tracing::debug!(rootfs = %root.display(), "Setting up root filesystem");

    mounts::make_rprivate(Path::new("/"))?;
    pivot::switch_root(&root)?;

    let proc_dir = Path::new("/proc");
    std::fs::create_dir_all(proc_dir)?;
    mounts::mount("proc", proc_dir, "proc", MountOptions::proc(), None)?;

    let dev_dir = Path::new("/dev");
    std::fs::create_dir_all(dev_dir)?;
    mounts::mount("tmpfs", dev_dir, "tmpfs", MountOptions::dev(), Some("mode=755"))?;

    Ok(())
}
