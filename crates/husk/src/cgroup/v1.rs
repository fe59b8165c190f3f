//! Cgroup v1 hierarchy discovery.

use std::path::PathBuf;

use super::Subsystem;

/// Find the mount point of the v1 hierarchy carrying `subsystem` in a
/// `/proc/self/mountinfo` listing.
///
/// A line looks like
/// `34 25 0:29 / /sys/fs/cgroup/memory rw,nosuid - cgroup cgroup rw,memory`;
/// the mount point is the fifth field and the controllers are the super
/// options after the ` - ` separator.
#[must_use]
pub fn find_mountpoint(mountinfo: &str, subsystem: Subsystem) -> Option<PathBuf> {
    mountinfo.lines().find_map(|line| {
        let (mount, fs) = line.split_once(" - ")?;
        let mut fs_fields = fs.split_whitespace();
        if fs_fields.next()? != "cgroup" {
            return None;
        }
        let super_options = fs_fields.nth(1)?;
        if !super_options.split(',').any(|opt| opt == subsystem.name()) {
            return None;
        }
        mount.split_whitespace().nth(4).map(PathBuf::from)
    })
}

/// Like [`find_mountpoint`], reading the live mountinfo.
#[must_use]
pub fn discover(subsystem: Subsystem) -> Option<PathBuf> {
    match std::fs::read_to_string("/proc/self/mountinfo") {
        Ok(mountinfo) => find_mountpoint(&mountinfo, subsystem),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read mountinfo");
            None
        }
    }
}
