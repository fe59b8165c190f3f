#![allow(unsafe_code)]
//! pivot_root implementation.

use std::ffi::CString;
use std::path::Path;

use husk_common::{HuskError, HuskResult};

use super::mounts;

/// Directory the old root is parked in during the switch.
const PUT_OLD: &str = ".pivot_root";

/// Execute pivot_root to change the root filesystem.
///
/// This replaces the old root with the new root, placing the old root
/// at put_old (relative to new_root).
pub fn pivot_root(new_root: &Path, put_old: &Path) -> HuskResult<()> {
    tracing::debug!(
        new_root = %new_root.display(),
        put_old = %put_old.display(),
        "Executing pivot_root"
    );

    let to_c = |p: &Path| {
        CString::new(p.to_string_lossy().as_bytes()).map_err(|e| HuskError::Internal {
            message: format!("Invalid path: {e}"),
        })
    };
    let new_root_c = to_c(new_root)?;
    let put_old_c = to_c(put_old)?;

    // SAFETY: both strings are NUL-terminated and outlive the call.
    let ret = unsafe { libc::syscall(libc::SYS_pivot_root, new_root_c.as_ptr(), put_old_c.as_ptr()) };
    if ret != 0 {
        return Err(HuskError::Mount {
            target: new_root.display().to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Make `root` the process root and detach the old one.
///
/// `root` is bind-mounted onto itself first because pivot_root needs the new
/// root to be a mount point on a different mount than the current root.
pub fn switch_root(root: &Path) -> HuskResult<()> {
    mounts::bind_mount(root, root)?;

    let put_old = root.join(PUT_OLD);
    std::fs::create_dir_all(&put_old)?;
    pivot_root(root, &put_old)?;
    std::env::set_current_dir("/")?;

    let old = Path::new("/").join(PUT_OLD);
    mounts::unmount(&old, true)?;
    std::fs::remove_dir(&old)?;

    tracing::debug!(root = %root.display(), "Switched root");
    Ok(())
}
