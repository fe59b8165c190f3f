#![allow(unsafe_code)]
//! Mount operations.

use std::ffi::CString;
use std::path::Path;

use husk_common::{HuskError, HuskResult};

/// Mount options.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountOptions {
    /// No exec.
    pub noexec: bool,
    /// No suid.
    pub nosuid: bool,
    /// No dev.
    pub nodev: bool,
    /// Strict atime updates.
    pub strictatime: bool,
}

impl MountOptions {
    /// Create options for /proc mount.
    #[must_use]
    pub const fn proc() -> Self {
        Self {
            noexec: true,
            nosuid: true,
            nodev: true,
            strictatime: false,
        }
    }

    /// Create options for the /dev tmpfs.
    #[must_use]
    pub const fn dev() -> Self {
        Self {
            noexec: false,
            nosuid: true,
            nodev: false,
            strictatime: true,
        }
    }

    fn flags(self) -> libc::c_ulong {
        let mut flags = 0;
        if self.noexec {
            flags |= libc::MS_NOEXEC;
        }
        if self.nosuid {
            flags |= libc::MS_NOSUID;
        }
        if self.nodev {
            flags |= libc::MS_NODEV;
        }
        if self.strictatime {
            flags |= libc::MS_STRICTATIME;
        }
        flags
    }
}

fn c_string(value: &str) -> HuskResult<CString> {
    CString::new(value).map_err(|_| HuskError::Internal {
        message: format!("mount argument contains a NUL byte: {value:?}"),
    })
}

fn c_path(path: &Path) -> HuskResult<CString> {
    c_string(&path.to_string_lossy())
}

fn raw_mount(
    source: &str,
    target: &Path,
    fstype: Option<&str>,
    flags: libc::c_ulong,
    data: Option<&str>,
) -> HuskResult<()> {
    let source_c = c_string(source)?;
    let target_c = c_path(target)?;
    let fstype_c = fstype.map(c_string).transpose()?;
    let data_c = data.map(c_string).transpose()?;

    // SAFETY: every pointer is either null or a NUL-terminated string that
    // outlives the call.
    let ret = unsafe {
        libc::mount(
            source_c.as_ptr(),
            target_c.as_ptr(),
            fstype_c.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
            flags,
            data_c
                .as_ref()
                .map_or(std::ptr::null(), |s| s.as_ptr().cast::<libc::c_void>()),
        )
    };
    if ret != 0 {
        return Err(HuskError::Mount {
            target: target.display().to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Mount a filesystem.
pub fn mount(
    source: &str,
    target: &Path,
    fstype: &str,
    options: MountOptions,
    data: Option<&str>,
) -> HuskResult<()> {
    tracing::debug!(source, target = %target.display(), fstype, ?options, "Mounting filesystem");
    raw_mount(source, target, Some(fstype), options.flags(), data)
}

/// Bind mount `source` onto `target`.
pub fn bind_mount(source: &Path, target: &Path) -> HuskResult<()> {
    tracing::debug!(source = %source.display(), target = %target.display(), "Creating bind mount");
    raw_mount(
        &source.to_string_lossy(),
        target,
        None,
        libc::MS_BIND | libc::MS_REC,
        None,
    )
}

/// Make `target` and everything below it private.
pub fn make_rprivate(target: &Path) -> HuskResult<()> {
    tracing::debug!(target = %target.display(), "Making mount tree private");
    raw_mount("none", target, None, libc::MS_PRIVATE | libc::MS_REC, None)
}

/// Unmount a filesystem. With `detach` the unmount is lazy.
pub fn unmount(target: &Path, detach: bool) -> HuskResult<()> {
    tracing::debug!(target = %target.display(), detach, "Unmounting filesystem");

    let target_c = c_path(target)?;
    let flags = if detach { libc::MNT_DETACH } else { 0 };
    // SAFETY: `target_c` is NUL-terminated and outlives the call.
    if unsafe { libc::umount2(target_c.as_ptr(), flags) } != 0 {
        return Err(HuskError::Mount {
            target: target.display().to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_flags() {
        let proc_flags = MountOptions::proc().flags();
        assert_eq!(
            proc_flags,
            libc::MS_NOEXEC | libc::MS_NOSUID | libc::MS_NODEV
        );
        assert_eq!(
            MountOptions::dev().flags(),
            libc::MS_NOSUID | libc::MS_STRICTATIME
        );
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let err = mount("a\0b", Path::new("/tmp"), "tmpfs", MountOptions::default(), None);
        assert!(matches!(err, Err(HuskError::Internal { .. })));
    }

    #[test]
    fn unmount_of_plain_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            unmount(dir.path(), false),
            Err(HuskError::Mount { .. })
        ));
    }
}
