//! Network namespace switching.
//!
//! `setns(CLONE_NEWNET)` only affects the calling thread. Every switch runs on
//! a dedicated OS thread that enters the target namespace, runs the closure
//! and restores its original namespace on the way out. A process-wide mutex
//! keeps switch sections from overlapping.

#![allow(unsafe_code)]

use std::fs::File;
use std::os::fd::AsRawFd;

use husk_common::{HuskError, HuskResult};
use parking_lot::Mutex;

static SWITCH_LOCK: Mutex<()> = parking_lot::const_mutex(());

fn namespace_error(source: std::io::Error) -> HuskError {
    HuskError::Namespace {
        kind: "net".to_string(),
        source,
    }
}

fn enter(ns: &File) -> HuskResult<()> {
    // SAFETY: `ns` is an open namespace file descriptor for the duration of the call.
    if unsafe { libc::setns(ns.as_raw_fd(), libc::CLONE_NEWNET) } != 0 {
        return Err(namespace_error(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Puts the thread back into its original namespace when dropped.
struct RestoreGuard {
    origin: File,
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Err(e) = enter(&self.origin) {
            tracing::warn!(error = %e, "Failed to restore original network namespace");
        }
    }
}

/// Run `f` inside the network namespace of `pid`.
///
/// Child processes spawned by `f` inherit the target namespace.
pub fn with_netns<F, R>(pid: i32, f: F) -> HuskResult<R>
where
    F: FnOnce() -> HuskResult<R> + Send,
    R: Send,
{
    let _lock = SWITCH_LOCK.lock();
    tracing::debug!(pid, "Entering network namespace");

    std::thread::scope(|scope| {
        scope
            .spawn(move || {
                let origin = File::open("/proc/thread-self/ns/net").map_err(namespace_error)?;
                let target = File::open(format!("/proc/{pid}/ns/net")).map_err(namespace_error)?;

                enter(&target)?;
                let _restore = RestoreGuard { origin };
                f()
            })
            .join()
            .map_err(|_| HuskError::Internal {
                message: "network namespace worker panicked".to_string(),
            })?
    })
}
