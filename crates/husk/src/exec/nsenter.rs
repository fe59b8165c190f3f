#![allow(unsafe_code)]
//! Namespace re-entry for `husk exec`.
//!
//! Joining a mount namespace only works while the process has a single
//! thread, so this runs as the first statement of `main`, before any
//! subscriber, error hook or argument parsing is set up. The parent passes
//! the target through [`ENV_EXEC_PID`] and [`ENV_EXEC_CMD`].

use std::fs::File;
use std::os::fd::AsRawFd;
use std::process::Command;

/// Pid of the container to enter.
pub const ENV_EXEC_PID: &str = "HUSK_EXEC_PID";

/// Command to run once inside.
pub const ENV_EXEC_CMD: &str = "HUSK_EXEC_CMD";

/// Namespaces joined, in order. The mount namespace goes last because it
/// hides the host's `/proc`.
pub const NAMESPACES: [(&str, libc::c_int); 5] = [
    ("ipc", libc::CLONE_NEWIPC),
    ("uts", libc::CLONE_NEWUTS),
    ("net", libc::CLONE_NEWNET),
    ("pid", libc::CLONE_NEWPID),
    ("mnt", libc::CLONE_NEWNS),
];

/// If this process was started to exec into a container, do it and return
/// the exit code the process should terminate with.
#[must_use]
pub fn enter_if_requested() -> Option<i32> {
    let pid = std::env::var(ENV_EXEC_PID).ok().filter(|p| !p.is_empty())?;
    let command = std::env::var(ENV_EXEC_CMD).ok().filter(|c| !c.is_empty())?;

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter("husk=warn")
        .try_init();

    Some(enter_and_run(&pid, &command))
}

fn enter_and_run(pid: &str, command: &str) -> i32 {
    for (kind, flag) in NAMESPACES {
        if let Err(e) = join(pid, kind, flag) {
            tracing::error!(pid, namespace = kind, error = %e, "Failed to join namespace");
        }
    }

    match Command::new("/bin/sh").arg("-c").arg(command).status() {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            tracing::error!(command, error = %e, "Failed to run command in container");
            127
        }
    }
}

fn join(pid: &str, kind: &str, flag: libc::c_int) -> std::io::Result<()> {
    let file = File::open(format!("/proc/{pid}/ns/{kind}"))?;
    // SAFETY: the descriptor is open for the duration of the call.
    if unsafe { libc::setns(file.as_raw_fd(), flag) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
