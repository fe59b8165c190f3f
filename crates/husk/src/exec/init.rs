//! Container init process.
//!
//! Runs inside the freshly cloned namespaces. It waits for the parent to
//! send the command over the inherited pipe, switches to the container root
//! and replaces itself with the command.

#![allow(unsafe_code)]

use std::fs::File;
use std::io::Read;
use std::os::fd::FromRawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;

use husk_common::{HuskError, HuskResult};

use crate::filesystem;
use crate::runtime::INIT_PIPE_FD;

/// Read the space-joined command line until EOF.
pub fn read_command(mut pipe: impl Read) -> HuskResult<Vec<String>> {
    let mut message = String::new();
    pipe.read_to_string(&mut message)?;

    let command: Vec<String> = message
        .split(' ')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    if command.is_empty() {
        return Err(HuskError::config("init received an empty command"));
    }
    Ok(command)
}

/// Run as container init.
///
/// Only returns if something went wrong; on success the process image is
/// replaced by the container command.
pub fn container_init() -> HuskResult<()> {
    // SAFETY: fd 3 is the pipe handed over by the parent and nothing else in
    // this process owns it.
    let pipe = unsafe { File::from_raw_fd(INIT_PIPE_FD) };
    let command = read_command(pipe)?;
    tracing::debug!(command = ?command, "Container init received command");

    filesystem::setup_rootfs()?;

    let err = Command::new(&command[0]).args(&command[1..]).exec();
    Err(HuskError::command(command[0].clone(), err.to_string()))
}
