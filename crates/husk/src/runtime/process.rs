#![allow(unsafe_code)]
//! Spawning the container init process.
//!
//! The runtime re-executes its own binary with the `init` verb inside fresh
//! UTS, PID, mount, network and IPC namespaces. `clone(2)` is used directly
//! because the new PID namespace has to be requested at creation time. The
//! command to run is handed over through a pipe whose read end becomes fd 3
//! in the child; the message ends at EOF.

use std::ffi::CString;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use husk_common::{HuskError, HuskResult};
use rustix::pipe::{PipeFlags, pipe_with};

/// Descriptor the init process reads its command from.
pub const INIT_PIPE_FD: RawFd = 3;

/// Stack size for the cloned child. It only runs until `execve`.
const STACK_SIZE: usize = 1024 * 1024;

/// What the init process needs before it starts.
#[derive(Debug)]
pub struct SpawnConfig<'a> {
    /// Working directory of the child, the container's mount point.
    pub cwd: &'a Path,
    /// Extra `KEY=VALUE` environment entries.
    pub env: &'a [String],
    /// When set, stdout and stderr go here instead of the caller's streams.
    pub log: Option<File>,
}

/// Everything the child touches between `clone` and `execve`, prepared up
/// front so the child only makes raw syscalls.
struct ChildArgs {
    exe: CString,
    argv: Vec<*const libc::c_char>,
    envp: Vec<*const libc::c_char>,
    cwd: CString,
    pipe_fd: RawFd,
    stdin_fd: Option<RawFd>,
    output_fd: Option<RawFd>,
}

extern "C" fn child_main(arg: *mut libc::c_void) -> libc::c_int {
    // SAFETY: `arg` points at the parent's `ChildArgs`, copied into this
    // process by clone and alive until execve or _exit.
    unsafe {
        let args = &*arg.cast::<ChildArgs>();

        if let Some(fd) = args.stdin_fd {
            libc::dup2(fd, 0);
        }
        if let Some(fd) = args.output_fd {
            libc::dup2(fd, 1);
            libc::dup2(fd, 2);
        }

        let handed_over = if args.pipe_fd == INIT_PIPE_FD {
            libc::fcntl(INIT_PIPE_FD, libc::F_SETFD, 0)
        } else {
            libc::dup2(args.pipe_fd, INIT_PIPE_FD)
        };
        if handed_over < 0 || libc::chdir(args.cwd.as_ptr()) != 0 {
            libc::_exit(126);
        }

        libc::execve(args.exe.as_ptr(), args.argv.as_ptr(), args.envp.as_ptr());
        libc::_exit(127)
    }
}

fn c_string(bytes: &[u8]) -> HuskResult<CString> {
    CString::new(bytes).map_err(|_| HuskError::Internal {
        message: format!("argument contains a NUL byte: {}", String::from_utf8_lossy(bytes)),
    })
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// The environment of the child: ours plus the container's extra entries.
fn child_environment(extra: &[String]) -> HuskResult<Vec<CString>> {
    let mut env = Vec::new();
    for (key, value) in std::env::vars_os() {
        let mut entry = key.as_bytes().to_vec();
        entry.push(b'=');
        entry.extend_from_slice(value.as_bytes());
        env.push(c_string(&entry)?);
    }
    for entry in extra {
        env.push(c_string(entry.as_bytes())?);
    }
    Ok(env)
}

/// The write end of the command pipe.
#[derive(Debug)]
pub struct CommandPipe {
    writer: File,
}

impl CommandPipe {
    /// Send the command line and close the pipe.
    pub fn send(mut self, commands: &[String]) -> HuskResult<()> {
        let message = commands.join(" ");
        tracing::debug!(command = %message, "Sending command to init");
        self.writer.write_all(message.as_bytes())?;
        Ok(())
    }
}

/// A started container init process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerProcess {
    pid: i32,
}

impl ContainerProcess {
    /// Wrap an existing pid.
    #[must_use]
    pub const fn from_pid(pid: i32) -> Self {
        Self { pid }
    }

    /// Host pid of the process.
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    /// Wait for the process to exit and return its exit code.
    ///
    /// A process killed by a signal reports `128 + signal`.
    pub fn wait(&self) -> HuskResult<i32> {
        let mut status: libc::c_int = 0;
        loop {
            // SAFETY: `status` is a valid out pointer.
            let ret = unsafe { libc::waitpid(self.pid, &raw mut status, 0) };
            if ret == self.pid {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(HuskError::Io(err));
            }
        }

        let code = if libc::WIFEXITED(status) {
            libc::WEXITSTATUS(status)
        } else if libc::WIFSIGNALED(status) {
            128 + libc::WTERMSIG(status)
        } else {
            1
        };
        tracing::debug!(pid = self.pid, code, "Container process exited");
        Ok(code)
    }
}

/// Whether a process with this pid exists.
#[must_use]
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks for existence and permission.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Send `signal` to `pid`.
pub fn send_signal(pid: i32, signal: libc::c_int) -> HuskResult<()> {
    // SAFETY: kill has no memory safety preconditions.
    if unsafe { libc::kill(pid, signal) } != 0 {
        return Err(HuskError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Clone the init process.
///
/// Returns the process and the pipe the command must be written to once the
/// caller has finished setting the container up.
pub fn spawn_init(config: SpawnConfig<'_>) -> HuskResult<(ContainerProcess, CommandPipe)> {
    let exe = std::env::current_exe()?;
    let exe = c_string(exe.as_os_str().as_bytes())?;
    let argv_strings = [exe.clone(), c_string(b"init")?];
    let env_strings = child_environment(config.env)?;
    let cwd = c_string(config.cwd.as_os_str().as_bytes())?;

    let (reader, writer): (OwnedFd, OwnedFd) = pipe_with(PipeFlags::CLOEXEC).map_err(|e| {
        HuskError::Internal {
            message: format!("failed to create pipe: {e}"),
        }
    })?;

    let stdin = match config.log {
        Some(_) => Some(File::open("/dev/null")?),
        None => None,
    };

    let mut args = ChildArgs {
        argv: null_terminated(&argv_strings),
        envp: null_terminated(&env_strings),
        exe,
        cwd,
        pipe_fd: reader.as_raw_fd(),
        stdin_fd: stdin.as_ref().map(AsRawFd::as_raw_fd),
        output_fd: config.log.as_ref().map(AsRawFd::as_raw_fd),
    };

    let mut stack = vec![0u8; STACK_SIZE];
    // SAFETY: the stack grows down from the end of a live allocation; the
    // child gets its own copy of it (no CLONE_VM).
    let stack_top = unsafe { stack.as_mut_ptr().add(STACK_SIZE) };
    let stack_top = ((stack_top as usize) & !15) as *mut libc::c_void;

    let flags = libc::CLONE_NEWUTS
        | libc::CLONE_NEWPID
        | libc::CLONE_NEWNS
        | libc::CLONE_NEWNET
        | libc::CLONE_NEWIPC
        | libc::SIGCHLD;

    // SAFETY: `child_main` only reads `args` and makes async-signal-safe
    // calls before execve.
    let pid = unsafe {
        libc::clone(
            child_main,
            stack_top,
            flags,
            (&raw mut args).cast::<libc::c_void>(),
        )
    };
    if pid < 0 {
        let err = std::io::Error::last_os_error();
        return Err(if err.raw_os_error() == Some(libc::EPERM) {
            HuskError::PermissionDenied {
                operation: "create container namespaces".to_string(),
            }
        } else {
            HuskError::Io(err)
        });
    }

    drop(reader);
    tracing::info!(pid, cwd = %config.cwd.display(), "Started container init");

    Ok((
        ContainerProcess { pid },
        CommandPipe {
            writer: File::from(writer),
        },
    ))
}
