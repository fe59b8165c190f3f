//! Thin wrappers around the `ip` and `iptables` tools.

use std::process::Command;

use husk_common::{HuskError, HuskResult};

/// Run `program` with `args` and fail unless it exits successfully.
pub(crate) fn run<S: AsRef<str>>(program: &str, args: &[S]) -> HuskResult<()> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    tracing::trace!(program, ?args, "Running command");

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| HuskError::command(program, format!("failed to execute: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HuskError::command(
            program,
            format!("`{}` exited with {}: {}", args.join(" "), output.status, stderr.trim()),
        ));
    }

    Ok(())
}

/// Run `ip` with the given arguments.
pub(crate) fn ip<S: AsRef<str>>(args: &[S]) -> HuskResult<()> {
    run("ip", args)
}

/// Run `iptables` with the given arguments.
pub(crate) fn iptables<S: AsRef<str>>(args: &[S]) -> HuskResult<()> {
    run("iptables", args)
}

/// Whether a link with this name exists in the current network namespace.
pub(crate) fn link_exists(name: &str) -> bool {
    Command::new("ip")
        .args(["link", "show", name])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_command_error() {
        let err = run("husk-no-such-program", &["x"]).unwrap_err();
        assert!(matches!(err, HuskError::Command { .. }));
    }

    #[test]
    fn failing_program_reports_status() {
        let err = run("false", &[] as &[&str]).unwrap_err();
        assert!(err.to_string().starts_with("false failed"));
    }

    #[test]
    fn nonexistent_link() {
        assert!(!link_exists("husk_no_link_0"));
    }
}
