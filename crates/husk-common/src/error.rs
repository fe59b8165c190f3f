//! Common error types for husk.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`HuskError`].
pub type HuskResult<T> = Result<T, HuskError>;

/// Common errors across husk.
#[derive(Error, Diagnostic, Debug)]
pub enum HuskError {
    /// Container not found.
    #[error("Container not found: {name}")]
    #[diagnostic(code(husk::container::not_found))]
    ContainerNotFound {
        /// The container name that was looked up.
        name: String,
    },

    /// Network not found.
    #[error("Network not found: {name}")]
    #[diagnostic(code(husk::network::not_found))]
    NetworkNotFound {
        /// The network name that was looked up.
        name: String,
    },

    /// Invalid container name.
    #[error("Invalid container name: {name}")]
    #[diagnostic(
        code(husk::container::invalid_name),
        help("Container names must be alphanumeric with hyphens and underscores, 1-64 characters")
    )]
    InvalidContainerName {
        /// The rejected name.
        name: String,
    },

    /// Invalid image name.
    #[error("Invalid image name: {name}")]
    #[diagnostic(
        code(husk::image::invalid_name),
        help("Image names are file names under the image store: alphanumeric, '.', '-' or '_', not starting with '.'")
    )]
    InvalidImageName {
        /// The rejected name.
        name: String,
    },

    /// A pid field could not be interpreted as a process id.
    #[error("Invalid pid '{pid}' for container {name}")]
    #[diagnostic(code(husk::container::invalid_pid))]
    InvalidPid {
        /// Container name.
        name: String,
        /// The raw pid value.
        pid: String,
    },

    /// Invalid subnet specification.
    #[error("Invalid subnet: {value}")]
    #[diagnostic(
        code(husk::network::invalid_subnet),
        help("Use an IPv4 CIDR block such as 10.0.0.0/24 with a prefix between /16 and /30")
    )]
    InvalidSubnet {
        /// The rejected value.
        value: String,
    },

    /// Every usable address of a subnet is allocated.
    #[error("No free address left in subnet {subnet}")]
    #[diagnostic(code(husk::ipam::exhausted))]
    SubnetExhausted {
        /// The exhausted subnet.
        subnet: String,
    },

    /// Address does not belong to the given subnet.
    #[error("Address {address} is outside subnet {subnet}")]
    #[diagnostic(code(husk::ipam::out_of_range))]
    AddressOutOfRange {
        /// The offending address.
        address: String,
        /// The subnet it was checked against.
        subnet: String,
    },

    /// An external tool (ip, iptables, ...) could not be run or failed.
    #[error("{program} failed: {detail}")]
    #[diagnostic(code(husk::command))]
    Command {
        /// Program name.
        program: String,
        /// What went wrong.
        detail: String,
    },

    /// Joining or switching a namespace failed.
    #[error("Namespace operation on {kind} failed: {source}")]
    #[diagnostic(code(husk::namespace))]
    Namespace {
        /// Namespace kind (net, mnt, ...).
        kind: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A mount or unmount failed.
    #[error("Mount operation on {target} failed: {source}")]
    #[diagnostic(code(husk::mount))]
    Mount {
        /// Mount target.
        target: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(husk::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(husk::serialization))]
    Serialization(String),

    /// Permission denied.
    #[error("Permission denied: {operation}")]
    #[diagnostic(
        code(husk::permission_denied),
        help("Try running with elevated privileges (sudo)")
    )]
    PermissionDenied {
        /// The operation that was denied.
        operation: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(husk::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(husk::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl HuskError {
    /// Shorthand for a [`HuskError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Shorthand for a [`HuskError::Command`].
    pub fn command(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            detail: detail.into(),
        }
    }

    /// Returns true for the "not found" lookup errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ContainerNotFound { .. } | Self::NetworkNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for HuskError {
    fn from(err: serde_json::Error) -> Self {
        HuskError::Serialization(err.to_string())
    }
}
