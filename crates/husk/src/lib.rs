//! # Husk Container Runtime
//!
//! Husk runs commands in isolated Linux containers:
//!
//! - **Namespaces**: every container gets its own UTS, PID, mount, network
//!   and IPC namespaces
//! - **Cgroups**: memory, CPU share and cpuset limits on v1 or v2
//! - **Layered root**: an overlay of a per-container writable layer on an
//!   extracted image, with an optional bind-mounted volume
//! - **Networking**: bridge networks with IPAM and NAT port mapping, provided
//!   by `husk-network`
//!
//! ## Usage
//!
//! ```no_run
//! use husk::runtime::{ContainerManager, RunConfig, RuntimeConfig};
//!
//! # fn example() -> husk_common::HuskResult<()> {
//! let manager = ContainerManager::new(RuntimeConfig::default());
//! let config = RunConfig::new("busybox", vec!["top".into()]).with_name("web");
//!
//! let (process, record) = manager.new_container(true, &config)?;
//! let exit_code = process.wait()?;
//! manager.teardown(&record)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cgroup;
pub mod cli;
pub mod exec;
pub mod filesystem;
pub mod runtime;

pub use runtime::ContainerManager;
