//! Container runtime core.
//!
//! [`ContainerManager`] drives the container lifecycle: it builds the
//! workspace, clones the init process, records it and wires up its cgroup
//! and network endpoint.

mod config;
mod container;
pub mod process;
mod state;

pub use config::{RunConfig, RuntimeConfig};
pub use container::{ContainerManager, cgroup_path, read_environ};
pub use process::{CommandPipe, ContainerProcess, INIT_PIPE_FD};
pub use state::RecordStore;
