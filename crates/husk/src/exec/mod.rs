//! Process entry points that run inside container namespaces.

pub mod init;
pub mod nsenter;

pub use init::container_init;
pub use nsenter::enter_if_requested;
