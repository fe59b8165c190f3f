//! # husk-common
//!
//! Shared utilities and types for the husk container runtime.
//!
//! This crate provides common functionality used across all husk crates:
//! - Container id generation and name validation
//! - Standard filesystem paths
//! - The persisted container record
//! - Atomic and lock-protected JSON file storage
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod paths;
pub mod record;
pub mod store;

pub use error::{HuskError, HuskResult};
pub use id::{generate_container_id, validate_image_name, validate_name};
pub use paths::HuskPaths;
pub use record::{ContainerRecord, ContainerStatus, ResourceConfig};
pub use store::LockedStore;
