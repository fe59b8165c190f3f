//! Filesystem operations for containers.
//!
//! This module handles:
//! - Image extraction and copy-on-write workspaces
//! - OverlayFS configuration
//! - Volume bind mounts
//! - Root switching inside the container

mod layers;
mod mounts;
mod overlay;
mod pivot;
mod rootfs;
mod volume;

pub use layers::LayerStore;
pub use mounts::{MountOptions, bind_mount, make_rprivate, mount, unmount};
pub use overlay::OverlayFs;
pub use pivot::{pivot_root, switch_root};
pub use rootfs::setup_rootfs;
pub use volume::VolumeSpec;
