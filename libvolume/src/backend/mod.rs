//! External collaborators of the volume manager.
//!
//! The manager talks to storage only through the three traits below; the
//! submodules provide the concrete Ceph/Linux implementations.

pub(crate) mod command;
pub mod fs;
pub mod mount;
pub mod rbd;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::VolumeError;
use crate::types::SizePolicy;

pub use fs::MkfsProvisioner;
pub use mount::SystemMounter;
pub use rbd::RbdBackend;

/// Named block volumes in a remote pool.
#[async_trait]
pub trait BlockBackend: Send + Sync {
    /// Whether an image called `name` exists.
    async fn exists(&self, name: &str) -> Result<bool, VolumeError>;

    /// Create the image `name` with the given size.
    async fn create(&self, name: &str, size: SizePolicy) -> Result<(), VolumeError>;

    /// Delete the image `name`.
    async fn delete(&self, name: &str) -> Result<(), VolumeError>;

    /// Map the image to a local block device and return its path.
    async fn attach(&self, name: &str) -> Result<PathBuf, VolumeError>;

    /// Release a device previously returned by [`Self::attach`].
    async fn detach(&self, device: &Path) -> Result<(), VolumeError>;
}

/// Filesystem detection and creation on a block device.
#[async_trait]
pub trait FsProvisioner: Send + Sync {
    /// Return the filesystem type found on `device`, or `None` if the device
    /// carries no recognizable filesystem.
    async fn probe_type(&self, device: &Path) -> Result<Option<String>, VolumeError>;

    /// Write a fresh `fs_type` filesystem onto `device`.
    async fn format(&self, device: &Path, fs_type: &str) -> Result<(), VolumeError>;
}

/// Kernel mount table operations.
#[async_trait]
pub trait MountOperator: Send + Sync {
    /// Mount `device` on the existing directory `target`.
    async fn mount(&self, device: &Path, target: &Path) -> Result<(), VolumeError>;

    /// Unmount whatever is mounted on `target`.  Implementations should treat
    /// a target with nothing mounted on it as already unmounted.
    async fn unmount(&self, target: &Path) -> Result<(), VolumeError>;
}
