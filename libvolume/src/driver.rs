//! Volume driver trait.
//!
//! The gateway speaks to the lifecycle manager through this trait only, so
//! the transport can be exercised against any implementation.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::VolumeError;

/// The five lifecycle operations exposed to the request gateway.
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Provision the named volume if it does not exist and make sure it
    /// carries a filesystem.  Idempotent.
    async fn create(&self, name: &str) -> Result<(), VolumeError>;

    /// Delete the backing volume unless other holders still have it mounted.
    async fn remove(&self, name: &str) -> Result<(), VolumeError>;

    /// Deterministic mountpoint for `name`.  Never touches storage.
    fn path(&self, name: &str) -> PathBuf;

    /// Attach and mount the volume, or take another reference on an existing
    /// mount.  Returns the mountpoint.
    async fn mount(&self, name: &str) -> Result<PathBuf, VolumeError>;

    /// Drop one reference; the last one unmounts and detaches.
    async fn unmount(&self, name: &str) -> Result<(), VolumeError>;
}
