//! Manager configuration.
//!
//! Built once at startup (by `rkvol` from its command-line flags) and handed
//! to [`VolumeManager::new`](crate::manager::VolumeManager::new).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::SizePolicy;

/// Default directory under which every mountpoint is derived.
pub const DEFAULT_ROOT: &str = "/var/lib/docker/volumes/_ceph";

/// Default Ceph pool holding the images.
pub const DEFAULT_POOL: &str = "rbd";

/// Default filesystem written onto fresh images.
pub const DEFAULT_FS_TYPE: &str = "xfs";

/// Configuration consumed by the volume manager and the Ceph backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Base path; the mountpoint of `name` is `root.join(name)`.
    pub root: PathBuf,
    /// Ceph pool passed to every `rbd` invocation.
    pub pool: String,
    /// Size used when `Create` has to provision a missing image.
    #[serde(default)]
    pub size: SizePolicy,
    /// Filesystem expected on (and written to) every image.
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
}

fn default_fs_type() -> String {
    DEFAULT_FS_TYPE.to_owned()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            pool: DEFAULT_POOL.to_owned(),
            size: SizePolicy::default(),
            fs_type: default_fs_type(),
        }
    }
}
