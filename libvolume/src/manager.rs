//! Volume lifecycle manager.
//!
//! [`VolumeManager`] owns the table of active mounts and sequences calls to
//! the [`BlockBackend`], [`FsProvisioner`] and [`MountOperator`] into
//! idempotent, reference-counted lifecycle operations.
//!
//! # Locking
//!
//! Every mutating operation holds one async mutex for its whole duration,
//! backend calls included.  Two requests for different volumes therefore
//! never overlap; a backend call that hangs blocks every later request.
//! [`VolumeDriver::path`] is the only operation that does not take the lock.
//!
//! # Table invariants
//!
//! * at most one [`VolumeRecord`] per mountpoint;
//! * a record exists iff `connections >= 1`;
//! * a record's `device` is the device its volume is attached as;
//! * a [`MountStage::DetachPending`] record has nothing mounted on its
//!   mountpoint and is never shared by a later Mount as is.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::backend::mount::{PROC_MOUNTS, unescape_mount_field};
use crate::backend::{
    BlockBackend, FsProvisioner, MkfsProvisioner, MountOperator, RbdBackend, SystemMounter,
};
use crate::config::ManagerConfig;
use crate::driver::VolumeDriver;
use crate::error::VolumeError;
use crate::types::{MountStage, SizePolicy, VolumeRecord, validate_name};

/// Kernel name prefix of mapped RBD images.
const RBD_DEVICE_PREFIX: &str = "/dev/rbd";

/// Reference-counted mount bookkeeping on top of the storage collaborators.
pub struct VolumeManager {
    root: PathBuf,
    size: SizePolicy,
    fs_type: String,
    backend: Arc<dyn BlockBackend>,
    provisioner: Arc<dyn FsProvisioner>,
    mounter: Arc<dyn MountOperator>,
    /// Active mounts keyed by mountpoint.
    volumes: Mutex<HashMap<PathBuf, VolumeRecord>>,
}

impl VolumeManager {
    /// Create a manager with an empty mount table.
    pub fn new(
        config: ManagerConfig,
        backend: Arc<dyn BlockBackend>,
        provisioner: Arc<dyn FsProvisioner>,
        mounter: Arc<dyn MountOperator>,
    ) -> Self {
        Self {
            root: config.root,
            size: config.size,
            fs_type: config.fs_type,
            backend,
            provisioner,
            mounter,
            volumes: Mutex::new(HashMap::new()),
        }
    }

    /// Manager wired to Ceph through `backend`, `blkid`/`mkfs` and `mount(2)`.
    pub fn ceph(config: ManagerConfig, backend: RbdBackend) -> Self {
        let mounter = SystemMounter::new(config.fs_type.clone());
        Self::new(
            config,
            Arc::new(backend),
            Arc::new(MkfsProvisioner::new()),
            Arc::new(mounter),
        )
    }

    /// Root directory under which mountpoints are derived.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy of the current mount table, sorted by mountpoint.
    pub async fn records(&self) -> Vec<VolumeRecord> {
        let volumes = self.volumes.lock().await;
        let mut records: Vec<_> = volumes.values().cloned().collect();
        records.sort_by(|a, b| a.mountpoint.cmp(&b.mountpoint));
        records
    }

    /// Rebuild table entries for RBD devices that are still mounted under
    /// the root, e.g. after a daemon restart.
    ///
    /// Each recovered mount is counted as a single holder.  Entries already
    /// present in the table are left alone.  Returns how many were added.
    pub async fn recover(&self) -> Result<usize, VolumeError> {
        let table = tokio::fs::read_to_string(PROC_MOUNTS)
            .await
            .map_err(|e| VolumeError::Internal(format!("read {PROC_MOUNTS}: {e}")))?;
        Ok(self.recover_from(&table).await)
    }

    async fn recover_from(&self, table: &str) -> usize {
        let mut volumes = self.volumes.lock().await;
        let mut added = 0;
        for record in parse_mount_table(table, &self.root) {
            if volumes.contains_key(&record.mountpoint) {
                continue;
            }
            info!(
                name = %record.name,
                device = %record.device.display(),
                "recovered existing mount",
            );
            volumes.insert(record.mountpoint.clone(), record);
            added += 1;
        }
        added
    }

    /// Attach the volume, put the configured filesystem on it if missing,
    /// and detach it again.
    async fn ensure_filesystem(&self, name: &str) -> Result<(), VolumeError> {
        let device = self.backend.attach(name).await?;
        let provisioned = self.provision_device(&device).await;
        let detached = self.backend.detach(&device).await;

        match (provisioned, detached) {
            (Ok(()), detached) => detached,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!(
                    device = %device.display(),
                    error = %cleanup,
                    "detach after failed provisioning also failed",
                );
                Err(e.with_cleanup(cleanup))
            }
        }
    }

    async fn provision_device(&self, device: &Path) -> Result<(), VolumeError> {
        let found = self.provisioner.probe_type(device).await?;
        if found.as_deref() == Some(self.fs_type.as_str()) {
            debug!(device = %device.display(), fs_type = %self.fs_type, "filesystem present");
            return Ok(());
        }
        info!(
            device = %device.display(),
            found = ?found,
            fs_type = %self.fs_type,
            "formatting device",
        );
        self.provisioner.format(device, &self.fs_type).await
    }

    /// Undo the attach of a mount that failed.  The primary error is always
    /// returned; a failing detach is logged and attached to it.
    async fn release_after_failed_mount(&self, device: &Path, error: VolumeError) -> VolumeError {
        match self.backend.detach(device).await {
            Ok(()) => error,
            Err(cleanup) => {
                warn!(
                    device = %device.display(),
                    error = %cleanup,
                    "detach after failed mount also failed; device left attached",
                );
                error.with_cleanup(cleanup)
            }
        }
    }
}

/// Make sure `mountpoint` is a directory, creating it (and its parents) when
/// missing.
async fn ensure_mountpoint(mountpoint: &Path) -> Result<(), VolumeError> {
    match tokio::fs::symlink_metadata(mountpoint).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(VolumeError::InvalidMountpoint {
            path: mountpoint.display().to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(mountpoint)
                .await
                .map_err(|e| VolumeError::mount_failed(mountpoint, e))
        }
        Err(e) => Err(VolumeError::mount_failed(mountpoint, e)),
    }
}

/// Extract the RBD mounts sitting directly under `root` from a
/// `/proc/self/mounts` style table.
pub fn parse_mount_table(table: &str, root: &Path) -> Vec<VolumeRecord> {
    table
        .lines()
        .filter_map(|line| {
            // <device> <mountpoint> <fstype> <options> <dump> <pass>
            let mut fields = line.split_whitespace();
            let device = unescape_mount_field(fields.next()?);
            let mountpoint = PathBuf::from(unescape_mount_field(fields.next()?));

            if !device.starts_with(RBD_DEVICE_PREFIX) || mountpoint.parent() != Some(root) {
                return None;
            }
            let name = mountpoint.file_name()?.to_str()?.to_owned();
            Some(VolumeRecord {
                name,
                mountpoint,
                device: PathBuf::from(device),
                connections: 1,
                stage: MountStage::Mounted,
            })
        })
        .collect()
}

#[async_trait]
impl VolumeDriver for VolumeManager {
    #[instrument(skip(self))]
    async fn create(&self, name: &str) -> Result<(), VolumeError> {
        validate_name(name)?;
        let mountpoint = self.path(name);
        let volumes = self.volumes.lock().await;

        // Mounted volumes were provisioned by an earlier Create.
        if volumes.contains_key(&mountpoint) {
            debug!(mountpoint = %mountpoint.display(), "volume mounted, nothing to create");
            return Ok(());
        }

        if !self.backend.exists(name).await? {
            self.backend.create(name, self.size).await?;
        }
        self.ensure_filesystem(name).await?;
        info!("volume ready");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, name: &str) -> Result<(), VolumeError> {
        validate_name(name)?;
        let mountpoint = self.path(name);
        let mut volumes = self.volumes.lock().await;

        if let Some(record) = volumes.get(&mountpoint)
            && record.connections > 1
        {
            info!(
                connections = record.connections,
                "volume still mounted by other holders, not removing",
            );
            return Ok(());
        }

        self.backend.delete(name).await?;
        if volumes.remove(&mountpoint).is_some() {
            debug!(mountpoint = %mountpoint.display(), "dropped mount record");
        }
        info!("volume removed");
        Ok(())
    }

    fn path(&self, name: &str) -> PathBuf {
        // A leading slash would make `join` discard the root.
        self.root.join(name.trim_start_matches('/'))
    }

    #[instrument(skip(self))]
    async fn mount(&self, name: &str) -> Result<PathBuf, VolumeError> {
        validate_name(name)?;
        let mountpoint = self.path(name);
        let mut volumes = self.volumes.lock().await;

        if let Some(record) = volumes.get_mut(&mountpoint)
            && record.connections > 0
        {
            if record.stage == MountStage::DetachPending {
                // The device is still attached from the interrupted Unmount.
                self.mounter.mount(&record.device, &mountpoint).await?;
                record.stage = MountStage::Mounted;
                info!(device = %record.device.display(), "remounted attached device");
            }
            record.connections += 1;
            debug!(connections = record.connections, "sharing existing mount");
            return Ok(mountpoint);
        }

        ensure_mountpoint(&mountpoint).await?;
        let device = self.backend.attach(name).await?;
        if let Err(e) = self.mounter.mount(&device, &mountpoint).await {
            return Err(self.release_after_failed_mount(&device, e).await);
        }

        info!(
            device = %device.display(),
            mountpoint = %mountpoint.display(),
            "volume mounted",
        );
        volumes.insert(
            mountpoint.clone(),
            VolumeRecord {
                name: name.to_owned(),
                mountpoint: mountpoint.clone(),
                device,
                connections: 1,
                stage: MountStage::Mounted,
            },
        );
        Ok(mountpoint)
    }

    #[instrument(skip(self))]
    async fn unmount(&self, name: &str) -> Result<(), VolumeError> {
        validate_name(name)?;
        let mountpoint = self.path(name);
        let mut volumes = self.volumes.lock().await;

        let Some(record) = volumes.get_mut(&mountpoint) else {
            return Err(VolumeError::NotMounted(mountpoint.display().to_string()));
        };

        if record.connections > 1 {
            record.connections -= 1;
            debug!(connections = record.connections, "released one holder");
            return Ok(());
        }

        // Last holder: the record stays until both steps succeed so that a
        // failed unmount can be retried.
        let device = record.device.clone();
        if record.stage == MountStage::Mounted {
            self.mounter.unmount(&mountpoint).await?;
            record.stage = MountStage::DetachPending;
        }
        self.backend.detach(&device).await?;
        volumes.remove(&mountpoint);

        info!(device = %device.display(), "volume unmounted");
        Ok(())
    }
}
