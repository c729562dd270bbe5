//! Filesystem detection (`blkid`) and creation (`mkfs.<type>`).

use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::FsProvisioner;
use super::command;
use crate::error::VolumeError;

/// `blkid` exits with 2 when the device carries no recognizable signature.
const BLKID_NOT_FOUND: i32 = 2;

/// [`FsProvisioner`] shelling out to util-linux and the mkfs family.
#[derive(Debug, Clone)]
pub struct MkfsProvisioner {
    blkid: String,
    mkfs_prefix: String,
}

impl Default for MkfsProvisioner {
    fn default() -> Self {
        Self {
            blkid: "blkid".to_owned(),
            mkfs_prefix: "mkfs.".to_owned(),
        }
    }
}

impl MkfsProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a different `blkid` executable.
    pub fn with_blkid(mut self, blkid: impl Into<String>) -> Self {
        self.blkid = blkid.into();
        self
    }

    /// Prefix joined with the filesystem type to name the mkfs executable.
    pub fn with_mkfs_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mkfs_prefix = prefix.into();
        self
    }
}

/// Flag that makes `mkfs.<fs_type>` overwrite an existing signature without
/// prompting.
fn force_flag(fs_type: &str) -> &'static str {
    match fs_type {
        "ext2" | "ext3" | "ext4" => "-F",
        _ => "-f",
    }
}

#[async_trait]
impl FsProvisioner for MkfsProvisioner {
    #[instrument(skip(self), fields(device = %device.display()))]
    async fn probe_type(&self, device: &Path) -> Result<Option<String>, VolumeError> {
        let args = [
            OsStr::new("-o"),
            OsStr::new("value"),
            OsStr::new("-s"),
            OsStr::new("TYPE"),
            device.as_os_str(),
        ];
        match command::run(&self.blkid, args).await {
            Ok(out) if out.is_empty() => Ok(None),
            Ok(out) => {
                debug!(fs_type = %out, "filesystem detected");
                Ok(Some(out))
            }
            Err(e) if e.code() == Some(BLKID_NOT_FOUND) => {
                debug!("no filesystem signature");
                Ok(None)
            }
            Err(e) => Err(VolumeError::ProvisioningFailed {
                name: device.display().to_string(),
                reason: format!("blkid: {e}"),
            }),
        }
    }

    #[instrument(skip(self), fields(device = %device.display()))]
    async fn format(&self, device: &Path, fs_type: &str) -> Result<(), VolumeError> {
        let program = format!("{}{fs_type}", self.mkfs_prefix);
        let args = [OsStr::new(force_flag(fs_type)), device.as_os_str()];
        command::run(&program, args)
            .await
            .map_err(|e| VolumeError::ProvisioningFailed {
                name: device.display().to_string(),
                reason: format!("{program}: {e}"),
            })?;
        info!(fs_type, "device formatted");
        Ok(())
    }
}
