//! Kernel mount/umount through `nix`.

use std::path::Path;

use async_trait::async_trait;
use nix::mount::{MntFlags, MsFlags};
use tracing::{debug, info, instrument};

use super::MountOperator;
use crate::error::VolumeError;

/// Kernel view of the current mounts.
pub(crate) const PROC_MOUNTS: &str = "/proc/self/mounts";

/// [`MountOperator`] issuing `mount(2)` / `umount2(2)` directly.
#[derive(Debug, Clone)]
pub struct SystemMounter {
    fs_type: String,
}

impl SystemMounter {
    /// Mounter for devices carrying `fs_type`.
    pub fn new(fs_type: impl Into<String>) -> Self {
        Self {
            fs_type: fs_type.into(),
        }
    }
}

#[async_trait]
impl MountOperator for SystemMounter {
    #[instrument(skip(self), fields(device = %device.display(), target = %target.display()))]
    async fn mount(&self, device: &Path, target: &Path) -> Result<(), VolumeError> {
        nix::mount::mount(
            Some(device),
            target,
            Some(self.fs_type.as_str()),
            MsFlags::MS_NOATIME,
            None::<&str>,
        )
        .map_err(|e| VolumeError::mount_failed(target, e))?;

        info!(fs_type = %self.fs_type, "device mounted");
        Ok(())
    }

    #[instrument(skip(self), fields(target = %target.display()))]
    async fn unmount(&self, target: &Path) -> Result<(), VolumeError> {
        // umount2 fails with EINVAL on a target that is not mounted.
        if !is_mountpoint(target).await {
            debug!("target not mounted, nothing to unmount");
            return Ok(());
        }

        nix::mount::umount2(target, MntFlags::empty())
            .map_err(|e| VolumeError::unmount_failed(target, e))?;

        info!("target unmounted");
        Ok(())
    }
}

async fn is_mountpoint(target: &Path) -> bool {
    let Ok(table) = tokio::fs::read_to_string(PROC_MOUNTS).await else {
        return false;
    };
    mount_table_has(&table, target)
}

fn mount_table_has(table: &str, target: &Path) -> bool {
    // <device> <mountpoint> <fstype> <options> <dump> <pass>
    table.lines().any(|line| {
        line.split_whitespace()
            .nth(1)
            .is_some_and(|field| Path::new(&unescape_mount_field(field)) == target)
    })
}

/// Decode the `\ooo` octal escapes the kernel uses for whitespace and
/// backslashes in mount table fields.
pub(crate) fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && let Some(digits) = bytes.get(i + 1..i + 4)
            && digits.iter().all(|d| (b'0'..=b'7').contains(d))
            && let Ok(byte) =
                u8::try_from(digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0')))
        {
            out.push(byte);
            i += 4;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unmount_of_plain_directory_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mounter = SystemMounter::new("xfs");
        mounter.unmount(tmp.path()).await.unwrap();
        mounter.unmount(tmp.path()).await.unwrap();
    }

    #[test]
    fn mount_table_lookup() {
        let table = "\
/dev/rbd0 /var/lib/docker/volumes/_ceph/vol1 xfs rw 0 0
/dev/rbd1 /var/lib/docker/volumes/_ceph/my\\040vol xfs rw 0 0
";
        assert!(mount_table_has(table, Path::new("/var/lib/docker/volumes/_ceph/vol1")));
        assert!(mount_table_has(table, Path::new("/var/lib/docker/volumes/_ceph/my vol")));
        assert!(!mount_table_has(table, Path::new("/var/lib/docker/volumes/_ceph")));
    }

    #[test]
    fn unescape_keeps_out_of_range_escapes() {
        assert_eq!(unescape_mount_field("a\\040b"), "a b");
        assert_eq!(unescape_mount_field("back\\134slash"), "back\\slash");
        assert_eq!(unescape_mount_field("big\\777"), "big\\777");
        assert_eq!(unescape_mount_field("short\\04"), "short\\04");
    }
}
