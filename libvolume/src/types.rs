//! Core types: volume records, size policy and name validation.
//!
//! These types form the data model shared by the manager, the transport layer,
//! and the backend implementations.  They are all [`Serialize`]/[`Deserialize`]
//! so they can be logged or transmitted as JSON.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::VolumeError;

// ---------------------------------------------------------------------------
// Volume bookkeeping
// ---------------------------------------------------------------------------

/// One entry of the manager's mount table.
///
/// A record exists only while at least one Mount is outstanding for its
/// mountpoint; it is dropped as soon as `connections` would reach zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeRecord {
    /// Volume name in the backend's namespace.
    pub name: String,
    /// Local directory the volume is mounted on (`root/name`).
    pub mountpoint: PathBuf,
    /// Block device returned by the attach that backs this mount.
    pub device: PathBuf,
    /// Number of Mount calls not yet matched by an Unmount.
    pub connections: u32,
    /// How far a last-holder Unmount got before failing.
    #[serde(default)]
    pub stage: MountStage,
}

/// Kernel state of the device behind a [`VolumeRecord`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MountStage {
    /// Filesystem mounted on the mountpoint.
    #[default]
    Mounted,
    /// Filesystem already unmounted; the device is still attached.
    DetachPending,
}

// ---------------------------------------------------------------------------
// Provisioning policy
// ---------------------------------------------------------------------------

/// Size used when a volume has to be created on demand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizePolicy {
    /// Image size in MiB.
    pub size_mb: u64,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self { size_mb: 128 }
    }
}

/// Reject names that would escape the root directory or address nothing.
pub fn validate_name(name: &str) -> Result<(), VolumeError> {
    if name.is_empty() {
        return Err(VolumeError::InvalidArgument("volume name is empty".into()));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(VolumeError::InvalidArgument(format!(
            "volume name {name:?} is not a plain identifier"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_without_stage_default_to_mounted() {
        let record: VolumeRecord = serde_json::from_str(
            r#"{"name":"vol1","mountpoint":"/v/vol1","device":"/dev/rbd0","connections":1}"#,
        )
        .unwrap();
        assert_eq!(record.stage, MountStage::Mounted);
        let json = serde_json::to_string(&VolumeRecord {
            stage: MountStage::DetachPending,
            ..record
        })
        .unwrap();
        assert!(json.contains(r#""stage":"detach_pending""#));
    }

    #[test]
    fn size_policy_default() {
        assert_eq!(SizePolicy::default().size_mb, 128);
    }

    #[test]
    fn names() {
        assert!(validate_name("vol1").is_ok());
        assert!(validate_name("my-vol_2.data").is_ok());
        for bad in ["", ".", "..", "a/b", "../etc", "nul\0"] {
            assert!(
                matches!(validate_name(bad), Err(VolumeError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
