//! Volume plugin error types.
//!
//! All failures in `libvolume` are represented by the [`VolumeError`] enum,
//! which derives [`thiserror::Error`] for ergonomic error handling and also
//! implements [`Serialize`]/[`Deserialize`] so errors can travel back to the
//! caller over the Unix-socket gateway.

use std::fmt::Display;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for volume lifecycle operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum VolumeError {
    /// The block storage control plane could not be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend does not know the named volume.
    #[error("volume {0} not found")]
    VolumeNotFound(String),

    /// Creating or formatting the volume failed.
    #[error("provisioning {name} failed: {reason}")]
    ProvisioningFailed {
        /// Volume being provisioned.
        name: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Deleting the backend volume failed.
    #[error("deleting {name} failed: {reason}")]
    DeleteFailed {
        /// Volume being deleted.
        name: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Mapping the volume to a local block device failed.
    #[error("attach {name} failed: {reason}")]
    AttachFailed {
        /// Volume being attached.
        name: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Unmapping a local block device failed.
    #[error("detach {device} failed: {reason}")]
    DetachFailed {
        /// Device path being released.
        device: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A mount operation failed.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The derived mountpoint exists but cannot be used as one.
    #[error("{path} already exists and is not a directory")]
    InvalidMountpoint {
        /// Offending path.
        path: String,
    },

    /// Unmount was requested for a mountpoint with no active holder.
    #[error("unable to find volume mounted on {0}")]
    NotMounted(String),

    /// An operation failed and the cleanup that followed failed as well.
    #[error("{primary} (cleanup also failed: {cleanup})")]
    CleanupFailed {
        /// The error that aborted the operation.
        primary: Box<VolumeError>,
        /// The error raised while undoing partial side effects.
        cleanup: Box<VolumeError>,
    },

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A socket / framing level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VolumeError {
    /// Create a [`VolumeError::TransportError`] from anything that implements
    /// [`Display`].
    pub fn transport<E: Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`VolumeError::Internal`] from anything that implements
    /// [`Display`].
    pub fn internal<E: Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    pub(crate) fn mount_failed<E: Display>(path: &Path, e: E) -> Self {
        Self::MountFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    pub(crate) fn unmount_failed<E: Display>(path: &Path, e: E) -> Self {
        Self::UnmountFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Combine a primary failure with the failure of its cleanup step.
    pub fn with_cleanup(self, cleanup: VolumeError) -> Self {
        Self::CleanupFailed {
            primary: Box::new(self),
            cleanup: Box::new(cleanup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = VolumeError::VolumeNotFound("vol-123".into());
        assert_eq!(err.to_string(), "volume vol-123 not found");

        let err = VolumeError::NotMounted("/mnt/ceph/vol1".into());
        assert_eq!(
            err.to_string(),
            "unable to find volume mounted on /mnt/ceph/vol1"
        );
    }

    #[test]
    fn cleanup_failure_reports_both() {
        let primary = VolumeError::mount_failed(Path::new("/mnt/v"), "EBUSY");
        let cleanup = VolumeError::DetachFailed {
            device: "/dev/rbd0".into(),
            reason: "device busy".into(),
        };
        let err = primary.with_cleanup(cleanup);
        assert_eq!(
            err.to_string(),
            "mount failed at /mnt/v: EBUSY (cleanup also failed: detach /dev/rbd0 failed: device busy)"
        );
    }

    #[test]
    fn error_serde_roundtrip() {
        let err = VolumeError::InvalidMountpoint {
            path: "/mnt/test".into(),
        };
        let json = serde_json::to_string(&err).expect("serialize");
        let de: VolumeError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err.to_string(), de.to_string());
    }
}
