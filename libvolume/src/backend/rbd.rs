//! Ceph RBD backend driven through the `rbd` command-line tool.
//!
//! Every invocation is scoped to the configured pool and, when set, to an
//! explicit `ceph.conf` and cephx user:
//!
//! ```text
//! rbd [--conf <conf>] [--id <user>] ls --pool <pool> --format json
//! rbd [...] create --pool <pool> --size <MiB> <name>
//! rbd [...] rm --pool <pool> <name>
//! rbd [...] map --pool <pool> <name>        # prints /dev/rbdN
//! rbd [...] unmap <device>
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::BlockBackend;
use super::command::{self, CommandFailure};
use crate::error::VolumeError;
use crate::types::SizePolicy;

/// [`BlockBackend`] backed by a Ceph pool.
#[derive(Debug, Clone)]
pub struct RbdBackend {
    pool: String,
    conf: Option<PathBuf>,
    id: Option<String>,
    binary: String,
}

impl RbdBackend {
    /// Backend for `pool` using the default Ceph configuration.
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            conf: None,
            id: None,
            binary: "rbd".to_owned(),
        }
    }

    /// Use an explicit `ceph.conf`.
    pub fn with_conf(mut self, conf: impl Into<PathBuf>) -> Self {
        self.conf = Some(conf.into());
        self
    }

    /// Authenticate as the given cephx user.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Run a different executable instead of `rbd` from `PATH`.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Pool this backend operates on.
    pub fn pool(&self) -> &str {
        &self.pool
    }

    fn args(&self, subcommand: &[&str]) -> Vec<OsString> {
        let mut args = Vec::with_capacity(subcommand.len() + 4);
        if let Some(conf) = &self.conf {
            args.push("--conf".into());
            args.push(conf.into());
        }
        if let Some(id) = &self.id {
            args.push("--id".into());
            args.push(id.into());
        }
        args.extend(subcommand.iter().map(OsString::from));
        args
    }

    async fn rbd(&self, subcommand: &[&str]) -> Result<String, CommandFailure> {
        command::run(&self.binary, self.args(subcommand)).await
    }
}

fn is_missing_image(failure: &CommandFailure) -> bool {
    failure.stderr().contains("No such file or directory")
}

#[async_trait]
impl BlockBackend for RbdBackend {
    #[instrument(skip(self), fields(pool = %self.pool))]
    async fn exists(&self, name: &str) -> Result<bool, VolumeError> {
        let out = self
            .rbd(&["ls", "--pool", self.pool.as_str(), "--format", "json"])
            .await
            .map_err(|e| {
                VolumeError::BackendUnavailable(format!("listing pool {}: {e}", self.pool))
            })?;

        // An empty pool prints nothing on some releases instead of `[]`.
        if out.is_empty() {
            return Ok(false);
        }
        let images: Vec<String> = serde_json::from_str(&out).map_err(|e| {
            VolumeError::BackendUnavailable(format!("unexpected rbd ls output: {e}"))
        })?;
        let found = images.iter().any(|image| image == name);
        debug!(found, count = images.len(), "pool listed");
        Ok(found)
    }

    #[instrument(skip(self), fields(pool = %self.pool))]
    async fn create(&self, name: &str, size: SizePolicy) -> Result<(), VolumeError> {
        let size_mb = size.size_mb.to_string();
        self.rbd(&["create", "--pool", self.pool.as_str(), "--size", size_mb.as_str(), name])
            .await
            .map_err(|e| VolumeError::ProvisioningFailed {
                name: name.to_owned(),
                reason: format!("rbd create: {e}"),
            })?;
        info!(size_mb = size.size_mb, "image created");
        Ok(())
    }

    #[instrument(skip(self), fields(pool = %self.pool))]
    async fn delete(&self, name: &str) -> Result<(), VolumeError> {
        self.rbd(&["rm", "--pool", self.pool.as_str(), name])
            .await
            .map_err(|e| {
                if is_missing_image(&e) {
                    VolumeError::VolumeNotFound(name.to_owned())
                } else {
                    VolumeError::DeleteFailed {
                        name: name.to_owned(),
                        reason: format!("rbd rm: {e}"),
                    }
                }
            })?;
        info!("image removed");
        Ok(())
    }

    #[instrument(skip(self), fields(pool = %self.pool))]
    async fn attach(&self, name: &str) -> Result<PathBuf, VolumeError> {
        let out = self
            .rbd(&["map", "--pool", self.pool.as_str(), name])
            .await
            .map_err(|e| {
                if is_missing_image(&e) {
                    VolumeError::VolumeNotFound(name.to_owned())
                } else {
                    VolumeError::AttachFailed {
                        name: name.to_owned(),
                        reason: format!("rbd map: {e}"),
                    }
                }
            })?;

        let device = out.lines().last().map(str::trim).unwrap_or_default();
        if device.is_empty() {
            return Err(VolumeError::AttachFailed {
                name: name.to_owned(),
                reason: "rbd map printed no device path".into(),
            });
        }
        info!(device, "image mapped");
        Ok(PathBuf::from(device))
    }

    #[instrument(skip(self), fields(device = %device.display()))]
    async fn detach(&self, device: &Path) -> Result<(), VolumeError> {
        let device_str = device.to_string_lossy();
        self.rbd(&["unmap", device_str.as_ref()])
            .await
            .map_err(|e| VolumeError::DetachFailed {
                device: device_str.clone().into_owned(),
                reason: format!("rbd unmap: {e}"),
            })?;
        info!("device unmapped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Write an executable shell script standing in for `rbd`.
    fn fake_rbd(dir: &Path, body: &str) -> String {
        let path = dir.join("rbd");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn global_flags_precede_subcommand() {
        let backend = RbdBackend::new("volumes")
            .with_conf("/etc/ceph/ceph.conf")
            .with_id("docker");
        let args = backend.args(&["map", "--pool", "volumes", "vol1"]);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "--conf",
                "/etc/ceph/ceph.conf",
                "--id",
                "docker",
                "map",
                "--pool",
                "volumes",
                "vol1"
            ]
        );
    }

    #[tokio::test]
    async fn exists_parses_json_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = fake_rbd(tmp.path(), r#"echo '["vol1","vol2"]'"#);
        let backend = RbdBackend::new("rbd").with_binary(bin);

        assert!(backend.exists("vol2").await.unwrap());
        assert!(!backend.exists("vol3").await.unwrap());
    }

    #[tokio::test]
    async fn exists_on_empty_output() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = fake_rbd(tmp.path(), "true");
        let backend = RbdBackend::new("rbd").with_binary(bin);
        assert!(!backend.exists("vol1").await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_cluster_is_backend_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = fake_rbd(tmp.path(), "echo 'error connecting to the cluster' >&2; exit 1");
        let backend = RbdBackend::new("rbd").with_binary(bin);
        assert!(matches!(
            backend.exists("vol1").await,
            Err(VolumeError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn attach_returns_mapped_device() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = fake_rbd(tmp.path(), "echo /dev/rbd3");
        let backend = RbdBackend::new("rbd").with_binary(bin);
        assert_eq!(
            backend.attach("vol1").await.unwrap(),
            PathBuf::from("/dev/rbd3")
        );
    }

    #[tokio::test]
    async fn attach_without_output_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = fake_rbd(tmp.path(), "true");
        let backend = RbdBackend::new("rbd").with_binary(bin);
        assert!(matches!(
            backend.attach("vol1").await,
            Err(VolumeError::AttachFailed { .. })
        ));
    }

    #[tokio::test]
    async fn delete_missing_image() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = fake_rbd(
            tmp.path(),
            "echo 'rbd: delete error: (2) No such file or directory' >&2; exit 2",
        );
        let backend = RbdBackend::new("rbd").with_binary(bin);
        assert!(matches!(
            backend.delete("ghost").await,
            Err(VolumeError::VolumeNotFound(name)) if name == "ghost"
        ));
    }

    #[tokio::test]
    async fn create_passes_size_and_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("args");
        let bin = fake_rbd(tmp.path(), &format!("echo \"$@\" > {}", log.display()));
        let backend = RbdBackend::new("volumes").with_binary(bin);

        backend
            .create("vol1", SizePolicy { size_mb: 256 })
            .await
            .unwrap();
        let recorded = std::fs::read_to_string(&log).unwrap();
        assert_eq!(recorded.trim(), "create --pool volumes --size 256 vol1");
    }
}
