//! Unix-socket client used to issue volume requests to a running plugin.

use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, instrument};

use super::MAX_MESSAGE_BYTES;
use crate::error::VolumeError;
use crate::message::VolumeMessage;

/// A lightweight client that sends one [`VolumeMessage`] per connection and
/// returns the server's response.
#[derive(Debug, Clone)]
pub struct VolumeClient {
    socket_path: PathBuf,
}

impl VolumeClient {
    /// Client for the plugin listening on `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Send a request and wait for the corresponding response.
    ///
    /// Each call opens a new connection, writes the JSON-serialized request,
    /// shuts down the write half, then reads the full response.
    #[instrument(skip(self), fields(msg = %msg))]
    pub async fn request(&self, msg: &VolumeMessage) -> Result<VolumeMessage, VolumeError> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            VolumeError::TransportError(format!("connect {}: {e}", self.socket_path.display()))
        })?;

        let payload = serde_json::to_vec(msg).map_err(VolumeError::internal)?;
        stream
            .write_all(&payload)
            .await
            .map_err(VolumeError::transport)?;
        stream.shutdown().await.map_err(VolumeError::transport)?;

        let mut buf = Vec::new();
        (&mut stream)
            .take(MAX_MESSAGE_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(VolumeError::transport)?;

        let response: VolumeMessage =
            serde_json::from_slice(&buf).map_err(VolumeError::transport)?;
        debug!(%response, "volume response received");
        Ok(response)
    }

    /// Perform the plugin handshake and return the implemented interfaces.
    pub async fn activate(&self) -> Result<Vec<String>, VolumeError> {
        match self.request(&VolumeMessage::Activate).await? {
            VolumeMessage::Implements(ifaces) => Ok(ifaces),
            other => Err(unexpected(other)),
        }
    }

    pub async fn create(&self, name: &str) -> Result<(), VolumeError> {
        let msg = VolumeMessage::Create {
            name: name.to_owned(),
        };
        expect_ok(self.request(&msg).await?)
    }

    pub async fn remove(&self, name: &str) -> Result<(), VolumeError> {
        let msg = VolumeMessage::Remove {
            name: name.to_owned(),
        };
        expect_ok(self.request(&msg).await?)
    }

    pub async fn path(&self, name: &str) -> Result<PathBuf, VolumeError> {
        let msg = VolumeMessage::Path {
            name: name.to_owned(),
        };
        expect_mountpoint(self.request(&msg).await?)
    }

    pub async fn mount(&self, name: &str) -> Result<PathBuf, VolumeError> {
        let msg = VolumeMessage::Mount {
            name: name.to_owned(),
        };
        expect_mountpoint(self.request(&msg).await?)
    }

    pub async fn unmount(&self, name: &str) -> Result<(), VolumeError> {
        let msg = VolumeMessage::Unmount {
            name: name.to_owned(),
        };
        expect_ok(self.request(&msg).await?)
    }
}

fn expect_ok(response: VolumeMessage) -> Result<(), VolumeError> {
    match response {
        VolumeMessage::Ok => Ok(()),
        other => Err(unexpected(other)),
    }
}

fn expect_mountpoint(response: VolumeMessage) -> Result<PathBuf, VolumeError> {
    match response {
        VolumeMessage::Mountpoint(path) => Ok(path),
        other => Err(unexpected(other)),
    }
}

/// Turn an error response into its error, anything else into a protocol
/// violation.
fn unexpected(response: VolumeMessage) -> VolumeError {
    match response {
        VolumeMessage::Error(e) => e,
        other => VolumeError::TransportError(format!("unexpected response: {other}")),
    }
}
