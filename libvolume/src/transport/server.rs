//! Unix-socket server that runs next to the container engine and dispatches
//! incoming volume requests to a [`VolumeDriver`].

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, instrument, warn};

use super::MAX_MESSAGE_BYTES;
use crate::driver::VolumeDriver;
use crate::error::VolumeError;
use crate::message::{VOLUME_DRIVER_INTERFACE, VolumeMessage};

/// A volume plugin server that accepts Unix-socket connections and
/// dispatches [`VolumeMessage`] requests to a [`VolumeDriver`].
pub struct VolumeServer<T> {
    listener: UnixListener,
    socket_path: PathBuf,
    handler: Arc<T>,
}

impl<T> VolumeServer<T>
where
    T: VolumeDriver + 'static,
{
    /// Bind a new server at `socket_path`.
    ///
    /// Missing parent directories are created and a stale socket left by a
    /// previous run is replaced.  Must be called inside a Tokio runtime.
    pub fn bind(socket_path: impl Into<PathBuf>, handler: Arc<T>) -> Result<Self, VolumeError> {
        let socket_path = socket_path.into();
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VolumeError::TransportError(format!("create {}: {e}", parent.display()))
            })?;
        }
        match std::fs::remove_file(&socket_path) {
            Ok(()) => debug!(path = %socket_path.display(), "removed stale socket"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(VolumeError::TransportError(format!(
                    "remove stale socket {}: {e}",
                    socket_path.display()
                )));
            }
        }

        let listener = UnixListener::bind(&socket_path).map_err(|e| {
            VolumeError::TransportError(format!("bind {}: {e}", socket_path.display()))
        })?;
        info!(path = %socket_path.display(), "volume plugin listening");
        Ok(Self {
            listener,
            socket_path,
            handler,
        })
    }

    /// Accept connections until an accept error that is not transient.
    ///
    /// Each accepted connection is handled on its own Tokio task.
    pub async fn serve(&self) -> Result<(), VolumeError> {
        loop {
            let stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "accept failed, continuing");
                    continue;
                }
                Err(e) => return Err(VolumeError::transport(e)),
            };

            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                if let Err(e) = Self::handle_stream(stream, &handler).await {
                    error!(error = %e, "volume request handler error");
                }
            });
        }
    }

    /// Like [`Self::serve`], but return once `shutdown` completes.
    pub async fn serve_until<F>(&self, shutdown: F) -> Result<(), VolumeError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            res = self.serve() => res,
            () = shutdown => {
                info!("volume plugin shutting down");
                Ok(())
            }
        }
    }

    /// Process a single connection: read request → dispatch → write response.
    #[instrument(skip_all)]
    async fn handle_stream(mut stream: UnixStream, handler: &T) -> Result<(), VolumeError> {
        let (reader, mut writer) = stream.split();

        let mut buf = Vec::new();
        reader
            .take(MAX_MESSAGE_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(VolumeError::transport)?;

        let response = match serde_json::from_slice::<VolumeMessage>(&buf) {
            Ok(request) => {
                debug!(%request, "volume request received");
                Self::dispatch(handler, request).await
            }
            Err(e) => {
                warn!(error = %e, len = buf.len(), "malformed volume request");
                VolumeMessage::Error(VolumeError::TransportError(format!(
                    "malformed request: {e}"
                )))
            }
        };
        debug!(%response, "volume response");

        let payload = serde_json::to_vec(&response).map_err(VolumeError::internal)?;
        writer
            .write_all(&payload)
            .await
            .map_err(VolumeError::transport)?;
        writer.shutdown().await.map_err(VolumeError::transport)?;
        Ok(())
    }

    /// Map a [`VolumeMessage`] request to the matching driver call and wrap
    /// the result in a response [`VolumeMessage`].
    pub async fn dispatch(handler: &T, request: VolumeMessage) -> VolumeMessage {
        match request {
            VolumeMessage::Activate => {
                VolumeMessage::Implements(vec![VOLUME_DRIVER_INTERFACE.to_owned()])
            }
            VolumeMessage::Create { name } => match handler.create(&name).await {
                Ok(()) => VolumeMessage::Ok,
                Err(e) => VolumeMessage::Error(e),
            },
            VolumeMessage::Remove { name } => match handler.remove(&name).await {
                Ok(()) => VolumeMessage::Ok,
                Err(e) => VolumeMessage::Error(e),
            },
            VolumeMessage::Path { name } => VolumeMessage::Mountpoint(handler.path(&name)),
            VolumeMessage::Mount { name } => match handler.mount(&name).await {
                Ok(mountpoint) => VolumeMessage::Mountpoint(mountpoint),
                Err(e) => VolumeMessage::Error(e),
            },
            VolumeMessage::Unmount { name } => match handler.unmount(&name).await {
                Ok(()) => VolumeMessage::Ok,
                Err(e) => VolumeMessage::Error(e),
            },

            // --- Response variants should never arrive as requests ----------
            other => {
                warn!(msg = %other, "unexpected message variant received as request");
                VolumeMessage::Error(VolumeError::InvalidArgument(format!(
                    "unexpected message: {other}"
                )))
            }
        }
    }

    /// Filesystem path of the listening socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl<T> Drop for VolumeServer<T> {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %self.socket_path.display(), error = %e, "failed to remove socket");
        }
    }
}

/// Accept errors caused by resource pressure or an aborted peer.
fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::Interrupted
    ) || matches!(e.raw_os_error(), Some(nix::libc::EMFILE | nix::libc::ENFILE))
}
