//! Volume plugin messages transmitted over the Unix socket.
//!
//! [`VolumeMessage`] is the top-level envelope for all request and response
//! variants exchanged between a volume client (the container engine side)
//! and the plugin daemon.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::VolumeError;

/// Driver interface advertised in the activation handshake.
pub const VOLUME_DRIVER_INTERFACE: &str = "VolumeDriver";

/// Top-level message envelope.
///
/// Each connection carries exactly one request followed by one response.
/// The client sends a *request* variant and the server replies with the
/// corresponding *response* variant (or [`VolumeMessage::Error`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VolumeMessage {
    // ----- Requests --------------------------------------------------------
    /// Plugin handshake.
    Activate,
    /// Provision a volume.
    Create { name: String },
    /// Delete a volume.
    Remove { name: String },
    /// Look up a volume's mountpoint.
    Path { name: String },
    /// Mount a volume (reference-counted).
    Mount { name: String },
    /// Release one mount reference.
    Unmount { name: String },

    // ----- Responses -------------------------------------------------------
    /// Interfaces implemented by this plugin.
    Implements(Vec<String>),
    /// Mountpoint of the requested volume.
    Mountpoint(PathBuf),
    /// Generic success acknowledgement (no payload).
    Ok,
    /// An error occurred.
    Error(VolumeError),
}

impl VolumeMessage {
    /// Whether this variant is something a client may send.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::Activate
                | Self::Create { .. }
                | Self::Remove { .. }
                | Self::Path { .. }
                | Self::Mount { .. }
                | Self::Unmount { .. }
        )
    }
}

impl std::fmt::Display for VolumeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activate => f.write_str("Activate"),
            Self::Create { name } => write!(f, "Create({name})"),
            Self::Remove { name } => write!(f, "Remove({name})"),
            Self::Path { name } => write!(f, "Path({name})"),
            Self::Mount { name } => write!(f, "Mount({name})"),
            Self::Unmount { name } => write!(f, "Unmount({name})"),
            Self::Implements(ifaces) => write!(f, "Implements({})", ifaces.join(",")),
            Self::Mountpoint(path) => write!(f, "Mountpoint({})", path.display()),
            Self::Ok => f.write_str("Ok"),
            Self::Error(e) => write!(f, "Error({e})"),
        }
    }
}
