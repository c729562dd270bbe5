//! # libvolume: reference-counted Ceph RBD volumes for container hosts
//!
//! `libvolume` exposes Ceph RBD images as named, mountable directories.  A
//! container engine asks for volumes by name (create, mount, path, unmount,
//! remove) over a Unix socket; the [`VolumeManager`] maps each name to an
//! image, attaches and mounts it on first use, and shares that single mount
//! between every concurrent holder.  All storage access goes through async
//! traits in [`backend`], so the manager can run against fakes in tests.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `VolumeRecord`, `SizePolicy`, name checks. |
//! | [`config`] | [`ManagerConfig`]: root directory, pool, size, filesystem. |
//! | [`error`] | [`VolumeError`] enum covering all failure modes. |
//! | [`driver`] | [`VolumeDriver`] trait: the five lifecycle operations. |
//! | [`manager`] | [`VolumeManager`]: mount table and locking discipline. |
//! | [`backend`] | Storage collaborators: `rbd`, `blkid`/`mkfs`, `mount(2)`. |
//! | [`message`] | [`VolumeMessage`] protocol envelope. |
//! | [`transport`] | Unix-socket client/server. |

pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod manager;
pub mod message;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use config::ManagerConfig;
pub use driver::VolumeDriver;
pub use error::VolumeError;
pub use manager::VolumeManager;
pub use message::VolumeMessage;
pub use transport::client::VolumeClient;
pub use transport::server::VolumeServer;
pub use types::*;
