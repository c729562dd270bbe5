//! Unix-socket transport for volume messages.
//!
//! This module provides [`VolumeClient`](client::VolumeClient) and
//! [`VolumeServer`](server::VolumeServer) that exchange JSON-encoded
//! [`VolumeMessage`](crate::message::VolumeMessage) values, one request and
//! one response per connection.

pub mod client;
pub mod server;

/// Upper bound on a single encoded message.
pub(crate) const MAX_MESSAGE_BYTES: u64 = 16 * 1024 * 1024;
