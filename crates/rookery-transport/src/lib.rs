//! Transport layer for Rookery.
//!
//! Provides the [`Transport`] and [`Connection`] traits, the TCP
//! implementation of both, and the [`FrameCodec`] that turns a raw TCP byte
//! stream into newline-delimited frames.
//!
//! TCP is a byte stream: one `read` can return half a message, or three
//! messages and the start of a fourth. Everything above this crate works
//! with whole frames, so the codec keeps a persistent buffer per connection
//! and only hands out complete lines.
//!
//! # Feature Flags
//!
//! - `tcp` (default): TCP transport via `tokio::net`

#![allow(async_fn_in_trait)]

mod error;
mod frame;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
pub use frame::FrameCodec;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;

/// Opaque identifier for a connection.
///
/// Stable for the lifetime of the socket; the server also uses it as the
/// session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that exchanges whole frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the remote peer. The delimiter is added by the
    /// connection; `frame` must not contain one.
    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next complete frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
