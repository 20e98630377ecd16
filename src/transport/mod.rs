//! # Transport Module
//!
//! Trait abstraction over message-framed connections so both sessions can be
//! driven by the WebSocket implementation or by scripted streams in tests.
//!
//! This module handles:
//! - Opening a connection to an endpoint ([`Connector`])
//! - Sending text payloads and receiving raw frames ([`MessageStream`])
//! - Closing a connection (idempotent)

pub mod websocket;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

pub use websocket::{WsConnector, WsStream};

/// One open, message-framed connection
#[async_trait]
pub trait MessageStream: Send {
    /// Send one text message
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Receive the next frame
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Close the connection. Calling it more than once is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory for [`MessageStream`]s
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection to `endpoint`
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn MessageStream>, TransportError>;
}
