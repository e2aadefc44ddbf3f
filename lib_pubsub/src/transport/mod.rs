//! # Transport
//!
//! The duplex text connection underneath the session engine. A transport is
//! driven by the engine task only: `connect` starts an attempt and returns at
//! once, and everything that happens afterwards (open, frames, close, faults)
//! is pushed as [`TransportEvent`]s on the channel handed to `connect`.
//!
//! Two implementations ship with the crate:
//! - [`mock::MockTransport`], an in-process server emulation.
//! - [`ws::WsTransport`] (feature `websocket`), backed by tokio-tungstenite.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::auth::AuthHeaders;
use crate::error::PubSubError;

/// In-process server emulation for tests and offline use.
pub mod mock;
/// WebSocket transport.
#[cfg(feature = "websocket")]
pub mod ws;

/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the connection went away without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Everything needed to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Server URL.
    pub url: String,
    /// Values for the `Payload` and `PayloadHMAC` headers.
    pub headers: AuthHeaders,
    /// Session token presented for resumption, already folded into the headers.
    pub session_uuid: Option<String>,
    /// Time allowed for the connection to open.
    pub timeout: Duration,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code, if one was received.
    pub code: Option<u16>,
    /// Close reason text or the fault that ended the connection.
    pub reason: String,
}

impl CloseReason {
    /// A normal closure (code 1000).
    pub fn normal() -> Self {
        Self {
            code: Some(CLOSE_NORMAL),
            reason: String::new(),
        }
    }

    /// A closure without a proper close handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Some(CLOSE_ABNORMAL),
            reason: reason.into(),
        }
    }

    /// Whether the connection ended with a normal closure.
    pub fn is_normal(&self) -> bool {
        self.code == Some(CLOSE_NORMAL)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) if self.reason.is_empty() => write!(f, "connection closed with code {}", code),
            Some(code) => write!(f, "connection closed with code {}: {}", code, self.reason),
            None => write!(f, "connection closed: {}", self.reason),
        }
    }
}

/// What a transport reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open and ready for requests.
    Open,
    /// One inbound text record.
    Text(String),
    /// The connection ended, or the attempt to open it failed.
    Close(CloseReason),
    /// A fault that does not by itself end the connection.
    Error(String),
}

/// A duplex text connection the engine can drive.
pub trait Transport: Send + 'static {
    /// Starts opening a connection. Progress is reported on `events`.
    fn connect(&mut self, request: ConnectRequest, events: mpsc::UnboundedSender<TransportEvent>);

    /// Closes the current connection, if any.
    fn disconnect(&mut self);

    /// Whether requests can be sent right now.
    fn is_connected(&self) -> bool;

    /// Queues one text record for sending.
    fn send(&mut self, text: String) -> Result<(), PubSubError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, request: ConnectRequest, events: mpsc::UnboundedSender<TransportEvent>) {
        (**self).connect(request, events)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&mut self, text: String) -> Result<(), PubSubError> {
        (**self).send(text)
    }
}
