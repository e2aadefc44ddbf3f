//! # lib_pubsub
//!
//! Client side engine for a persistent publish/subscribe session carried over
//! a single WebSocket. The crate is split by folder, and each folder sits
//! behind a cargo feature of the same spirit:
//!
//! - **`auth`**: project key parsing and the `Payload` / `PayloadHMAC`
//!   connection headers.
//! - **`configs`**: connection options, layered from defaults, a JSON5 file and
//!   the environment.
//! - **`protocol`**, **`core`**, **`transport`** (feature `engine`): the frame
//!   classifier, the pending request table, the reconnect policy, the session
//!   engine actor and the in-process mock server transport.
//! - **`transport::ws`** (feature `websocket`): the tokio-tungstenite transport.
//! - **`loggers`**: fern based console and file logging.

#![forbid(unsafe_code)]

/// Project keys and connection header computation.
#[cfg(feature = "auth")]
pub mod auth;
/// Connection options and their loading.
#[cfg(feature = "configs")]
pub mod configs;
/// The session engine and its building blocks.
#[cfg(feature = "engine")]
pub mod core;
/// Error taxonomy shared by the engine and its transports.
#[cfg(feature = "engine")]
pub mod error;
/// Console and file logging setup.
#[cfg(feature = "loggers")]
pub mod loggers;
/// Wire frames and the inbound frame classifier.
#[cfg(feature = "engine")]
pub mod protocol;
/// The duplex transport seam with its WebSocket and mock implementations.
#[cfg(feature = "engine")]
pub mod transport;

// --- Public API Re-exports ---
#[cfg(feature = "auth")]
pub use auth::{AuthError, AuthHeaders, AuthKey, Authenticator, Permission};
#[cfg(feature = "configs")]
pub use configs::options::{load_options, ConfigError, PubSubOptions};
#[cfg(feature = "engine")]
pub use crate::core::{EngineState, MessageHandler, PublishHandle, SessionEngine, SessionEvent};
#[cfg(feature = "engine")]
pub use error::PubSubError;
#[cfg(feature = "loggers")]
pub use loggers::logger::setup_logging;
#[cfg(feature = "engine")]
pub use protocol::{ErrorResponse, Frame, PubSubMessage, Response, ResponseCode};
#[cfg(feature = "engine")]
pub use transport::mock::{MockServer, MockTransport};
#[cfg(feature = "websocket")]
pub use transport::ws::WsTransport;
