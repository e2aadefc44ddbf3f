//! # Core
//!
//! The session engine and the pieces it is built from:
//!
//! - **`sequencer`**: atomic request sequence numbers.
//! - **`pending`**: requests in flight, each with a cancellable timeout.
//! - **`reconnect`**: exponential backoff between reconnect attempts.
//! - **`registry`**: subscribed channels and their message handlers.
//! - **`engine`**: the actor that owns all of the above plus the transport.

/// The session engine actor and its handle.
pub mod engine;
/// Pending request table.
pub mod pending;
/// Reconnect backoff policy.
pub mod reconnect;
/// Channel handler registry.
pub mod registry;
/// Request sequence numbers.
pub mod sequencer;

pub use engine::{EngineState, PublishHandle, SessionEngine, SessionEvent};
pub use pending::{PendingRequest, PendingRequestTable};
pub use reconnect::{ReconnectPolicy, ReconnectState};
pub use registry::{ChannelRegistry, MessageHandler};
pub use sequencer::SequenceAllocator;
