//! # Wire Protocol
//!
//! Typed views of everything that travels on the socket. Outbound requests are
//! [`RequestFrame`]s; every inbound record is turned into exactly one
//! [`Frame`] by [`classify`], so the engine matches exhaustively instead of
//! probing optional keys.

/// Inbound record classification.
pub mod classifier;
/// Frame, action and status code types.
pub mod frames;

pub use classifier::classify;
pub use frames::{Action, ErrorResponse, Frame, PubSubMessage, RequestFrame, Response, ResponseCode};
