use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PubSubError;

/// Actions the server may put in a record's `action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Get the session id.
    SessionUuid,
    /// Subscribe to a channel.
    Subscribe,
    /// Unsubscribe from a channel.
    Unsubscribe,
    /// Unsubscribe from every channel.
    UnsubscribeAll,
    /// List subscriptions.
    Subscriptions,
    /// Publish a message.
    Publish,
    /// Asynchronous message push.
    Message,
    /// The server could not make sense of a request.
    InvalidRequest,
}

impl Action {
    /// The value used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::SessionUuid => "session-uuid",
            Action::Subscribe => "subscribe",
            Action::Unsubscribe => "unsubscribe",
            Action::UnsubscribeAll => "unsubscribe-all",
            Action::Subscriptions => "subscriptions",
            Action::Publish => "pub",
            Action::Message => "msg",
            Action::InvalidRequest => "invalid-request",
        }
    }

    /// Parses a wire value, `None` for anything unknown.
    pub fn from_wire(action: &str) -> Option<Self> {
        match action {
            "session-uuid" => Some(Action::SessionUuid),
            "subscribe" => Some(Action::Subscribe),
            "unsubscribe" => Some(Action::Unsubscribe),
            "unsubscribe-all" => Some(Action::UnsubscribeAll),
            "subscriptions" => Some(Action::Subscriptions),
            "pub" => Some(Action::Publish),
            "msg" => Some(Action::Message),
            "invalid-request" => Some(Action::InvalidRequest),
            _ => None,
        }
    }
}

/// Status codes the server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// The request completed successfully.
    Success = 200,
    /// Malformed JSON, bad attributes or types.
    InvalidRequest = 400,
    /// The connection lacks the permission for the action.
    Unauthorised = 401,
    /// Subscription not found.
    NotFound = 404,
    /// General server error.
    GeneralError = 500,
}

impl ResponseCode {
    /// Parses a numeric status, `None` for codes outside the protocol.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            200 => Some(ResponseCode::Success),
            400 => Some(ResponseCode::InvalidRequest),
            401 => Some(ResponseCode::Unauthorised),
            404 => Some(ResponseCode::NotFound),
            500 => Some(ResponseCode::GeneralError),
            _ => None,
        }
    }

    /// The numeric status.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// A successful reply to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number of the request being answered.
    pub seq: u64,
    /// Action of the request being answered.
    pub action: String,
    /// Status code, always 200 here.
    pub code: u16,
    /// Session id, sent in reply to `session-uuid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Current subscriptions, sent by the subscription actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    /// Generated message id, sent for acknowledged publishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A message pushed on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubMessage {
    /// Message id.
    pub id: String,
    /// Channel the message was published on.
    #[serde(rename = "chan")]
    pub channel: String,
    /// The message text.
    #[serde(rename = "msg")]
    pub payload: String,
    /// Server timestamp.
    #[serde(rename = "time")]
    pub timestamp: String,
}

/// An error reply, or a locally synthesised error for an unusable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Action of the failed request, empty for synthetic errors.
    #[serde(default)]
    pub action: String,
    /// Status code.
    pub code: u16,
    /// Short error message.
    #[serde(default)]
    pub message: String,
    /// Longer explanation.
    #[serde(default)]
    pub details: String,
    /// Sequence number of the failed request, when the server knew it.
    #[serde(default, rename = "seq", skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// The request the server could not process, echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_request: Option<Value>,
}

impl ErrorResponse {
    /// An error produced on the client, never sent by the server.
    pub fn synthetic(code: u16, message: &str) -> Self {
        Self {
            action: String::new(),
            code,
            message: message.to_string(),
            details: String::new(),
            sequence: None,
            bad_request: None,
        }
    }
}

/// The classification of one inbound record.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Successful reply correlated by `seq`.
    Response(Response),
    /// Unsolicited channel message.
    Message(PubSubMessage),
    /// Error reply or locally detected protocol violation.
    ErrorResponse(ErrorResponse),
    /// Undecodable record, or a record missing fields its action requires.
    Malformed(PubSubError),
}

/// Outbound request frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action")]
pub enum RequestFrame {
    /// `{seq, action:"session-uuid"}`
    #[serde(rename = "session-uuid")]
    SessionUuid {
        seq: u64,
    },
    /// `{seq, action:"subscribe", channel}`
    #[serde(rename = "subscribe")]
    Subscribe {
        seq: u64,
        channel: String,
    },
    /// `{seq, action:"unsubscribe", channel}`
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        seq: u64,
        channel: String,
    },
    /// `{seq, action:"unsubscribe-all"}`
    #[serde(rename = "unsubscribe-all")]
    UnsubscribeAll {
        seq: u64,
    },
    /// `{seq, action:"subscriptions"}`
    #[serde(rename = "subscriptions")]
    Subscriptions {
        seq: u64,
    },
    /// `{seq, action:"pub", chan, msg, ack?}`
    #[serde(rename = "pub")]
    Publish {
        seq: u64,
        chan: String,
        msg: String,
        /// Ask the server for the generated message id.
        #[serde(skip_serializing_if = "Option::is_none")]
        ack: Option<bool>,
    },
}

impl RequestFrame {
    /// The request's sequence number.
    pub fn seq(&self) -> u64 {
        match self {
            RequestFrame::SessionUuid { seq }
            | RequestFrame::Subscribe { seq, .. }
            | RequestFrame::Unsubscribe { seq, .. }
            | RequestFrame::UnsubscribeAll { seq }
            | RequestFrame::Subscriptions { seq }
            | RequestFrame::Publish { seq, .. } => *seq,
        }
    }

    /// The request's action.
    pub fn action(&self) -> Action {
        match self {
            RequestFrame::SessionUuid { .. } => Action::SessionUuid,
            RequestFrame::Subscribe { .. } => Action::Subscribe,
            RequestFrame::Unsubscribe { .. } => Action::Unsubscribe,
            RequestFrame::UnsubscribeAll { .. } => Action::UnsubscribeAll,
            RequestFrame::Subscriptions { .. } => Action::Subscriptions,
            RequestFrame::Publish { .. } => Action::Publish,
        }
    }

    /// Serializes the frame to its JSON text.
    pub fn to_json(&self) -> Result<String, PubSubError> {
        Ok(serde_json::to_string(self)?)
    }
}
