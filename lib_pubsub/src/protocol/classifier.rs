use serde_json::Value;

use crate::error::{PubSubError, CODE_MALFORMED};
use crate::protocol::frames::{Action, ErrorResponse, Frame, PubSubMessage, Response, ResponseCode};

const MISSING_ACTION: &str = "Missing action from record";
const UNKNOWN_ACTION: &str = "Unknown action or bad record format from server";
const UNKNOWN_CODE: &str = "Unknown response code";
const MISSING_CODE: &str = "Missing code from record";

/// Turns one raw inbound text record into a [`Frame`].
///
/// The record is sorted on two axes: whether its `action` is one the protocol
/// knows, and whether it carries a numeric `code`. Only the asynchronous `msg`
/// push may come without a code.
pub fn classify(raw: &str) -> Frame {
    let record: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            return Frame::Malformed(PubSubError::Malformed(format!("Cannot construct JSON from record: {}", e)));
        }
    };

    let action = match record.get("action").and_then(Value::as_str) {
        Some(action) => action,
        None => return synthetic(MISSING_ACTION),
    };
    let Some(action) = Action::from_wire(action) else {
        return synthetic(UNKNOWN_ACTION);
    };

    match record.get("code").and_then(Value::as_i64) {
        Some(code) => match ResponseCode::from_code(code) {
            None => synthetic(UNKNOWN_CODE),
            Some(ResponseCode::Success) => match serde_json::from_value::<Response>(record) {
                Ok(response) => Frame::Response(response),
                Err(e) => Frame::Malformed(PubSubError::Protocol(format!(
                    "Bad {} response: {}",
                    action.as_str(),
                    e
                ))),
            },
            Some(_) => match serde_json::from_value::<ErrorResponse>(record) {
                Ok(error) => Frame::ErrorResponse(error),
                Err(e) => Frame::Malformed(PubSubError::Protocol(format!("Bad error response: {}", e))),
            },
        },
        None if action == Action::Message => match serde_json::from_value::<PubSubMessage>(record) {
            Ok(message) => Frame::Message(message),
            Err(e) => Frame::Malformed(PubSubError::Protocol(format!("Bad message record: {}", e))),
        },
        None => synthetic(MISSING_CODE),
    }
}

fn synthetic(message: &str) -> Frame {
    Frame::ErrorResponse(ErrorResponse::synthetic(CODE_MALFORMED, message))
}
