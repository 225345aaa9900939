//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding or encoding host frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{field}` in {event} frame")]
    MissingField { event: String, field: &'static str },

    #[error("invalid {event} payload: {message}")]
    InvalidPayload { event: String, message: String },
}

/// Protocol result type.
pub type Result<T> = std::result::Result<T, ProtocolError>;
