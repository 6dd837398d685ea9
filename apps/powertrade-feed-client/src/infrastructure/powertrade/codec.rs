//! Feed Frame Codec
//!
//! Decodes PowerTrade feed text frames into [`FeedMessage`]s.
//!
//! Every frame is a JSON object carrying exactly one discriminant key:
//!
//! ```json
//! {"top_of_book": {"timestamp": "...", "tradeable_entity_id": "1", ...}}
//! {"reference_price": {"timestamp": "...", "price": "12345", ...}}
//! {"last_trade_price": {"timestamp": "...", "price": "none", ...}}
//! ```
//!
//! Other top-level keys are ignored. Classification happens on the raw
//! `serde_json::Value` before the sub-payload is decoded so that a frame with
//! no (or several) discriminants is reported distinctly from a malformed one.

use serde_json::{Map, Value};

use crate::domain::streaming::{FeedKind, FeedMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object.
    #[error("expected JSON object, got {0}")]
    NotAnObject(&'static str),

    /// No discriminant key present.
    #[error("unknown message (keys: {keys:?})")]
    UnknownKind {
        /// Top-level keys found.
        keys: Vec<String>,
    },

    /// More than one discriminant key present.
    #[error("ambiguous message, multiple feed kinds: {0:?}")]
    AmbiguousKind(Vec<FeedKind>),

    /// Sub-payload is missing required fields or has the wrong shape.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        /// Feed kind being decoded.
        kind: FeedKind,
        /// Underlying error.
        source: serde_json::Error,
    },
}

impl CodecError {
    /// Whether the frame parsed but was not a recognizable feed message.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(
            self,
            Self::NotAnObject(_) | Self::UnknownKind { .. } | Self::AmbiguousKind(_)
        )
    }
}

/// JSON codec for PowerTrade feed frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the text is not JSON, one of the
    /// unknown-message variants if it cannot be classified, or
    /// [`CodecError::Payload`] if the sub-payload does not decode.
    pub fn decode(&self, text: &str) -> Result<FeedMessage, CodecError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut object) = value else {
            return Err(CodecError::NotAnObject(json_type(&value)));
        };

        let kind = classify(&object)?;
        let payload = object.remove(kind.as_str()).unwrap_or(Value::Null);
        let wrap = |source| CodecError::Payload { kind, source };

        Ok(match kind {
            FeedKind::TopOfBook => {
                FeedMessage::TopOfBook(serde_json::from_value(payload).map_err(wrap)?)
            }
            FeedKind::ReferencePrice => {
                FeedMessage::ReferencePrice(serde_json::from_value(payload).map_err(wrap)?)
            }
            FeedKind::LastTradePrice => {
                FeedMessage::LastTradePrice(serde_json::from_value(payload).map_err(wrap)?)
            }
        })
    }
}

fn classify(object: &Map<String, Value>) -> Result<FeedKind, CodecError> {
    let present: Vec<FeedKind> = FeedKind::ALL
        .into_iter()
        .filter(|kind| object.contains_key(kind.as_str()))
        .collect();

    match present.as_slice() {
        [kind] => Ok(*kind),
        [] => Err(CodecError::UnknownKind {
            keys: object.keys().cloned().collect(),
        }),
        _ => Err(CodecError::AmbiguousKind(present)),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
