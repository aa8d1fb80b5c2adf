use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Outbound message handed to a transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Sent verbatim
    Text(String),
    /// Encoded as JSON text before sending
    Json(Value),
}

impl Payload {
    /// Convert any serializable value into a payload.
    ///
    /// Values that serialize to a JSON string are sent as plain text, everything
    /// else is kept as structured JSON.
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(match serde_json::to_value(value)? {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        })
    }

    /// Render the payload as wire text.
    pub fn encode(&self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Json(value) => Ok(serde_json::to_string(value)?),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Inbound message delivered to the message handler.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Text that decoded as JSON
    Json(Value),
    /// Text that did not decode, passed through unchanged
    Text(String),
}

impl Inbound {
    /// Best-effort decode of wire text. Never fails.
    #[must_use]
    pub fn decode(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%text, error = %e, "Passing through non-JSON message");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                Self::Text(text)
            }
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// The `type` field of a JSON object message, if any.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.as_json()?.get("type")?.as_str()
    }
}

impl From<Payload> for Inbound {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Self::Text(text),
            Payload::Json(value) => Self::Json(value),
        }
    }
}
