//! JMRI JSON protocol commands.
//!
//! The connection layer treats these as opaque payloads; this module only builds
//! them. See the JMRI JSON servlet documentation for the message format.

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// A JMRI JSON command: `{"type": ..., "method": ..., "data": ..., "list": ...}`.
///
/// Absent optional fields are omitted from the encoded text.
///
/// # Example
///
/// ```
/// use jmri_ws_client::commands::Command;
///
/// let command = Command::builder().kind("turnout").method("get").build();
/// assert_eq!(command.to_json().unwrap(), r#"{"type":"turnout","method":"get"}"#);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Command {
    /// Object type the command addresses, such as `ping`, `turnout` or `power`
    #[serde(rename = "type")]
    #[builder(into)]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Requests a listing of every object of `type`
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub list: Option<String>,
}

impl Command {
    /// The connectivity check command, `{"type":"ping"}`.
    #[must_use]
    pub fn ping() -> Self {
        Self::builder().kind("ping").build()
    }

    /// Encode as JSON text ready for the wire.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Whether `value` looks like a JMRI command: an object with a string `type`.
#[must_use]
pub fn is_command(value: &Value) -> bool {
    value.get("type").is_some_and(Value::is_string)
}

/// Encoded ping command.
pub fn ping_json() -> Result<String> {
    Command::ping().to_json()
}
