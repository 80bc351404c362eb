//! Kea control channel command and response types.
//!
//! Commands follow the control agent JSON convention: a `command` name,
//! an optional `service` list naming the daemons the agent should relay
//! to, and command-specific `arguments`. The agent answers with a list
//! of response objects, one per addressed daemon.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RoostError};

/// Command completed.
pub const RESULT_SUCCESS: i64 = 0;
/// Command failed.
pub const RESULT_ERROR: i64 = 1;
/// The daemon does not implement the command.
pub const RESULT_UNSUPPORTED: i64 = 2;
/// Command succeeded but matched nothing.
pub const RESULT_EMPTY: i64 = 3;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeaCommand {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl KeaCommand {
    pub fn new(command: &str, service: Vec<String>, arguments: Option<Value>) -> Self {
        Self {
            command: command.to_string(),
            service,
            arguments,
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeaResponse {
    pub result: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl KeaResponse {
    /// Error and unsupported statuses fail a change; empty does not.
    pub fn is_error(&self) -> bool {
        self.result == RESULT_ERROR || self.result == RESULT_UNSUPPORTED
    }

    /// Status portion of the failure message attributed to `daemon`.
    pub fn status_detail(&self, daemon: &str) -> String {
        format!(
            "error status ({}) returned by Kea {} daemon with text: '{}'",
            self.result,
            daemon,
            self.text.as_deref().unwrap_or("")
        )
    }
}

/// Decode a control agent response body for `command`. The agent sends a
/// list of response objects; a bare object is accepted as a one-element
/// list since some deployments unwrap single-daemon answers.
pub fn decode_response_list(command: &str, body: &str) -> Result<Vec<KeaResponse>> {
    let value: Value = serde_json::from_str(body).map_err(|e| RoostError::MalformedResponse {
        command: command.to_string(),
        reason: e.to_string(),
    })?;
    let list = match value {
        Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| RoostError::MalformedResponse {
                command: command.to_string(),
                reason: e.to_string(),
            })?
        }
        Value::Object(_) => {
            let single: KeaResponse =
                serde_json::from_value(value).map_err(|e| RoostError::MalformedResponse {
                    command: command.to_string(),
                    reason: e.to_string(),
                })?;
            vec![single]
        }
        other => {
            return Err(RoostError::MalformedResponse {
                command: command.to_string(),
                reason: format!("expected a response list, got {other}"),
            })
        }
    };
    Ok(list)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
