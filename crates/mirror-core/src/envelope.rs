//! Notification envelope validation and the sync response body.
//!
//! Envelopes arrive as untrusted JSON. Validation never fails loudly: it
//! collects every problem into a list of human-readable strings, and the
//! caller treats a non-empty list as an unprocessable request.

use crate::event::{ChangeEvent, ChangeKind};
use crate::path::normalize_path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys every envelope must carry.
pub const REQUIRED_KEYS: [&str; 4] = ["kind", "sourcePath", "isDirectory", "timestamp"];

/// Validate an inbound envelope, returning every schema violation found.
pub fn validate(envelope: &Value) -> Vec<String> {
    let Some(obj) = envelope.as_object() else {
        return vec!["envelope is not a JSON object".to_string()];
    };

    let mut errors = Vec::new();
    for key in REQUIRED_KEYS {
        if !obj.contains_key(key) {
            errors.push(format!("{} key not found", key));
        }
    }

    let kind = obj
        .get("kind")
        .and_then(Value::as_str)
        .and_then(ChangeKind::from_wire);
    if kind.is_none() {
        let choices: Vec<&str> = ChangeKind::ALL.iter().map(|k| k.as_str()).collect();
        errors.push(format!(
            "kind value is invalid. Valid choices: {}",
            choices.join(", ")
        ));
    }

    match obj.get("sourcePath") {
        Some(Value::String(path)) => check_path("sourcePath", path, &mut errors),
        Some(_) => errors.push("sourcePath must be a string".to_string()),
        None => {}
    }

    if obj.get("isDirectory").is_some_and(|v| !v.is_boolean()) {
        errors.push("isDirectory must be a boolean".to_string());
    }

    if obj.get("timestamp").is_some_and(|v| v.as_u64().is_none()) {
        errors.push("timestamp must be a non-negative integer".to_string());
    }

    let dest = obj.get("destPath");
    match (kind, dest) {
        (Some(ChangeKind::Moved), Some(Value::String(path))) if !path.is_empty() => {
            check_path("destPath", path, &mut errors);
        }
        (Some(ChangeKind::Moved), _) => {
            errors.push("destPath is required for moved events".to_string());
        }
        // Older senders put an empty destPath on non-move events.
        (_, None) | (_, Some(Value::Null)) => {}
        (_, Some(Value::String(path))) if path.is_empty() => {}
        (Some(other), Some(_)) => {
            errors.push(format!("destPath is only allowed for moved events, got {}", other));
        }
        (None, Some(_)) => {}
    }

    errors
}

fn check_path(key: &str, path: &str, errors: &mut Vec<String>) {
    if let Err(e) = normalize_path(path) {
        errors.push(format!("{} is invalid: {}", key, e));
    }
}

/// Validate and convert an envelope into a `ChangeEvent`.
pub fn parse(envelope: &Value) -> Result<ChangeEvent, Vec<String>> {
    let errors = validate(envelope);
    if !errors.is_empty() {
        return Err(errors);
    }

    // validate() guarantees every field below is present and well-typed.
    let field = |key: &str| envelope.get(key).cloned().unwrap_or(Value::Null);
    let kind = field("kind")
        .as_str()
        .and_then(ChangeKind::from_wire)
        .ok_or_else(|| vec!["kind value is invalid".to_string()])?;
    let source = field("sourcePath").as_str().unwrap_or_default().to_string();
    let dest = field("destPath").as_str().map(str::to_string);
    let is_directory = field("isDirectory").as_bool().unwrap_or(false);
    let timestamp = field("timestamp").as_u64().unwrap_or(0);

    ChangeEvent::new(kind, source, dest, is_directory, timestamp).map_err(|e| vec![e.to_string()])
}

/// Body of a `REQSYNC` response.
///
/// Exactly one of `ack` (ack mode) or `data` (echo mode) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SyncResponse {
    /// Ack-mode response stamped with the processing time.
    pub fn ack(errors: Vec<String>, at: f64) -> Self {
        Self {
            errors,
            ack: Some(at),
            data: None,
        }
    }

    /// Echo-mode response returning the envelope as received.
    pub fn echo(errors: Vec<String>, data: Value) -> Self {
        Self {
            errors,
            ack: None,
            data: Some(data),
        }
    }
}
