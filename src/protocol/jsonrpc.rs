//! JSON-RPC 2.0 wire types and the structural validator (SPEC_FULL §4.2).
//!
//! `identify` is the pure, total classifier invariant 5 requires: the same
//! bytes always decode to the same `(kind, id)` pair. It is deliberately a
//! free function rather than a method on a handle so it has no state to make
//! non-deterministic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// The JSON-RPC 2.0 version string every message must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 error object, as carried in an error response's `error` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Short, human-readable summary.
    pub message: String,
    /// Structured diagnostic payload (SPEC_FULL §6's `data` convention).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The classification of a decoded JSON-RPC message (SPEC_FULL §3).
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    /// Has `method` and a non-null `id`.
    Request {
        /// The JSON-RPC method name.
        method: String,
        /// The request ID (string or number, never null).
        id: Value,
    },
    /// Has `method` and no `id` (or a null `id`).
    Notification {
        /// The JSON-RPC method name.
        method: String,
    },
    /// No `method`; carries `result` and not `error`.
    SuccessResponse {
        /// The response ID.
        id: Value,
    },
    /// No `method`; carries `error` and not `result`.
    ErrorResponse {
        /// The response ID, when one could be determined.
        id: Option<Value>,
    },
}

impl MessageKind {
    /// The method name, if this message carries one.
    pub fn method(&self) -> Option<&str> {
        match self {
            MessageKind::Request { method, .. } => Some(method),
            MessageKind::Notification { method } => Some(method),
            MessageKind::SuccessResponse { .. } | MessageKind::ErrorResponse { .. } => None,
        }
    }

    /// The message's ID, if any could be determined.
    pub fn id(&self) -> Option<&Value> {
        match self {
            MessageKind::Request { id, .. } | MessageKind::SuccessResponse { id } => Some(id),
            MessageKind::ErrorResponse { id } => id.as_ref(),
            MessageKind::Notification { .. } => None,
        }
    }
}

fn id_is_valid_shape(id: &Value) -> bool {
    matches!(id, Value::String(_) | Value::Number(_) | Value::Null)
}

/// Validate JSON-RPC 2.0 structure for a single decoded message and
/// classify it. Pure and total over `Value` inputs (invariant 5): the same
/// input always yields the same `Ok`/`Err` outcome.
///
/// A top-level JSON array (a batch request) is rejected with
/// `InvalidRequest` rather than silently processed as its first element;
/// batch support is explicitly out of scope (SPEC_FULL §9 Open Questions).
pub fn identify(value: &Value) -> Result<MessageKind, ProtocolError> {
    let obj = match value {
        Value::Object(map) => map,
        Value::Array(_) => {
            return Err(ProtocolError::InvalidRequest(
                "batch JSON-RPC requests are not supported".to_string(),
            ))
        }
        _ => {
            return Err(ProtocolError::InvalidRequest(
                "message must be a JSON object".to_string(),
            ))
        }
    };

    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(_) => {
            return Err(ProtocolError::InvalidRequest(
                "jsonrpc field must equal \"2.0\"".to_string(),
            ))
        }
        None => {
            return Err(ProtocolError::InvalidRequest(
                "missing jsonrpc field".to_string(),
            ))
        }
    }

    if let Some(id_val) = obj.get("id") {
        if !id_is_valid_shape(id_val) {
            return Err(ProtocolError::InvalidRequest(
                "id must be a string, number, or null".to_string(),
            ));
        }
    }

    let has_method = obj.contains_key("method");
    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");

    if has_method {
        if has_result || has_error {
            return Err(ProtocolError::InvalidRequest(
                "a message with method must not carry result or error".to_string(),
            ));
        }

        let method = match obj.get("method") {
            Some(Value::String(m)) if !m.is_empty() => m.clone(),
            Some(Value::String(_)) => {
                return Err(ProtocolError::InvalidRequest(
                    "method name must not be empty".to_string(),
                ))
            }
            _ => {
                return Err(ProtocolError::InvalidRequest(
                    "method must be a string".to_string(),
                ))
            }
        };

        if method.starts_with(crate::protocol::RESERVED_METHOD_PREFIX) {
            return Err(ProtocolError::InvalidRequest(format!(
                "method names beginning with \"{}\" are reserved",
                crate::protocol::RESERVED_METHOD_PREFIX
            )));
        }

        // `params`'s shape (object/array/null) is a schema-layer concern,
        // not a structural one: a wrong-typed `params` still has all the
        // envelope fields a request needs, so it's left to schema
        // validation to reject as -32602 (SPEC_FULL §8 S2) rather than
        // rejected here as -32600, which would make that schema rule
        // unreachable.

        return match obj.get("id") {
            None | Some(Value::Null) => Ok(MessageKind::Notification { method }),
            Some(id) => Ok(MessageKind::Request {
                method,
                id: id.clone(),
            }),
        };
    }

    // No method: this is a response.
    if has_result && has_error {
        return Err(ProtocolError::InvalidRequest(
            "a response must not carry both result and error".to_string(),
        ));
    }

    if has_result {
        return match obj.get("id") {
            Some(id) if !id.is_null() => Ok(MessageKind::SuccessResponse { id: id.clone() }),
            _ => Err(ProtocolError::InvalidRequest(
                "a success response must have a non-null id".to_string(),
            )),
        };
    }

    if has_error {
        let error_obj = obj.get("error").and_then(Value::as_object).ok_or_else(|| {
            ProtocolError::InvalidRequest("error field must be an object".to_string())
        })?;
        let code_ok = matches!(error_obj.get("code"), Some(Value::Number(_)));
        let message_ok = matches!(error_obj.get("message"), Some(Value::String(_)));
        if !code_ok || !message_ok {
            return Err(ProtocolError::InvalidRequest(
                "error object requires numeric code and string message".to_string(),
            ));
        }
        let id = obj.get("id").filter(|v| !v.is_null()).cloned();
        return Ok(MessageKind::ErrorResponse { id });
    }

    Err(ProtocolError::InvalidRequest(
        "message is neither a request, notification, nor response".to_string(),
    ))
}

/// Validate structure without needing the classification. Thin wrapper over
/// [`identify`] for callers (e.g. transport read/write paths) that only need
/// a pass/fail answer.
pub fn validate_structure(value: &Value) -> Result<(), ProtocolError> {
    identify(value).map(|_| ())
}
