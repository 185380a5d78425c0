//! Validation middleware: the hardest part (SPEC_FULL §4.5).
//!
//! Identifies messages, picks the right schema (with fallbacks), enforces
//! JSON-RPC 2.0 structure, and crafts JSON-RPC error responses with
//! human-readable suggestions. Grounded on the MCP-specific
//! validation-middleware shape found in the `other_examples/` reference
//! pack (`turbomcp-server`'s and `familiar-core`'s validation middleware
//! files) for the "identify -> resolve schema -> validate -> call next ->
//! validate outgoing" pipeline, and on the teacher's `mcp/client.rs`
//! `dispatch_message` branching for message classification.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CowGnitionError, ProtocolError, Result, ValidationError};
use crate::middleware::{Context, Middleware, NextFn};
use crate::protocol::identify;
use crate::schema::SchemaRegistry;

mod suggest;

/// Configuration for [`ValidationMiddleware`] (SPEC_FULL §4.5 Options table).
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// If false, the middleware is a no-op pass-through.
    pub enabled: bool,
    /// Method names whose incoming messages bypass schema validation.
    pub skip_types: HashSet<String>,
    /// True: incoming validation failures produce a JSON-RPC error
    /// response. False: log and continue.
    pub strict_mode: bool,
    /// If true, validate the terminal handler's response before returning it.
    pub validate_outgoing: bool,
    /// True: outgoing validation failures replace the response. False: log
    /// and pass through.
    pub strict_outgoing: bool,
    /// If true, record per-message validation latency at debug level.
    pub measure_performance: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_types: HashSet::new(),
            strict_mode: true,
            validate_outgoing: false,
            strict_outgoing: false,
            measure_performance: false,
        }
    }
}

/// The validation middleware itself.
pub struct ValidationMiddleware {
    registry: Option<Arc<SchemaRegistry>>,
    options: ValidationOptions,
}

impl ValidationMiddleware {
    /// Build a validation middleware over a schema registry. `registry`
    /// may be `None` to exercise the "validator not yet initialized" fast
    /// path (step 1 of the pipeline).
    pub fn new(registry: Option<Arc<SchemaRegistry>>, options: ValidationOptions) -> Self {
        Self { registry, options }
    }

    fn resolve_incoming_schema(&self, registry: &SchemaRegistry, hint: &str) -> Option<String> {
        resolve_incoming_chain(hint)
            .into_iter()
            .find(|name| registry.has_schema(name))
    }

    /// Resolve the outgoing schema for a response, and whether it applies
    /// to the whole envelope (`jsonrpc`/`id`/`result`) or just the `result`
    /// payload (method-specific and structural result shapes target only
    /// the payload; the generic envelope schemas target the whole message).
    fn resolve_outgoing_schema(
        &self,
        registry: &SchemaRegistry,
        method: Option<&str>,
        response: &Value,
    ) -> Option<(String, bool)> {
        if let Some(method) = method {
            let specific = format!("{method}_response");
            if registry.has_schema(&specific) {
                return Some((specific, true));
            }
        }
        let is_tool_result = response
            .get("result")
            .and_then(|r| r.get("content"))
            .map(Value::is_array)
            .unwrap_or(false);
        if is_tool_result && registry.has_schema("CallToolResult") {
            return Some(("CallToolResult".to_string(), true));
        }
        for candidate in ["JSONRPCResponse", "success_response", "base"] {
            if registry.has_schema(candidate) {
                return Some((candidate.to_string(), false));
            }
        }
        None
    }

    fn build_error_response(
        &self,
        id: Option<&Value>,
        protocol_error: &ProtocolError,
        validation_error: Option<&ValidationError>,
    ) -> Vec<u8> {
        let mut data = serde_json::Map::new();
        if let Some(ValidationError::ValidationFailed {
            message,
            instance_path,
            schema_path,
            causes,
            preview: _,
        }) = validation_error
        {
            data.insert("validationPath".to_string(), Value::String(instance_path.clone()));
            data.insert("schemaPath".to_string(), Value::String(schema_path.clone()));
            data.insert("validationError".to_string(), Value::String(message.clone()));
            data.insert(
                "suggestion".to_string(),
                Value::String(suggest::synthesize_suggestion(message, instance_path)),
            );
            for (i, cause) in causes.iter().enumerate() {
                data.insert(format!("context_cause_{i}"), Value::String(cause.clone()));
            }
        }

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id.cloned().unwrap_or(Value::Null),
            "error": {
                "code": protocol_error.code(),
                "message": protocol_error.to_string(),
                "data": if data.is_empty() { Value::Null } else { Value::Object(data) },
            }
        });
        serde_json::to_vec(&body).unwrap_or_default()
    }

    fn instance_path_targets_params(path: &str) -> bool {
        path.starts_with("/params") || path.contains("/params/")
    }

    async fn validate_incoming(
        &self,
        registry: &SchemaRegistry,
        schema_name: &str,
        message: &[u8],
    ) -> std::result::Result<(), ValidationError> {
        match registry.validate(schema_name, message) {
            Ok(()) => Ok(()),
            Err(CowGnitionError::Validation(v)) => Err(v),
            Err(other) => Err(ValidationError::ValidationFailed {
                message: other.to_string(),
                instance_path: String::new(),
                schema_path: String::new(),
                causes: vec![],
                preview: String::new(),
            }),
        }
    }

    fn log_tool_list_diagnostics(&self, registry: &SchemaRegistry, response: &Value) {
        let Some(tools) = response.get("result").and_then(|r| r.get("tools")).and_then(Value::as_array) else {
            return;
        };
        for tool in tools {
            if let Some(name) = tool.get("name").and_then(Value::as_str) {
                if let Err(reason) = registry.validate_name("Tool", name) {
                    tracing::warn!(tool = name, reason, "tool name fails naming convention");
                }
            }
        }
    }
}

/// Incoming schema-resolution fallback chain (SPEC_FULL §4.5.1).
fn resolve_incoming_chain(hint: &str) -> Vec<String> {
    let is_notification = hint.starts_with("notifications/")
        || hint.ends_with("_notification")
        || hint == "notification";
    if is_notification {
        return vec![
            "JSONRPCNotification".to_string(),
            "notification".to_string(),
            "base".to_string(),
        ];
    }

    let looks_like_response = ["Response", "Result", "_response", "_error"]
        .iter()
        .any(|needle| hint.contains(needle));
    if looks_like_response {
        return vec![
            "JSONRPCError".to_string(),
            "JSONRPCResponse".to_string(),
            "success_response".to_string(),
            "error_response".to_string(),
            "base".to_string(),
        ];
    }

    vec![
        hint.to_string(),
        "JSONRPCRequest".to_string(),
        "request".to_string(),
        "base".to_string(),
    ]
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    async fn handle(&self, mut ctx: Context, message: Vec<u8>, next: NextFn) -> Result<Option<Vec<u8>>> {
        // Step 1: fast paths.
        let Some(registry) = &self.registry else {
            return next(ctx, message).await;
        };
        if !self.options.enabled {
            return next(ctx, message).await;
        }

        let start = std::time::Instant::now();

        // Step 2: JSON syntax check.
        let value: Value = match serde_json::from_slice(&message) {
            Ok(v) => v,
            Err(_) => {
                return Ok(Some(self.build_error_response(
                    None,
                    &ProtocolError::ParseError,
                    None,
                )))
            }
        };

        // Step 3: identification.
        let kind = match identify(&value) {
            Ok(k) => k,
            Err(_) => {
                let extracted_id = value.get("id").cloned();
                return Ok(Some(self.build_error_response(
                    extracted_id.as_ref(),
                    &ProtocolError::InvalidRequest("malformed JSON-RPC message".to_string()),
                    None,
                )));
            }
        };

        let method = kind.method().map(str::to_string);
        let id = kind.id().cloned();

        // Step 4: skip check.
        let should_validate = method
            .as_deref()
            .map(|m| !self.options.skip_types.contains(m))
            .unwrap_or(true);

        if should_validate {
            // Step 5: schema resolution.
            let hint = method.clone().unwrap_or_default();
            let schema_name = self.resolve_incoming_schema(registry, &hint);

            match schema_name {
                None => {
                    if self.options.strict_mode {
                        return Ok(Some(self.build_error_response(
                            id.as_ref(),
                            &ProtocolError::InternalError(format!(
                                "no schema resolved for \"{hint}\" and no fallback exists"
                            )),
                            None,
                        )));
                    }
                    tracing::warn!(method = %hint, "no schema resolved; passing through");
                }
                Some(name) => {
                    // Step 6: validate incoming.
                    if let Err(validation_error) =
                        self.validate_incoming(registry, &name, &message).await
                    {
                        if self.options.strict_mode {
                            let targets_params = if let ValidationError::ValidationFailed {
                                instance_path,
                                ..
                            } = &validation_error
                            {
                                Self::instance_path_targets_params(instance_path)
                            } else {
                                false
                            };
                            let protocol_error = if targets_params {
                                ProtocolError::InvalidParams(validation_error.to_string())
                            } else {
                                ProtocolError::InvalidRequest(validation_error.to_string())
                            };
                            return Ok(Some(self.build_error_response(
                                id.as_ref(),
                                &protocol_error,
                                Some(&validation_error),
                            )));
                        }
                        tracing::warn!(error = %validation_error, "incoming validation failed (non-strict)");
                    }
                }
            }
        }

        if self.options.measure_performance {
            tracing::debug!(elapsed_us = start.elapsed().as_micros(), "validation timing");
        }

        // Step 7: store method on context and call next.
        ctx.method = method.clone();
        let response = next(ctx, message).await?;

        let Some(response_bytes) = response else {
            // Notification: no response exists, so outgoing validation is
            // structurally unreachable here (SPEC_FULL §9 Open Question).
            return Ok(None);
        };

        if !self.options.validate_outgoing {
            return Ok(Some(response_bytes));
        }

        // Step 8: validate outgoing.
        let Ok(response_value) = serde_json::from_slice::<Value>(&response_bytes) else {
            return Ok(Some(response_bytes));
        };

        if response_value.get("error").is_some() {
            // Already a JSON-RPC error response; not re-validated.
            return Ok(Some(response_bytes));
        }

        let result_field = response_value.get("result");
        if matches!(result_field, None | Some(Value::Null)) {
            return Ok(Some(response_bytes));
        }

        let Some((schema_name, targets_result)) =
            self.resolve_outgoing_schema(registry, method.as_deref(), &response_value)
        else {
            return Ok(Some(response_bytes));
        };

        if schema_name == "tools/list_response" || method.as_deref() == Some("tools/list") {
            self.log_tool_list_diagnostics(registry, &response_value);
        }

        // Method-specific and structural result schemas (e.g.
        // `tools/list_response`, `CallToolResult`) describe the shape of
        // `result` itself, not the envelope carrying it.
        let target_bytes = if targets_result {
            match serde_json::to_vec(result_field.unwrap()) {
                Ok(bytes) => bytes,
                Err(_) => return Ok(Some(response_bytes)),
            }
        } else {
            response_bytes.clone()
        };

        match registry.validate(&schema_name, &target_bytes) {
            Ok(()) => Ok(Some(response_bytes)),
            Err(CowGnitionError::Validation(validation_error)) => {
                if self.options.strict_outgoing {
                    Ok(Some(self.build_error_response(
                        id.as_ref(),
                        &ProtocolError::InvalidRequest(validation_error.to_string()),
                        Some(&validation_error),
                    )))
                } else {
                    tracing::warn!(error = %validation_error, "outgoing validation failed (non-strict)");
                    Ok(Some(response_bytes))
                }
            }
            Err(_) => Ok(Some(response_bytes)),
        }
    }
}
