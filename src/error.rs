//! Error types for CowGnition
//!
//! Defines the full error taxonomy used throughout the server, using
//! `thiserror` for ergonomic propagation. Grouped by subsystem so call
//! sites can match precisely while still propagating with `?`.

use thiserror::Error;

/// Transport-level failures (§4.1).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The transport has been closed, or the peer closed the stream.
    #[error("transport closed")]
    Closed,

    /// The caller's context was cancelled before the operation completed.
    #[error("operation timed out")]
    Timeout,

    /// A single message exceeded the configured size cap.
    #[error("message too large: {size} bytes exceeds cap of {cap} bytes")]
    MessageTooLarge {
        /// Size of the offending message in bytes.
        size: usize,
        /// Configured cap in bytes.
        cap: usize,
    },

    /// The bytes read were not valid JSON.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The bytes parsed as JSON but violated JSON-RPC 2.0 structure.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A write completed with fewer bytes than requested.
    #[error("short write")]
    ShortWrite,

    /// Underlying I/O failure not covered by the above.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Schema-validation failures (§4.3).
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The named schema definition does not exist and no fallback resolved.
    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    /// The schema document could not be loaded from any configured source.
    #[error("failed to load schema: {0}")]
    SchemaLoadFailed(String),

    /// The loaded schema document failed to compile.
    #[error("failed to compile schema: {0}")]
    SchemaCompileFailed(String),

    /// The input failed validation against the resolved schema.
    #[error("validation failed at {instance_path}: {message}")]
    ValidationFailed {
        /// Human-readable description of the violation.
        message: String,
        /// JSON pointer into the instance where the violation occurred.
        instance_path: String,
        /// JSON pointer into the schema that rejected the instance.
        schema_path: String,
        /// Extra causes surfaced by the compiler, if any.
        causes: Vec<String>,
        /// A short, size-bounded preview of the offending instance.
        preview: String,
    },

    /// The input was not valid JSON at all.
    #[error("invalid JSON format: {0}")]
    InvalidJsonFormat(String),
}

/// RTM authentication failures (§4.6, §4.7).
#[derive(Error, Debug)]
pub enum AuthError {
    /// `CompleteAuthFlow` was called with a frob that has no matching flow.
    #[error("no pending auth flow for frob")]
    FrobNotFound,

    /// The flow existed but is older than the 24-hour validity window.
    #[error("auth flow expired")]
    ExpiredFlow,

    /// Exchanging the frob for a token failed.
    #[error("token fetch failed: {0}")]
    TokenFetchFailed(String),

    /// A stored token failed RTM's verification call and was discarded.
    #[error("token verification failed: {0}")]
    TokenVerifyFailed(String),

    /// No token storage backend is available (keychain, file, or none all failed).
    #[error("token storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The OS keychain rejected an operation.
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// JSON-RPC 2.0 structural violations, mapped to the five standard codes (§6).
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Malformed JSON. Maps to `-32700`.
    #[error("parse error")]
    ParseError,

    /// Structural or schema violation outside `/params`. Maps to `-32600`.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler registered for the method. Maps to `-32601`.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Schema violation inside `/params`. Maps to `-32602`.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Validator not initialized, marshalling failure, or missing schema in strict mode. Maps to `-32603`.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ProtocolError {
    /// The JSON-RPC 2.0 error code for this variant, per SPEC_FULL §6.
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::ParseError => -32700,
            ProtocolError::InvalidRequest(_) => -32600,
            ProtocolError::MethodNotFound(_) => -32601,
            ProtocolError::InvalidParams(_) => -32602,
            ProtocolError::InternalError(_) => -32603,
        }
    }
}

/// Top-level error type for CowGnition operations.
#[derive(Error, Debug)]
pub enum CowGnitionError {
    /// Transport-layer failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Schema-validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// RTM authentication failure.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// JSON-RPC structural failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// JSON serialization/deserialization error not already classified above.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error (schema remote loading, RTM REST calls, auth callback exchange).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Underlying I/O failure not already classified above.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide `Result` alias. Library code always returns this, never
/// `anyhow::Result`, because the JSON-RPC error codes callers depend on
/// are derived mechanically from `CowGnitionError`'s variants.
pub type Result<T> = std::result::Result<T, CowGnitionError>;
