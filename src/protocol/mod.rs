//! JSON-RPC 2.0 wire types and the structural validator shared by the
//! transport and middleware layers.
//!
//! # Canonical Import Path
//!
//! ```no_run
//! use cowgnition::protocol::{MessageKind, identify, validate_structure};
//! ```

mod jsonrpc;

pub use jsonrpc::{
    identify, validate_structure, JsonRpcErrorObject, MessageKind, JSONRPC_VERSION,
};

/// Reserved method-name prefix per JSON-RPC 2.0 §6: method names beginning
/// with `rpc.` are reserved for the spec itself and must be rejected.
pub const RESERVED_METHOD_PREFIX: &str = "rpc.";
