//! CowGnition - an MCP server exposing Remember The Milk as tools, resources,
//! and prompts over JSON-RPC 2.0.
//!
//! # Architecture
//!
//! - `transport`: framed message I/O (NDJSON-over-stdio in production, an
//!   in-memory paired transport for tests)
//! - `protocol`: JSON-RPC 2.0 message classification and structural checks
//! - `schema`: JSON-Schema 2020-12 loading, compilation, and validation
//! - `middleware`: the composable request/response chain, including the
//!   schema-validation middleware
//! - `auth`: the RTM three-legged authentication state machine and token
//!   storage backends
//! - `config`: plain configuration structs consumed at the core's interface
//! - `error`: the crate-wide error taxonomy and `Result` alias
//!
//! # Example
//!
//! ```no_run
//! use cowgnition::middleware::{Context, MiddlewareChain};
//! use cowgnition::transport::{ndjson::NdjsonTransport, Transport};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> cowgnition::error::Result<()> {
//! let transport = NdjsonTransport::new(tokio::io::stdin(), tokio::io::stdout());
//! let chain = MiddlewareChain::new(vec![], Arc::new(|_ctx, bytes| {
//!     Box::pin(async move { Ok(Some(bytes)) })
//! }));
//! let ctx = Context::new(CancellationToken::new());
//! let message = transport.read_message(&ctx.cancellation).await?;
//! chain.process(ctx, serde_json::to_vec(&message)?).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod protocol;
pub mod schema;
pub mod transport;

pub use config::{AuthOptions, RtmConfig, SchemaConfig};
pub use error::{CowGnitionError, Result};
pub use middleware::{Context, Middleware, MiddlewareChain};
pub use protocol::{identify, MessageKind};
pub use schema::SchemaRegistry;
pub use transport::Transport;
