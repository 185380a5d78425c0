//! CowGnition - MCP server entry point.
//!
//! Wires the NDJSON-over-stdio transport through the middleware chain (with
//! schema validation installed) into a terminal handler. Method dispatch
//! (the MCP tools/resources/prompts registry itself) is an external
//! collaborator consumed via its own crate, not part of this core.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cowgnition::config::SchemaConfig;
use cowgnition::middleware::validation::{ValidationMiddleware, ValidationOptions};
use cowgnition::middleware::{Context, Middleware, MiddlewareChain, NextFn};
use cowgnition::protocol::identify;
use cowgnition::schema::SchemaRegistry;
use cowgnition::transport::ndjson::NdjsonTransport;
use cowgnition::transport::Transport;
use cowgnition::Result;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let schema_config = SchemaConfig {
        schema_override_uri: std::env::var("COWGNITION_SCHEMA_URI").ok(),
    };
    let registry = Arc::new(SchemaRegistry::load(&schema_config, None).await?);
    let validation: Arc<dyn Middleware> = Arc::new(ValidationMiddleware::new(
        Some(Arc::clone(&registry)),
        ValidationOptions::default(),
    ));

    let chain = MiddlewareChain::new(vec![validation], terminal_handler());

    let transport = NdjsonTransport::new(tokio::io::stdin(), tokio::io::stdout());
    run_server(&transport, &chain).await?;
    Ok(())
}

/// Read-process-write loop: one message in, at most one message out, until
/// the transport closes.
async fn run_server(transport: &dyn Transport, chain: &MiddlewareChain) -> Result<()> {
    loop {
        let ctx = Context::new(tokio_util::sync::CancellationToken::new());
        let message = match transport.read_message(&ctx.cancellation).await {
            Ok(m) => m,
            Err(e) => {
                tracing::info!(error = %e, "transport closed, shutting down");
                return Ok(());
            }
        };

        let bytes = serde_json::to_vec(&message)?;
        let cancellation = ctx.cancellation.clone();
        match chain.process(ctx, bytes).await {
            Ok(Some(response_bytes)) => {
                let response: Value = serde_json::from_slice(&response_bytes)?;
                transport.write_message(&response, &cancellation).await?;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "chain processing failed");
            }
        }
    }
}

/// Placeholder terminal handler: the real MCP method registry (tools,
/// resources, prompts) is wired in by the host application. Requests get a
/// `method not found` response; notifications are dropped.
fn terminal_handler() -> NextFn {
    Arc::new(|_ctx, bytes| {
        Box::pin(async move {
            let value: Value = serde_json::from_slice(&bytes)?;
            match identify(&value) {
                Ok(kind) if kind.id().is_some() => {
                    let response = json!({
                        "jsonrpc": "2.0",
                        "id": kind.id(),
                        "error": {
                            "code": -32601,
                            "message": "method not found",
                        }
                    });
                    Ok(Some(serde_json::to_vec(&response)?))
                }
                _ => Ok(None),
            }
        })
    })
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cowgnition=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
