//! JSON-Schema 2020-12 loading, compilation, and validation (SPEC_FULL §4.3).
//!
//! Grounded on the `jsonschema::options().with_draft(Draft::Draft202012).build(..)`
//! → `Validator` → `.iter_errors(..)` API shape used in the
//! `decision-gate-mcp` example repo's `validation.rs`, and on that repo's
//! `build_schema_registry()` for the named-registry-over-compiled-schemas
//! concept. Imported as a pack enrichment: the teacher has no JSON-Schema
//! dependency of its own.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use jsonschema::{Draft, Validator};
use regex::Regex;
use serde_json::Value;

use crate::config::SchemaConfig;
use crate::error::{Result, ValidationError};

/// The embedded base schema document, used when no override/local/remote
/// source is configured or available.
const EMBEDDED_SCHEMA_JSON: &str = include_str!("base_schema.json");

const PREVIEW_BYTES: usize = 100;

/// Default name pattern applied when a definition carries no
/// `x-namePattern` annotation (SPEC_FULL §9 Open Question decision).
const DEFAULT_NAME_PATTERN: &str = "^[a-zA-Z][a-zA-Z0-9_]*$";
const DEFAULT_NAME_MIN_LEN: usize = 1;
const DEFAULT_NAME_MAX_LEN: usize = 128;

/// Observable attributes of a loaded/compiled schema registry (SPEC_FULL §3).
#[derive(Debug, Clone)]
pub struct RegistryDescription {
    /// Time spent loading the raw document from its source.
    pub load_duration: Duration,
    /// Time spent compiling the definitions known at construction time.
    pub compile_duration: Duration,
    /// Names of definitions known at construction time.
    pub known_definitions: Vec<String>,
}

/// Where the schema document was loaded from, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// `file://` or `https://` override URI from [`SchemaConfig`].
    Override(String),
    /// The document built into the binary.
    Embedded,
    /// A local filesystem path.
    LocalFile(PathBuf),
    /// A remote URL fetched over HTTP.
    Remote(String),
}

/// A loaded, compiled, immutable JSON-Schema registry addressable by
/// definition name.
#[derive(Debug)]
pub struct SchemaRegistry {
    root: Value,
    source: SchemaSource,
    validators: RwLock<HashMap<String, std::sync::Arc<Validator>>>,
    load_duration: Duration,
    compile_duration: Duration,
}

/// Definitions the validation middleware is known to need; pre-compiled
/// eagerly at construction (SPEC_FULL §4.3's "for each definition the
/// middleware cares about, pre-compiles a handle").
const EAGER_DEFINITIONS: &[&str] = &[
    "base",
    "request",
    "JSONRPCRequest",
    "notification",
    "JSONRPCNotification",
    "success_response",
    "JSONRPCResponse",
    "error_response",
    "JSONRPCError",
    "CallToolResult",
    "tools/list_response",
];

impl SchemaRegistry {
    /// Load and compile a schema registry, honoring the SPEC_FULL §4.3
    /// loading order: explicit override URI, then pre-embedded bytes, then
    /// a local path, then a remote URL.
    pub async fn load(
        config: &SchemaConfig,
        local_path: Option<&Path>,
    ) -> Result<Self> {
        let load_start = Instant::now();
        let (raw, source) = Self::load_document(config, local_path).await?;
        let load_duration = load_start.elapsed();

        let root: Value = serde_json::from_str(&raw)
            .map_err(|e| ValidationError::SchemaLoadFailed(e.to_string()))?;

        let compile_start = Instant::now();
        let mut validators = HashMap::new();
        for name in EAGER_DEFINITIONS {
            let compiled = Self::compile_definition(&root, name)?;
            validators.insert((*name).to_string(), std::sync::Arc::new(compiled));
        }
        let compile_duration = compile_start.elapsed();

        Ok(Self {
            root,
            source,
            validators: RwLock::new(validators),
            load_duration,
            compile_duration,
        })
    }

    async fn load_document(
        config: &SchemaConfig,
        local_path: Option<&Path>,
    ) -> Result<(String, SchemaSource)> {
        if let Some(uri) = &config.schema_override_uri {
            if let Some(path) = uri.strip_prefix("file://") {
                let contents = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| ValidationError::SchemaLoadFailed(e.to_string()))?;
                return Ok((contents, SchemaSource::Override(uri.clone())));
            }
            if uri.starts_with("https://") || uri.starts_with("http://") {
                let body = Self::fetch_remote(uri).await?;
                return Ok((body, SchemaSource::Override(uri.clone())));
            }
            return Err(ValidationError::SchemaLoadFailed(format!(
                "unsupported schema override URI scheme: {uri}"
            ))
            .into());
        }

        if let Some(path) = local_path {
            if path.exists() {
                let contents = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| ValidationError::SchemaLoadFailed(e.to_string()))?;
                return Ok((contents, SchemaSource::LocalFile(path.to_path_buf())));
            }
        }

        Ok((EMBEDDED_SCHEMA_JSON.to_string(), SchemaSource::Embedded))
    }

    async fn fetch_remote(url: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ValidationError::SchemaLoadFailed(format!(
                "remote schema fetch returned status {}",
                response.status()
            ))
            .into());
        }
        Ok(response.text().await?)
    }

    fn compile_definition(root: &Value, name: &str) -> Result<Validator> {
        let definitions = root
            .get("definitions")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        if definitions.get(name).is_none() {
            return Err(ValidationError::SchemaNotFound(name.to_string()).into());
        }
        let wrapped = serde_json::json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "definitions": definitions,
            "$ref": format!("#/definitions/{name}"),
        });
        jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&wrapped)
            .map_err(|e| ValidationError::SchemaCompileFailed(e.to_string()).into())
    }

    /// Whether a definition by this name is known (pre-compiled or
    /// present in the loaded document).
    pub fn has_schema(&self, name: &str) -> bool {
        if self.validators.read().unwrap().contains_key(name) {
            return true;
        }
        self.root
            .get("definitions")
            .and_then(|d| d.get(name))
            .is_some()
    }

    fn validator_for(&self, name: &str) -> Result<std::sync::Arc<Validator>> {
        if let Some(v) = self.validators.read().unwrap().get(name) {
            return Ok(std::sync::Arc::clone(v));
        }
        if self.root.get("definitions").and_then(|d| d.get(name)).is_none() {
            // Unknown name: fall back to the root, per §4.3 ("falls back to
            // the root if the name is unknown -- a warning condition").
            tracing::warn!(schema = name, "unknown schema definition; falling back to root");
            return self.validator_for("base");
        }
        let compiled = Self::compile_definition(&self.root, name)?;
        let arc = std::sync::Arc::new(compiled);
        self.validators
            .write()
            .unwrap()
            .insert(name.to_string(), std::sync::Arc::clone(&arc));
        Ok(arc)
    }

    /// Validate `bytes` as JSON against the named definition.
    pub fn validate(&self, definition_name: &str, bytes: &[u8]) -> Result<()> {
        let instance: Value = serde_json::from_slice(bytes).map_err(|e| {
            ValidationError::InvalidJsonFormat(e.to_string())
        })?;

        let validator = self.validator_for(definition_name)?;
        let errors: Vec<_> = validator.iter_errors(&instance).collect();
        if errors.is_empty() {
            return Ok(());
        }

        let first = &errors[0];
        let causes = errors.iter().skip(1).map(|e| e.to_string()).collect();
        let preview_src = String::from_utf8_lossy(bytes);
        let preview: String = preview_src.chars().take(PREVIEW_BYTES).collect();

        Err(ValidationError::ValidationFailed {
            message: first.to_string(),
            instance_path: first.instance_path().to_string(),
            schema_path: first.schema_path().to_string(),
            causes,
            preview,
        }
        .into())
    }

    /// Check an MCP entity name (tool/resource/prompt) against the pattern
    /// carried in the schema document's `x-namePattern` annotation for that
    /// entity type, falling back to the universal default pattern and
    /// length bounds when absent.
    pub fn validate_name(&self, entity_type: &str, name: &str) -> std::result::Result<(), String> {
        let def = self.root.get("definitions").and_then(|d| d.get(entity_type));

        let pattern = def
            .and_then(|d| d.get("x-namePattern"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_NAME_PATTERN);
        let min_len = def
            .and_then(|d| d.get("x-nameMinLength"))
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_NAME_MIN_LEN as u64) as usize;
        let max_len = def
            .and_then(|d| d.get("x-nameMaxLength"))
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_NAME_MAX_LEN as u64) as usize;

        if name.len() < min_len || name.len() > max_len {
            return Err(format!(
                "{entity_type} name '{name}' must be between {min_len} and {max_len} characters"
            ));
        }

        let re = Regex::new(pattern).map_err(|e| format!("invalid name pattern: {e}"))?;
        if !re.is_match(name) {
            return Err(format!(
                "{entity_type} name '{name}' does not match required pattern {pattern}"
            ));
        }
        Ok(())
    }

    /// Observable attributes for diagnostics (SPEC_FULL §10.5).
    pub fn describe(&self) -> RegistryDescription {
        let known_definitions = self
            .root
            .get("definitions")
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        RegistryDescription {
            load_duration: self.load_duration,
            compile_duration: self.compile_duration,
            known_definitions,
        }
    }

    /// Where the active document was loaded from.
    pub fn source(&self) -> &SchemaSource {
        &self.source
    }
}
