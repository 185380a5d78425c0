//! Schema registry integration tests (SPEC_FULL §4.3): loading-order
//! fallbacks exercised against real files and a mocked remote endpoint.

use cowgnition::config::SchemaConfig;
use cowgnition::error::{CowGnitionError, ValidationError};
use cowgnition::schema::{SchemaRegistry, SchemaSource};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MINIMAL_SCHEMA: &str = r#"{
  "definitions": {
    "request": {
      "type": "object",
      "required": ["jsonrpc", "method"],
      "properties": {
        "jsonrpc": {"type": "string"},
        "method": {"type": "string"}
      }
    }
  }
}"#;

#[tokio::test]
async fn loads_embedded_schema_and_validates_a_real_request() {
    let registry = SchemaRegistry::load(&SchemaConfig::default(), None).await.unwrap();
    assert_eq!(*registry.source(), SchemaSource::Embedded);

    let ok = br#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#;
    assert!(registry.validate("request", ok).is_ok());

    let bad = br#"{"jsonrpc":"2.0"}"#;
    let err = registry.validate("request", bad).unwrap_err();
    assert!(matches!(
        err,
        CowGnitionError::Validation(ValidationError::ValidationFailed { .. })
    ));
}

#[tokio::test]
async fn local_path_is_used_when_no_override_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");
    std::fs::write(&path, MINIMAL_SCHEMA).unwrap();

    let registry = SchemaRegistry::load(&SchemaConfig::default(), Some(&path)).await.unwrap();
    assert_eq!(*registry.source(), SchemaSource::LocalFile(path));
    assert!(registry.validate("request", br#"{"jsonrpc":"2.0","method":"ping"}"#).is_ok());
}

#[tokio::test]
async fn file_override_uri_takes_precedence_over_local_path() {
    let dir = tempfile::tempdir().unwrap();
    let override_path = dir.path().join("override.json");
    let local_path = dir.path().join("local.json");
    std::fs::write(&override_path, MINIMAL_SCHEMA).unwrap();
    std::fs::write(&local_path, "{}").unwrap();

    let config = SchemaConfig {
        schema_override_uri: Some(format!("file://{}", override_path.display())),
    };
    let registry = SchemaRegistry::load(&config, Some(&local_path)).await.unwrap();
    match registry.source() {
        SchemaSource::Override(uri) => assert!(uri.starts_with("file://")),
        other => panic!("expected a file override source, got {other:?}"),
    }
    assert!(registry.has_schema("request"));
}

#[tokio::test]
async fn remote_override_uri_is_fetched_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schema.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MINIMAL_SCHEMA))
        .mount(&server)
        .await;

    let config = SchemaConfig {
        schema_override_uri: Some(format!("{}/schema.json", server.uri())),
    };
    let registry = SchemaRegistry::load(&config, None).await.unwrap();
    assert!(matches!(registry.source(), SchemaSource::Override(_)));
    assert!(registry.validate("request", br#"{"jsonrpc":"2.0","method":"ping"}"#).is_ok());
}

#[tokio::test]
async fn remote_override_failure_surfaces_as_schema_load_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = SchemaConfig {
        schema_override_uri: Some(format!("{}/missing.json", server.uri())),
    };
    let err = SchemaRegistry::load(&config, None).await.unwrap_err();
    assert!(matches!(
        err,
        CowGnitionError::Validation(ValidationError::SchemaLoadFailed(_))
    ));
}

#[tokio::test]
async fn validate_name_enforces_the_embedded_tool_pattern() {
    let registry = SchemaRegistry::load(&SchemaConfig::default(), None).await.unwrap();
    assert!(registry.validate_name("Tool", "add_task").is_ok());
    assert!(registry.validate_name("Tool", "").is_err());
    assert!(registry.validate_name("Tool", "9bad-start").is_err());
}
