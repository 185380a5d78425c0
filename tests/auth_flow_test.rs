//! RTM auth state machine integration tests (SPEC_FULL §8 S4, S5).

use std::sync::Arc;
use std::time::Duration;

use cowgnition::auth::flow::{run_callback_server, FetchedToken, GenerateUrlFn, TokenFetcherFn, TokenVerifierFn, VerifiedIdentity};
use cowgnition::auth::manager::{AuthManager, AuthStatus};
use cowgnition::auth::token_store::NoneStore;
use cowgnition::config::AuthOptions;
use cowgnition::error::{AuthError, CowGnitionError};

fn generator() -> GenerateUrlFn {
    Box::new(|frob, permission| {
        let frob = frob.to_string();
        let permission = permission.to_string();
        Box::pin(async move { Ok(format!("https://rememberthemilk.com/auth?frob={frob}&perms={permission}")) })
    })
}

fn fetcher(username: &'static str) -> TokenFetcherFn {
    Box::new(move |_frob| {
        Box::pin(async move {
            Ok(FetchedToken {
                token: "tok-abc".to_string(),
                username: username.to_string(),
                permission: "write".to_string(),
            })
        })
    })
}

fn verifier(username: &'static str) -> TokenVerifierFn {
    Box::new(move |_token| {
        Box::pin(async move {
            Ok(VerifiedIdentity {
                username: username.to_string(),
                permission: "write".to_string(),
            })
        })
    })
}

async fn manual_manager() -> AuthManager {
    let options = AuthOptions {
        auto_complete_auth: false,
        ..AuthOptions::default()
    };
    AuthManager::new(Arc::new(NoneStore), options).await
}

#[tokio::test]
async fn s4_happy_path_drives_status_through_every_stage() {
    let manager = manual_manager().await;
    assert_eq!(manager.status().await, AuthStatus::NotAuthenticated);

    let (frob, url) = manager
        .start_auth_flow("frob-1".to_string(), "write".to_string(), generator())
        .await
        .unwrap();
    assert!(url.contains("frob-1"));
    assert_eq!(manager.status().await, AuthStatus::Pending);

    manager.complete_auth_flow(&frob, fetcher("alice")).await.unwrap();
    assert_eq!(manager.status().await, AuthStatus::Authenticated);

    let state = manager.state().await;
    assert!(state.is_authenticated);
    assert_eq!(state.username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn complete_auth_flow_rejects_an_unknown_frob() {
    let manager = manual_manager().await;
    let result = manager.complete_auth_flow("never-started", fetcher("bob")).await;
    assert!(matches!(
        result,
        Err(CowGnitionError::Auth(AuthError::FrobNotFound))
    ));
}

#[tokio::test]
async fn clear_authentication_resets_to_not_authenticated() {
    let manager = manual_manager().await;
    let (frob, _url) = manager
        .start_auth_flow("frob-3".to_string(), "write".to_string(), generator())
        .await
        .unwrap();
    manager.complete_auth_flow(&frob, fetcher("carol")).await.unwrap();
    assert_eq!(manager.status().await, AuthStatus::Authenticated);

    manager.clear_authentication().await.unwrap();
    assert_eq!(manager.status().await, AuthStatus::NotAuthenticated);
    assert!(!manager.state().await.is_authenticated);
}

#[tokio::test]
async fn ensure_authenticated_auto_mode_completes_via_the_callback_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let options = AuthOptions {
        auto_complete_auth: true,
        callback_port: port,
        timeout_duration: Duration::from_secs(5),
        ..AuthOptions::default()
    };
    let manager = AuthManager::new(Arc::new(NoneStore), options).await;

    let wait = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        use tokio::io::AsyncWriteExt;
        stream
            .write_all(b"GET /rtm/callback?frob=auto-frob HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
    });

    let result = manager
        .ensure_authenticated(
            "auto-frob".to_string(),
            "write".to_string(),
            generator(),
            fetcher("dave"),
            verifier("dave"),
        )
        .await
        .unwrap();

    wait.await.unwrap();
    assert!(result.success);
    assert_eq!(result.username.as_deref(), Some("dave"));
    assert_eq!(manager.status().await, AuthStatus::Authenticated);
}

#[tokio::test]
async fn callback_server_round_trips_a_real_frob() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let cancel = tokio_util::sync::CancellationToken::new();
    let server = tokio::spawn(run_callback_server(port, cancel, Duration::from_secs(5)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    use tokio::io::AsyncWriteExt;
    stream
        .write_all(b"GET /rtm/callback?frob=integration-frob HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let frob = server.await.unwrap().unwrap();
    assert_eq!(frob, "integration-frob");
}
