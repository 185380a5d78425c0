//! RTM three-legged auth state machine (SPEC_FULL §4.6).
//!
//! Generalizes the teacher's `AuthManager::get_token` cascade (cached ->
//! expired+refresh -> full-flow) into an explicit state enum, since RTM's
//! frob-based flow has no refresh token and a much shorter cast of states.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::auth::flow::{run_callback_server, FetchedToken, GenerateUrlFn, TokenFetcherFn, TokenVerifierFn};
use crate::auth::token_store::TokenStore;
use crate::config::AuthOptions;
use crate::error::{AuthError, Result};

/// Validity window for a pending auth flow before it is considered expired
/// (SPEC_FULL §3, §8 invariant 8).
const FLOW_TTL: chrono::Duration = chrono::Duration::hours(24);

/// Coarse progress of the authentication lifecycle (SPEC_FULL §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// No flow has ever been started, or the last one failed and was cleared.
    NotAuthenticated,
    /// A flow has been started and is waiting on the user/RTM callback.
    Pending,
    /// A token has been obtained and persisted.
    Authenticated,
    /// The most recent flow failed (expired, fetch error, verification error).
    Failed,
}

/// An in-flight authorization attempt, keyed by its frob (SPEC_FULL §3).
#[derive(Debug, Clone)]
pub struct AuthFlow {
    /// The RTM frob identifying this attempt.
    pub frob: String,
    /// When this flow was started, for the 24-hour expiry check.
    pub created_at: DateTime<Utc>,
    /// The permission level requested (`read`, `write`, `delete`).
    pub permission: String,
    /// The authorization URL the caller should present to the user.
    pub auth_url: String,
}

/// Current authentication state (SPEC_FULL §3).
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    /// Whether a verified token is currently held.
    pub is_authenticated: bool,
    /// The RTM username the current token authenticates as, if any.
    pub username: Option<String>,
    /// The opaque token itself. Never logged (SPEC_FULL §8 invariant 9).
    pub token: Option<String>,
    /// The permission level of the current token, if any.
    pub permission: Option<String>,
}

/// Outcome of [`AuthManager::ensure_authenticated`].
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// Whether authentication completed successfully.
    pub success: bool,
    /// The authenticated username, when `success` is true.
    pub username: Option<String>,
    /// An explanatory message, set on failure or when manual completion is
    /// still pending out of band.
    pub error: Option<String>,
}

/// Coordinates the RTM three-legged auth flow and the token store backing
/// it. A reader-writer lock guards the flow map and status, matching the
/// read-mostly access pattern described in SPEC_FULL §5.
pub struct AuthManager {
    flows: RwLock<HashMap<String, AuthFlow>>,
    state: RwLock<AuthState>,
    status: RwLock<AuthStatus>,
    token_store: Arc<dyn TokenStore>,
    options: AuthOptions,
    shutdown: CancellationToken,
}

impl AuthManager {
    /// Build a manager around an already-selected token store. On
    /// construction, attempts to hydrate state from any previously
    /// persisted token so a restarted process doesn't re-prompt the user.
    pub async fn new(token_store: Arc<dyn TokenStore>, options: AuthOptions) -> Self {
        let manager = Self {
            flows: RwLock::new(HashMap::new()),
            state: RwLock::new(AuthState::default()),
            status: RwLock::new(AuthStatus::NotAuthenticated),
            token_store,
            options,
            shutdown: CancellationToken::new(),
        };
        manager.hydrate_from_store().await;
        manager
    }

    async fn hydrate_from_store(&self) {
        if let Ok(Some(token)) = self.token_store.load().await {
            let mut state = self.state.write().await;
            state.token = Some(token);
            state.is_authenticated = true;
            drop(state);
            *self.status.write().await = AuthStatus::Authenticated;
        }
    }

    /// If a token is currently held, confirm it against RTM's
    /// `auth.checkToken` via the injected `verify` collaborator.
    ///
    /// Returns `Ok(Some(result))` with `success: true` if the token is
    /// still good (the held state is refreshed with whatever identity RTM
    /// reports), `Ok(None)` if no token is held (the caller should start a
    /// fresh flow), or, on verification failure, discards the token and
    /// transitions to [`AuthStatus::Failed`] before returning `Ok(None)` so
    /// the caller falls through to starting a new flow.
    async fn reverify_held_token(&self, verify: TokenVerifierFn) -> Result<Option<AuthResult>> {
        let token = match self.state.read().await.token.clone() {
            Some(token) => token,
            None => return Ok(None),
        };

        match verify(&token).await {
            Ok(identity) => {
                let mut state = self.state.write().await;
                state.is_authenticated = true;
                state.username = Some(identity.username.clone());
                state.permission = Some(identity.permission);
                drop(state);
                *self.status.write().await = AuthStatus::Authenticated;
                Ok(Some(AuthResult {
                    success: true,
                    username: Some(identity.username),
                    error: None,
                }))
            }
            Err(e) => {
                let verify_err = AuthError::TokenVerifyFailed(e.to_string());
                tracing::warn!(error = %verify_err, "stored token failed verification, discarding");
                self.token_store.delete().await?;
                *self.state.write().await = AuthState::default();
                *self.status.write().await = AuthStatus::Failed;
                Ok(None)
            }
        }
    }

    /// Signal any running callback server to stop, per SPEC_FULL §4.6's
    /// lifecycle tie to the manager's shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Current coarse status.
    pub async fn status(&self) -> AuthStatus {
        *self.status.read().await
    }

    /// Current authentication state snapshot.
    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    /// Begin a new authorization flow: generate a frob-scoped URL via the
    /// injected `generate` collaborator, and register a [`AuthFlow`] pending
    /// completion. Returns `(frob, auth_url)`.
    pub async fn start_auth_flow(&self, frob: String, permission: String, generate: GenerateUrlFn) -> Result<(String, String)> {
        let auth_url = generate(&frob, &permission).await?;

        let flow = AuthFlow {
            frob: frob.clone(),
            created_at: Utc::now(),
            permission,
            auth_url: auth_url.clone(),
        };
        self.flows.write().await.insert(frob.clone(), flow);
        *self.status.write().await = AuthStatus::Pending;

        Ok((frob, auth_url))
    }

    /// Complete a pending flow by exchanging its frob for a token via the
    /// injected `fetch` collaborator. Fails with [`AuthError::FrobNotFound`]
    /// if no flow is pending for `frob`, or [`AuthError::ExpiredFlow`] if the
    /// flow is older than the 24-hour validity window (SPEC_FULL §8
    /// invariant 8).
    pub async fn complete_auth_flow(&self, frob: &str, fetch: TokenFetcherFn) -> Result<()> {
        let flow = {
            let mut flows = self.flows.write().await;
            flows.remove(frob).ok_or(AuthError::FrobNotFound)?
        };

        if Utc::now() - flow.created_at > FLOW_TTL {
            *self.status.write().await = AuthStatus::Failed;
            return Err(AuthError::ExpiredFlow.into());
        }

        let fetched: FetchedToken = match fetch(frob).await {
            Ok(t) => t,
            Err(e) => {
                *self.status.write().await = AuthStatus::Failed;
                return Err(e);
            }
        };

        self.token_store.save(&fetched.token).await?;

        let mut state = self.state.write().await;
        state.is_authenticated = true;
        state.username = Some(fetched.username);
        state.token = Some(fetched.token);
        state.permission = Some(fetched.permission);
        drop(state);

        *self.status.write().await = AuthStatus::Authenticated;
        Ok(())
    }

    /// Clear all authentication state and delete the persisted token.
    pub async fn clear_authentication(&self) -> Result<()> {
        self.token_store.delete().await?;
        *self.state.write().await = AuthState::default();
        *self.status.write().await = AuthStatus::NotAuthenticated;
        Ok(())
    }

    /// Drop any pending flows older than the 24-hour validity window.
    /// Not required for correctness (`complete_auth_flow` already checks
    /// age), but keeps the flow map from growing unbounded across a long
    /// server lifetime.
    pub async fn clean_expired_flows(&self) {
        let now = Utc::now();
        self.flows
            .write()
            .await
            .retain(|_, flow| now - flow.created_at <= FLOW_TTL);
    }

    /// Run the full `NotAuthenticated -> Pending -> Authenticated|Failed`
    /// sequence as a single call. If a token is already held, it is
    /// re-verified against RTM first (SPEC_FULL §4.6 "Any -> Failed if the
    /// stored token is verified and found invalid"); a stale token is
    /// discarded and a fresh flow is started in its place.
    ///
    /// When `options.auto_complete_auth` is set, runs the transient local
    /// callback server to receive the frob automatically, bounded by
    /// `options.timeout_duration`; otherwise starts the flow and returns
    /// immediately with instructions to complete it out of band via
    /// [`Self::complete_auth_flow`].
    pub async fn ensure_authenticated(
        &self,
        frob: String,
        permission: String,
        generate: GenerateUrlFn,
        fetch: TokenFetcherFn,
        verify: TokenVerifierFn,
    ) -> Result<AuthResult> {
        if let Some(result) = self.reverify_held_token(verify).await? {
            return Ok(result);
        }

        let (frob, auth_url) = self.start_auth_flow(frob, permission, generate).await?;

        if !self.options.auto_complete_auth {
            return Ok(AuthResult {
                success: false,
                username: None,
                error: Some(format!(
                    "visit {auth_url} then complete authentication out of band for frob {frob}"
                )),
            });
        }

        let callback = run_callback_server(
            self.options.callback_port,
            self.shutdown.clone(),
            self.options.timeout_duration,
        );

        let received_frob = match tokio::time::timeout(self.options.timeout_duration, callback).await {
            Ok(Ok(f)) => f,
            Ok(Err(e)) => {
                *self.status.write().await = AuthStatus::Failed;
                return Ok(AuthResult {
                    success: false,
                    username: None,
                    error: Some(e.to_string()),
                });
            }
            Err(_) => {
                *self.status.write().await = AuthStatus::Failed;
                return Ok(AuthResult {
                    success: false,
                    username: None,
                    error: Some("timed out waiting for RTM authorization".to_string()),
                });
            }
        };

        match self.complete_auth_flow(&received_frob, fetch).await {
            Ok(()) => {
                let username = self.state.read().await.username.clone();
                Ok(AuthResult {
                    success: true,
                    username,
                    error: None,
                })
            }
            Err(e) => Ok(AuthResult {
                success: false,
                username: None,
                error: Some(e.to_string()),
            }),
        }
    }
}

fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<AuthManager>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token_store::NoneStore;

    fn generate_ok() -> GenerateUrlFn {
        Box::new(|frob, _perm| {
            let frob = frob.to_string();
            Box::pin(async move { Ok(format!("https://rtm.example/auth?frob={frob}")) })
        })
    }

    fn fetch_ok(username: &'static str) -> TokenFetcherFn {
        Box::new(move |_frob| {
            Box::pin(async move {
                Ok(FetchedToken {
                    token: "tok-123".to_string(),
                    username: username.to_string(),
                    permission: "delete".to_string(),
                })
            })
        })
    }

    fn fetch_err() -> TokenFetcherFn {
        Box::new(|_frob| {
            Box::pin(async move { Err(AuthError::TokenFetchFailed("rtm rejected frob".to_string()).into()) })
        })
    }

    fn verify_ok(username: &'static str) -> TokenVerifierFn {
        Box::new(move |_token| {
            Box::pin(async move {
                Ok(crate::auth::flow::VerifiedIdentity {
                    username: username.to_string(),
                    permission: "delete".to_string(),
                })
            })
        })
    }

    fn verify_err() -> TokenVerifierFn {
        Box::new(|_token| {
            Box::pin(async move { Err(AuthError::TokenVerifyFailed("token revoked".to_string()).into()) })
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
    async fn s4_happy_path_not_authenticated_to_authenticated() {
        let manager = manual_manager().await;
        assert_eq!(manager.status().await, AuthStatus::NotAuthenticated);

        let (frob, _url) = manager
            .start_auth_flow("frob-1".to_string(), "delete".to_string(), generate_ok())
            .await
            .unwrap();
        assert_eq!(manager.status().await, AuthStatus::Pending);

        manager.complete_auth_flow(&frob, fetch_ok("alice")).await.unwrap();
        assert_eq!(manager.status().await, AuthStatus::Authenticated);

        let state = manager.state().await;
        assert!(state.is_authenticated);
        assert_eq!(state.username.as_deref(), Some("alice"));
        assert_eq!(state.token.as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn complete_auth_flow_rejects_unknown_frob() {
        let manager = manual_manager().await;
        let err = manager.complete_auth_flow("no-such-frob", fetch_ok("alice")).await;
        assert!(matches!(err, Err(crate::error::CowGnitionError::Auth(AuthError::FrobNotFound))));
    }

    #[tokio::test]
    async fn s5_expired_flow_is_rejected_and_marks_failed() {
        let manager = manual_manager().await;
        let (frob, _url) = manager
            .start_auth_flow("frob-2".to_string(), "read".to_string(), generate_ok())
            .await
            .unwrap();

        {
            let mut flows = manager.flows.write().await;
            let flow = flows.get_mut(&frob).unwrap();
            flow.created_at = Utc::now() - (FLOW_TTL + chrono::Duration::seconds(1));
        }

        let err = manager.complete_auth_flow(&frob, fetch_ok("alice")).await;
        assert!(matches!(err, Err(crate::error::CowGnitionError::Auth(AuthError::ExpiredFlow))));
        assert_eq!(manager.status().await, AuthStatus::Failed);
        assert!(!manager.state().await.is_authenticated);
    }

    #[tokio::test]
    async fn failed_token_fetch_marks_status_failed() {
        let manager = manual_manager().await;
        let (frob, _url) = manager
            .start_auth_flow("frob-3".to_string(), "read".to_string(), generate_ok())
            .await
            .unwrap();

        let err = manager.complete_auth_flow(&frob, fetch_err()).await;
        assert!(err.is_err());
        assert_eq!(manager.status().await, AuthStatus::Failed);
    }

    #[tokio::test]
    async fn clean_expired_flows_removes_only_stale_entries() {
        let manager = manual_manager().await;
        manager
            .start_auth_flow("fresh".to_string(), "read".to_string(), generate_ok())
            .await
            .unwrap();
        manager
            .start_auth_flow("stale".to_string(), "read".to_string(), generate_ok())
            .await
            .unwrap();
        {
            let mut flows = manager.flows.write().await;
            flows.get_mut("stale").unwrap().created_at = Utc::now() - (FLOW_TTL + chrono::Duration::seconds(1));
        }

        manager.clean_expired_flows().await;

        let flows = manager.flows.read().await;
        assert!(flows.contains_key("fresh"));
        assert!(!flows.contains_key("stale"));
    }

    #[tokio::test]
    async fn clear_authentication_resets_state() {
        let manager = manual_manager().await;
        let (frob, _url) = manager
            .start_auth_flow("frob-4".to_string(), "read".to_string(), generate_ok())
            .await
            .unwrap();
        manager.complete_auth_flow(&frob, fetch_ok("bob")).await.unwrap();
        assert!(manager.state().await.is_authenticated);

        manager.clear_authentication().await.unwrap();
        assert_eq!(manager.status().await, AuthStatus::NotAuthenticated);
        assert!(!manager.state().await.is_authenticated);
    }

    #[tokio::test]
    async fn manual_mode_ensure_authenticated_returns_instructions_without_blocking() {
        let manager = manual_manager().await;
        let result = manager
            .ensure_authenticated(
                "frob-5".to_string(),
                "read".to_string(),
                generate_ok(),
                fetch_ok("carol"),
                verify_ok("carol"),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("frob-5"));
        assert_eq!(manager.status().await, AuthStatus::Pending);
    }

    #[tokio::test]
    async fn ensure_authenticated_reverifies_when_already_authenticated() {
        let manager = manual_manager().await;
        let (frob, _url) = manager
            .start_auth_flow("frob-6".to_string(), "read".to_string(), generate_ok())
            .await
            .unwrap();
        manager.complete_auth_flow(&frob, fetch_ok("dave")).await.unwrap();

        let result = manager
            .ensure_authenticated(
                "frob-7".to_string(),
                "read".to_string(),
                generate_ok(),
                fetch_ok("dave"),
                verify_ok("dave"),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.username.as_deref(), Some("dave"));
    }

    #[tokio::test]
    async fn ensure_authenticated_discards_a_stale_token_and_restarts_the_flow() {
        let manager = manual_manager().await;
        let (frob, _url) = manager
            .start_auth_flow("frob-8".to_string(), "read".to_string(), generate_ok())
            .await
            .unwrap();
        manager.complete_auth_flow(&frob, fetch_ok("erin")).await.unwrap();
        assert_eq!(manager.status().await, AuthStatus::Authenticated);

        let result = manager
            .ensure_authenticated(
                "frob-9".to_string(),
                "read".to_string(),
                generate_ok(),
                fetch_ok("erin"),
                verify_err(),
            )
            .await
            .unwrap();

        // The stale token is evicted and a brand-new flow is started in its
        // place, so this call reports the same "visit the URL" instructions
        // a never-authenticated caller would see.
        assert!(!result.success);
        assert!(result.error.unwrap().contains("frob-9"));
        assert!(!manager.state().await.is_authenticated);
        assert!(manager.state().await.token.is_none());
        assert_eq!(manager.status().await, AuthStatus::Pending);
    }
}
