//! RTM three-legged authentication (SPEC_FULL §4.6, §4.7).
//!
//! `manager` holds the state machine driving a frob through
//! `NotAuthenticated -> Pending -> Authenticated|Failed`; `flow` holds the
//! injected-collaborator types and the transient local callback server used
//! in auto-complete mode; `token_store` holds the pluggable persistence
//! backends selected between at startup.

pub mod flow;
pub mod manager;
pub mod token_store;

pub use flow::{FetchedToken, GenerateUrlFn, TokenFetcherFn};
pub use manager::{AuthFlow, AuthManager, AuthResult, AuthState, AuthStatus};
pub use token_store::{select_token_store, TokenStorageInfo, TokenStore};
