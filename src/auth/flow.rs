//! Injected collaborators and the transient callback server for completing
//! an RTM authorization flow (SPEC_FULL §4.6).
//!
//! The actual RTM REST wire shape (building the `auth.getFrob` URL, signing
//! requests, exchanging a frob for a token, checking a stored token) is an
//! external collaborator outside this crate's scope; only its call
//! signature is consumed here via [`GenerateUrlFn`], [`TokenFetcherFn`], and
//! [`TokenVerifierFn`].

use std::collections::HashMap;
use std::future::Future;
use std::io::{BufRead, BufReader, Write};
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, Result};

/// A boxed, `Send` future, matching [`crate::middleware::BoxFuture`]'s idiom.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Builds the RTM authorization URL for a given frob and permission level.
/// The actual URL construction/signing lives outside this crate.
pub type GenerateUrlFn = Box<dyn FnOnce(&str, &str) -> BoxFuture<'static, Result<String>> + Send>;

/// Exchanges a frob for a token by calling RTM's `auth.getToken`. The
/// actual RTM REST call lives outside this crate.
pub type TokenFetcherFn = Box<dyn FnOnce(&str) -> BoxFuture<'static, Result<FetchedToken>> + Send>;

/// Checks a previously stored token against RTM's `auth.checkToken`. The
/// actual RTM REST call lives outside this crate.
pub type TokenVerifierFn = Box<dyn FnOnce(&str) -> BoxFuture<'static, Result<VerifiedIdentity>> + Send>;

/// The result of a successful frob-to-token exchange.
#[derive(Debug, Clone)]
pub struct FetchedToken {
    /// The opaque RTM auth token. Never logged.
    pub token: String,
    /// The RTM username the token authenticates as.
    pub username: String,
    /// The permission level granted (`read`, `write`, or `delete`).
    pub permission: String,
}

/// The identity and grant a stored token still carries, confirmed live
/// against RTM rather than assumed from local state.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// The RTM username the token authenticates as.
    pub username: String,
    /// The permission level the token currently carries.
    pub permission: String,
}

/// Runs a one-shot local HTTP callback server on `port`, accepting a single
/// connection, extracting the `frob` query parameter from the request line,
/// and returning it. Grounded on the teacher's `flow.rs::accept_callback`
/// bind/accept/parse/respond skeleton, simplified to drop PKCE `state`
/// validation: RTM's frob is itself the single-use correlator, so there is
/// no separate CSRF nonce to check.
///
/// Bounded by `timeout` and cooperatively stoppable via `cancel`.
pub async fn run_callback_server(
    port: u16,
    cancel: CancellationToken,
    timeout: Duration,
) -> Result<String> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}"))
        .await
        .map_err(|e| AuthError::TokenFetchFailed(format!("failed to bind callback listener: {e}")))?;

    let accept = async {
        let (stream, _peer) = listener
            .accept()
            .await
            .map_err(|e| AuthError::TokenFetchFailed(format!("failed to accept callback connection: {e}")))?;

        tokio::task::spawn_blocking(move || -> Result<String> {
            let std_stream = stream
                .into_std()
                .map_err(|e| AuthError::TokenFetchFailed(format!("stream conversion failed: {e}")))?;
            let mut write_stream = std_stream
                .try_clone()
                .map_err(|e| AuthError::TokenFetchFailed(format!("stream clone failed: {e}")))?;

            let reader = BufReader::new(std_stream);
            let mut request_line = String::new();
            for line in reader.lines() {
                let line = line.map_err(|e| {
                    AuthError::TokenFetchFailed(format!("failed to read callback request: {e}"))
                })?;
                if line.is_empty() {
                    break;
                }
                if request_line.is_empty() {
                    request_line = line;
                }
            }

            let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nAuthorization received. You may close this tab.";
            let _ = write_stream.write_all(response.as_bytes());

            let path = request_line.split_whitespace().nth(1).unwrap_or("/");
            let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
            let params = parse_query_string(query);

            params
                .get("frob")
                .cloned()
                .ok_or_else(|| AuthError::TokenFetchFailed("frob missing from callback".to_string()).into())
        })
        .await
        .map_err(|e| AuthError::TokenFetchFailed(format!("callback task panicked: {e}")))?
    };

    tokio::select! {
        result = accept => result,
        _ = cancel.cancelled() => Err(AuthError::TokenFetchFailed("callback server cancelled".to_string()).into()),
        _ = tokio::time::sleep(timeout) => Err(AuthError::TokenFetchFailed("timed out waiting for RTM callback".to_string()).into()),
    }
}

fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (!key.is_empty()).then(|| (key.to_string(), decode_form_value(value)))
        })
        .collect()
}

/// Decodes a single `application/x-www-form-urlencoded` value: `+` becomes
/// a space, `%XX` becomes the byte `XX`, anything else passes through. An
/// incomplete or non-hex `%` escape is left as a literal `%`.
fn decode_form_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = String::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let (ch, advance) = decode_one(&bytes[pos..]);
        decoded.push(ch);
        pos += advance;
    }

    decoded
}

/// Decodes the character at the front of `remaining`, returning it alongside
/// how many input bytes it consumed (1 for a plain byte or a failed escape,
/// 3 for a well-formed `%XX` escape).
fn decode_one(remaining: &[u8]) -> (char, usize) {
    match remaining {
        [b'+', ..] => (' ', 1),
        [b'%', hi, lo, ..] => match hex_byte(*hi, *lo) {
            Some(byte) => (byte as char, 3),
            None => ('%', 1),
        },
        [other, ..] => (*other as char, 1),
        [] => unreachable!("decode_one called on empty slice"),
    }
}

fn hex_byte(hi: u8, lo: u8) -> Option<u8> {
    let digit = |b: u8| match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    };
    Some(digit(hi)? << 4 | digit(lo)?)
}
