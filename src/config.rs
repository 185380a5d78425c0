//! Plain configuration structs consumed at the core's interface (SPEC_FULL
//! §6, §10.3).
//!
//! No loader lives here: parsing CLI flags, environment variables, or a
//! host application's YAML/TOML file is an explicit out-of-scope external
//! collaborator. These structs exist so that collaborator can deserialize
//! a partial document straight into them (`#[serde(default)]` throughout)
//! and hand the result to the core's constructors.

use serde::{Deserialize, Serialize};

/// Schema-loading configuration (SPEC_FULL §4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaConfig {
    /// Explicit override URI (`file://...` or `https://...`), taking
    /// precedence over the embedded, local, and remote fallbacks.
    #[serde(default)]
    pub schema_override_uri: Option<String>,
}

/// Remember The Milk API configuration (SPEC_FULL §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtmConfig {
    /// RTM API key, issued per application.
    pub api_key: String,
    /// RTM shared secret, used to sign REST calls.
    pub shared_secret: String,
    /// Base URL of the RTM REST endpoint.
    #[serde(default = "default_rtm_api_endpoint")]
    pub api_endpoint: String,
}

fn default_rtm_api_endpoint() -> String {
    "https://api.rememberthemilk.com/services/rest/".to_string()
}

impl Default for RtmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            shared_secret: String::new(),
            api_endpoint: default_rtm_api_endpoint(),
        }
    }
}

/// Auth-flow behavior configuration (SPEC_FULL §4.6, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOptions {
    /// Whether to run the transient local HTTP callback server and
    /// complete the flow automatically. When `false`, [`crate::auth::manager::AuthManager::ensure_authenticated`]
    /// starts the flow and returns instructions for completing it out of
    /// band via `complete_auth_flow` instead of blocking on the callback.
    #[serde(default = "default_auto_complete_auth")]
    pub auto_complete_auth: bool,
    /// Loopback port the callback server binds to.
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    /// How long `EnsureAuthenticated` waits for the flow to complete.
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout_duration: std::time::Duration,
}

fn default_auto_complete_auth() -> bool {
    true
}

fn default_callback_port() -> u16 {
    8090
}

fn default_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(300)
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_complete_auth: default_auto_complete_auth(),
            callback_port: default_callback_port(),
            timeout_duration: default_timeout(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
