//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.

use serde::Deserialize;

/// Which callback deployment variant is active.
///
/// Both variants share the token-exchange, claims-mapping, and persistence
/// logic; only the inbound validation step differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallbackVariant {
    /// One-time state/nonce/verifier cookies vouch for the callback;
    /// no server-side session record is involved.
    CookiePkce,
    /// A sealed session cookie resolves a store-backed session record.
    StoreBacked,
}

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// PostgreSQL connection URL for the session store.
    pub database_url: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Identity provider configuration.
    pub oidc: OidcSettings,

    /// Active callback variant.
    #[serde(default = "default_callback_variant")]
    pub callback_variant: CallbackVariant,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in minutes.
    #[serde(default = "default_session_ttl_minutes")]
    pub ttl_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP
    /// development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Name under which the cookie-sealing secret lives in the secret
    /// backend.
    #[serde(default = "default_secret_name")]
    pub secret_name: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_callback_variant() -> CallbackVariant {
    CallbackVariant::StoreBacked
}

fn default_session_ttl_minutes() -> i64 {
    60
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

fn default_secret_name() -> String {
    "SESSION_SECRET".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_session_ttl_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
            secret_name: default_secret_name(),
        }
    }
}

/// Configuration for the OIDC identity provider.
///
/// `issuer_url` and `client_id` default to empty strings and are checked at
/// first use: the provider cache refuses discovery without them.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcSettings {
    /// The OIDC issuer URL, used for discovery. Required at first use.
    #[serde(default)]
    pub issuer_url: String,

    /// The OAuth2 client ID registered with the provider. Required at
    /// first use.
    #[serde(default)]
    pub client_id: String,

    /// The OAuth2 client secret, for client-secret authentication.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// PEM-encoded RSA private key. When set, token requests authenticate
    /// with `private_key_jwt` client assertions instead of the secret.
    #[serde(default)]
    pub private_key_pem: Option<String>,

    /// The redirect URI for the OAuth2 callback.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// OAuth2 scopes to request, space-separated.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Authentication context class to request from the provider.
    #[serde(default = "default_acr_values")]
    pub acr_values: String,

    /// Key under which the validated token set is stored on the session
    /// record.
    #[serde(default = "default_provider_name")]
    pub provider_name: String,
}

fn default_redirect_uri() -> String {
    "http://localhost:8000/auth/callback".to_string()
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_acr_values() -> String {
    "AAL2_OR_AAL3_ANY".to_string()
}

fn default_provider_name() -> String {
    "cis2".to_string()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
