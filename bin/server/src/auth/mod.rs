//! Authentication module for the waypoint server.
//!
//! This module provides:
//! - OIDC authentication against an external identity provider
//! - Session management across the redirect round-trip
//! - The callback state machine shared by both deployment variants
//!
//! # Deployment Variants
//!
//! Two callback deployments exist, selected by configuration:
//! - **cookie-PKCE**: the one-time state/nonce/verifier artifacts travel
//!   in HttpOnly cookies and the callback leaves no server-side record.
//! - **store-backed**: a sealed cookie carries the ID of a session record
//!   persisted at login initiation; the callback validates against and
//!   updates that record.
//!
//! Code exchange, token validation, claims mapping, and persistence are
//! shared; only the validation step differs (see [`callback`]).

pub mod callback;
pub mod oidc;
pub mod routes;
pub mod secrets;
pub mod store;

use std::sync::Arc;

use waypoint_platform_access::SessionStore;

pub use callback::{CallbackError, CallbackQuery};
pub use oidc::{ExchangeFailure, OidcClient, OidcError, ProviderCache};
pub use routes::{jwks, login, logout, pkce_callback, store_callback, user_info};
pub use secrets::{EnvSecretStore, SecretError, SecretStore, SessionSecrets, StaticSecretStore};
pub use store::PgSessionStore;

use crate::config::{CallbackVariant, SessionConfig};

/// Shared application state.
pub struct AppState {
    /// Single-flight cache of the discovered provider client.
    pub provider: ProviderCache,
    /// Session record persistence.
    pub store: Arc<dyn SessionStore>,
    /// Single-flight cache of the cookie-sealing secret.
    pub secrets: SessionSecrets,
    /// Session configuration.
    pub session_config: SessionConfig,
    /// Active callback variant.
    pub variant: CallbackVariant,
    /// Key under which token sets are stored on session records.
    pub provider_name: String,
}

impl AppState {
    /// Creates a new application state.
    #[must_use]
    pub fn new(
        provider: ProviderCache,
        store: Arc<dyn SessionStore>,
        secrets: SessionSecrets,
        session_config: SessionConfig,
        variant: CallbackVariant,
        provider_name: String,
    ) -> Self {
        Self {
            provider,
            store,
            secrets,
            session_config,
            variant,
            provider_name,
        }
    }
}
