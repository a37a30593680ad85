//! Callback orchestration shared by both deployment variants.
//!
//! The two variants differ only in how the inbound callback is validated:
//! the cookie-PKCE variant trusts the one-time `oidc_*` cookies, the
//! store-backed variant resolves a sealed session cookie against the
//! session store. Code exchange, token-set validation, claims mapping,
//! and persistence are implemented once.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{CookieJar, PrivateCookieJar};
use serde::{Deserialize, Serialize};
use waypoint_platform_access::{
    ProviderClaims, SchemaError, SessionError, SessionId, SessionRecord, SessionStore, StoreError,
    TokenSet, UserProfile, map_profile,
};

use super::AppState;
use super::oidc::{ExchangeBinding, ExchangeFailure, OidcError, decode_jwt_claims};
use super::secrets::SecretError;

/// One-time cookie carrying the state of a login attempt.
pub const STATE_COOKIE: &str = "oidc_state";
/// One-time cookie carrying the nonce of a login attempt.
pub const NONCE_COOKIE: &str = "oidc_nonce";
/// One-time cookie carrying the PKCE code verifier.
pub const VERIFIER_COOKIE: &str = "oidc_code_verifier";
/// Cookie carrying the authenticated user summary.
pub const USER_INFO_COOKIE: &str = "user_info";
/// Sealed cookie carrying the session ID for the store-backed variant.
pub const SESSION_COOKIE: &str = "session";

/// Query parameters for the OIDC callback.
///
/// Both fields are optional so that a missing parameter surfaces as the
/// fixed bad-request response instead of an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Serializable payload of the sealed session cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCookie {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub state: String,
}

/// Minimal user summary carried in the `user_info` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoSummary {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

impl UserInfoSummary {
    fn from_claims(claims: &ProviderClaims) -> Self {
        Self {
            sub: claims.sub.clone().unwrap_or_default(),
            name: claims.name.clone(),
            email: claims.email.clone(),
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
        }
    }
}

/// Failure terminals of the callback state machine.
#[derive(Debug)]
pub enum CallbackError {
    /// `code` or `state` missing from the query string.
    MissingParams,
    /// Request state did not match the one-time state cookie.
    StateCookieMismatch,
    /// One-time PKCE verifier cookie is absent.
    MissingVerifier,
    /// Session resolution was rejected. Final; never retried.
    Session(SessionError),
    /// Provider interaction failed (discovery, exchange, validation,
    /// userinfo).
    Provider(OidcError),
    /// Token set or mapped profile failed schema validation.
    Schema(SchemaError),
    /// Session store infrastructure failure.
    Storage(StoreError),
    /// Cookie-sealing secret unavailable.
    Secret(SecretError),
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingParams => {
                write!(f, "missing code or state parameter from callback URL")
            }
            Self::StateCookieMismatch => write!(f, "state parameter mismatch"),
            Self::MissingVerifier => write!(f, "missing code verifier"),
            Self::Session(e) => write!(f, "{e}"),
            Self::Provider(e) => write!(f, "{e}"),
            Self::Schema(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "{e}"),
            Self::Secret(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CallbackError {}

impl From<SessionError> for CallbackError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

impl From<OidcError> for CallbackError {
    fn from(e: OidcError) -> Self {
        Self::Provider(e)
    }
}

impl From<SchemaError> for CallbackError {
    fn from(e: SchemaError) -> Self {
        Self::Schema(e)
    }
}

impl From<StoreError> for CallbackError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}

impl From<SecretError> for CallbackError {
    fn from(e: SecretError) -> Self {
        Self::Secret(e)
    }
}

/// Response mapping for the cookie-PKCE variant: validation failures get
/// fixed 400 bodies, everything else a generic 500.
pub struct PkceCallbackRejection(pub CallbackError);

impl IntoResponse for PkceCallbackRejection {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CallbackError::MissingParams => {
                (StatusCode::BAD_REQUEST, "Invalid callback parameters")
            }
            CallbackError::StateCookieMismatch => {
                (StatusCode::BAD_REQUEST, "Invalid state parameter")
            }
            CallbackError::MissingVerifier => (StatusCode::BAD_REQUEST, "Missing code verifier"),
            error => {
                tracing::error!(error = %error, "callback failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed")
            }
        };
        (status, message).into_response()
    }
}

/// Response mapping for the store-backed variant: every failure surfaces
/// as a generic server error; detail goes only to the log sink.
pub struct StoreCallbackRejection(pub CallbackError);

impl IntoResponse for StoreCallbackRejection {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "callback failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed").into_response()
    }
}

/// Validated inbound callback for the cookie-PKCE variant.
#[derive(Debug)]
pub struct PkceArtifacts {
    pub code: String,
    pub state: String,
    pub verifier: String,
    pub nonce: Option<String>,
}

/// Validates the cookie-PKCE callback against the one-time cookies.
pub fn validate_pkce(query: &CallbackQuery, jar: &CookieJar) -> Result<PkceArtifacts, CallbackError> {
    let (Some(code), Some(state)) = (query.code.clone(), query.state.clone()) else {
        tracing::error!("missing code or state parameter from callback URL");
        return Err(CallbackError::MissingParams);
    };

    let state_cookie = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    if state_cookie.as_deref() != Some(state.as_str()) {
        tracing::error!("callback state does not match the one-time state cookie");
        return Err(CallbackError::StateCookieMismatch);
    }

    let Some(verifier) = jar.get(VERIFIER_COOKIE).map(|c| c.value().to_string()) else {
        tracing::error!("one-time code verifier cookie is missing");
        return Err(CallbackError::MissingVerifier);
    };

    let nonce = jar.get(NONCE_COOKIE).map(|c| c.value().to_string());

    Ok(PkceArtifacts {
        code,
        state,
        verifier,
        nonce,
    })
}

/// Validates the store-backed callback: resolves the sealed session
/// cookie and loads a live, state-matching session record.
///
/// The record's state may match either the request `state` or the state
/// carried in the sealed cookie; a match against either source is
/// accepted.
pub async fn validate_store(
    query: &CallbackQuery,
    jar: &PrivateCookieJar,
    store: &dyn SessionStore,
) -> Result<(String, SessionRecord), CallbackError> {
    let (Some(code), Some(state)) = (query.code.clone(), query.state.clone()) else {
        tracing::error!("missing code or state parameter from callback URL");
        return Err(CallbackError::MissingParams);
    };

    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        tracing::error!("no session ID found in cookie");
        return Err(CallbackError::Session(SessionError::MissingCookie));
    };
    let Ok(payload) = serde_json::from_str::<SessionCookie>(cookie.value()) else {
        tracing::error!("no session ID found in cookie");
        return Err(CallbackError::Session(SessionError::MissingCookie));
    };

    let session_id = SessionId::new(payload.session_id);
    let Some(record) = store.get_session(&session_id).await? else {
        tracing::error!(
            session_id = %session_id,
            requested_state = %state,
            "session not found in store or it has expired"
        );
        return Err(CallbackError::Session(SessionError::NotFound {
            session_id: session_id.to_string(),
        }));
    };

    if !record.matches_state(&state) && !record.matches_state(&payload.state) {
        tracing::error!(
            session_id = %session_id,
            requested_state = %state,
            "session state mismatch"
        );
        return Err(CallbackError::Session(SessionError::StateMismatch {
            session_id: session_id.to_string(),
        }));
    }

    Ok((code, record))
}

/// Runs the cookie-PKCE callback to completion, returning the user
/// summary for the `user_info` cookie.
pub async fn run_pkce(
    state: &AppState,
    query: &CallbackQuery,
    jar: &CookieJar,
) -> Result<UserInfoSummary, CallbackError> {
    let artifacts = validate_pkce(query, jar)?;
    let binding = ExchangeBinding {
        pkce_verifier: Some(artifacts.verifier),
        expected_nonce: artifacts.nonce,
    };
    let (_tokens, claims, _profile) = exchange_and_map(state, &artifacts.code, &binding).await?;
    Ok(UserInfoSummary::from_claims(&claims))
}

/// Runs the store-backed callback to completion, attaching the identity
/// to the session record and persisting it.
pub async fn run_store(
    state: &AppState,
    query: &CallbackQuery,
    jar: &PrivateCookieJar,
) -> Result<(), CallbackError> {
    let (code, mut record) = validate_store(query, jar, state.store.as_ref()).await?;

    let (tokens, _claims, profile) =
        exchange_and_map(state, &code, &ExchangeBinding::default()).await?;

    record.attach_identity(profile.uid.clone(), profile, &state.provider_name, tokens)?;
    state.store.update_session(&record).await?;
    tracing::debug!(session_id = %record.id(), "session updated with user details");

    Ok(())
}

/// The shared path of the state machine: exchange the code, validate the
/// token set, fetch and map the identity claims.
async fn exchange_and_map(
    state: &AppState,
    code: &str,
    binding: &ExchangeBinding,
) -> Result<(TokenSet, ProviderClaims, UserProfile), CallbackError> {
    let provider = state.provider.get().await?;

    let raw = match provider.exchange_code(code, binding).await {
        Ok(raw) => raw,
        Err(error) => {
            log_exchange_failure(&error);
            return Err(CallbackError::Provider(error));
        }
    };
    tracing::info!("successfully exchanged authorization code for tokens");

    let tokens = TokenSet::from_response(&raw)?;

    let subject = tokens
        .id_token
        .as_deref()
        .map(decode_jwt_claims)
        .transpose()?
        .and_then(|claims| {
            claims
                .get("sub")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();

    let claims = provider.fetch_user_info(&tokens.access_token, &subject).await?;
    tracing::info!(sub = ?claims.sub, name = ?claims.name, "userinfo received");

    let profile = map_profile(&claims)?;

    Ok((tokens, claims, profile))
}

/// Logs the normalized exchange-failure bundle. The original error is
/// propagated unmodified; only a generic message ever reaches the client.
fn log_exchange_failure(error: &OidcError) {
    match error {
        OidcError::TokenExchange(failure) => match failure {
            ExchangeFailure::Provider {
                error,
                error_description,
                error_uri,
            } => {
                tracing::error!(
                    error = %error,
                    description = ?error_description,
                    uri = ?error_uri,
                    "token exchange rejected by provider"
                );
            }
            ExchangeFailure::InvalidResponse { message, body } => {
                tracing::error!(%message, %body, "token endpoint returned an unparseable response");
            }
            ExchangeFailure::Transport { message } => {
                tracing::error!(%message, "token exchange transport failure");
            }
            ExchangeFailure::Rejected { message } => {
                tracing::error!(%message, "token exchange failed");
            }
        },
        other => tracing::error!(error = %other, "token exchange failed"),
    }
}
