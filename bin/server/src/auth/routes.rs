//! Authentication routes for login, callback, logout, and the identity
//! surfaces consumed by the browser.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, PrivateCookieJar, SameSite};
use base64::Engine;
use chrono::Duration as ChronoDuration;
use time::Duration as TimeDuration;
use waypoint_platform_access::{SessionId, StoreError};

use super::AppState;
use super::callback::{
    CallbackQuery, NONCE_COOKIE, PkceCallbackRejection, STATE_COOKIE, SESSION_COOKIE,
    SessionCookie, StoreCallbackRejection, USER_INFO_COOKIE, VERIFIER_COOKIE, run_pkce, run_store,
};
use super::oidc::{OidcClient, OidcError};
use super::secrets::{SecretError, sealing_key};
use crate::config::{CallbackVariant, SessionConfig};

/// Landing page after a successful callback.
const DASHBOARD_PATH: &str = "/dashboard";
/// Lifetime of the one-time login cookies.
const LOGIN_COOKIE_MAX_AGE: TimeDuration = TimeDuration::minutes(10);
/// Lifetime of the `user_info` cookie.
const USER_INFO_MAX_AGE: TimeDuration = TimeDuration::hours(1);

/// 302 redirect. The front-channel contract is Found, not the 303 that
/// `axum::response::Redirect::to` produces.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Initiates the login flow by redirecting to the identity provider.
///
/// The cookie-PKCE variant persists the one-time artifacts in cookies;
/// the store-backed variant creates a session record bound to the state
/// and seals its ID into the session cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, LoginError> {
    let provider = state.provider.get().await?;

    match state.variant {
        CallbackVariant::CookiePkce => {
            let request = provider.authorization_request();

            let jar = jar
                .add(one_time_cookie(
                    STATE_COOKIE,
                    request.state,
                    &state.session_config,
                ))
                .add(one_time_cookie(
                    NONCE_COOKIE,
                    request.nonce,
                    &state.session_config,
                ))
                .add(one_time_cookie(
                    VERIFIER_COOKIE,
                    request.pkce_verifier,
                    &state.session_config,
                ));

            tracing::info!("redirecting to identity provider");
            Ok((jar, found(&request.url)).into_response())
        }
        CallbackVariant::StoreBacked => {
            let login_state = OidcClient::random_state();
            let record = state
                .store
                .create_session(
                    &login_state,
                    ChronoDuration::minutes(state.session_config.ttl_minutes),
                )
                .await?;
            let url = provider.authorization_url_for_state(&login_state);

            let secret = state.secrets.get().await?;
            let key = sealing_key(secret)?;
            let payload = serde_json::to_string(&SessionCookie {
                session_id: record.id().to_string(),
                state: login_state,
            })
            .expect("serialize session cookie");

            let jar = PrivateCookieJar::from_headers(&HeaderMap::new(), key).add(
                session_cookie(payload, &state.session_config),
            );

            tracing::info!(session_id = %record.id(), "created session, redirecting to identity provider");
            Ok((jar, found(&url)).into_response())
        }
    }
}

/// Handles the OIDC callback for the cookie-PKCE variant.
///
/// On success: clears the three one-time cookies, sets the `user_info`
/// cookie, and redirects to the dashboard.
pub async fn pkce_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<Response, PkceCallbackRejection> {
    let user_info = run_pkce(&state, &query, &jar)
        .await
        .map_err(PkceCallbackRejection)?;

    let encoded = base64::engine::general_purpose::STANDARD
        .encode(serde_json::to_vec(&user_info).expect("serialize user info"));

    let jar = jar
        .add(removal_cookie(STATE_COOKIE, &state.session_config))
        .add(removal_cookie(NONCE_COOKIE, &state.session_config))
        .add(removal_cookie(VERIFIER_COOKIE, &state.session_config))
        .add(user_info_cookie(encoded, &state.session_config));

    Ok((jar, found(DASHBOARD_PATH)).into_response())
}

/// Handles the OIDC callback for the store-backed variant.
pub async fn store_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, StoreCallbackRejection> {
    let secret = state
        .secrets
        .get()
        .await
        .map_err(|e| StoreCallbackRejection(e.into()))?;
    let key = sealing_key(secret).map_err(|e| StoreCallbackRejection(e.into()))?;
    let jar = PrivateCookieJar::from_headers(&headers, key);

    run_store(&state, &query, &jar)
        .await
        .map_err(StoreCallbackRejection)?;

    Ok(found(DASHBOARD_PATH))
}

/// Serves the identity provider's public key material verbatim.
///
/// Any underlying failure collapses to a fixed body that never leaks
/// error detail.
pub async fn jwks(State(state): State<Arc<AppState>>) -> Response {
    match fetch_provider_jwks(&state).await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to retrieve provider JWKS");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "application/json")],
                r#"{"message":"Error retrieving JWKS"}"#,
            )
                .into_response()
        }
    }
}

async fn fetch_provider_jwks(state: &AppState) -> Result<Vec<u8>, OidcError> {
    let provider = state.provider.get().await?;
    provider.fetch_jwks().await
}

/// Returns the decoded `user_info` cookie, or null. Always 200.
pub async fn user_info(jar: CookieJar) -> Response {
    let decoded = match jar.get(USER_INFO_COOKIE) {
        Some(cookie) => match decode_user_info(cookie.value()) {
            Some(value) => Some(value),
            None => {
                tracing::warn!("failed to decode user_info cookie");
                None
            }
        },
        None => None,
    };

    axum::Json(serde_json::json!({ "userInfo": decoded })).into_response()
}

fn decode_user_info(value: &str) -> Option<serde_json::Value> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(value).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Clears the authenticated cookies and returns to the landing page.
///
/// In the store-backed variant the session record is deleted as well;
/// cleanup failures are ignored, the cookies are gone either way.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> impl IntoResponse {
    tracing::info!("clearing user session");

    if state.variant == CallbackVariant::StoreBacked {
        if let Err(e) = delete_store_session(&state, &headers).await {
            tracing::warn!(error = %e, "failed to delete session on logout");
        }
    }

    let jar = jar
        .add(removal_cookie(USER_INFO_COOKIE, &state.session_config))
        .add(removal_cookie(SESSION_COOKIE, &state.session_config));

    (jar, found("/"))
}

async fn delete_store_session(state: &AppState, headers: &HeaderMap) -> Result<(), StoreError> {
    let Ok(secret) = state.secrets.get().await else {
        return Ok(());
    };
    let Ok(key) = sealing_key(secret) else {
        return Ok(());
    };
    let jar = PrivateCookieJar::from_headers(headers, key);
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(());
    };
    let Ok(payload) = serde_json::from_str::<SessionCookie>(cookie.value()) else {
        return Ok(());
    };
    state
        .store
        .delete_session(&SessionId::new(payload.session_id))
        .await
}

/// Login initiation errors. Full detail goes to the log sink; clients see
/// a generic failure.
#[derive(Debug)]
pub enum LoginError {
    Provider(OidcError),
    Storage(StoreError),
    Secret(SecretError),
}

impl From<OidcError> for LoginError {
    fn from(e: OidcError) -> Self {
        Self::Provider(e)
    }
}

impl From<StoreError> for LoginError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}

impl From<SecretError> for LoginError {
    fn from(e: SecretError) -> Self {
        Self::Secret(e)
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            Self::Provider(e) => {
                tracing::error!(error = %e, "failed to generate authorization URL");
            }
            Self::Storage(e) => {
                tracing::error!(error = %e, "failed to create session");
            }
            Self::Secret(e) => {
                tracing::error!(error = %e, "failed to obtain session secret");
            }
        }
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed").into_response()
    }
}

fn one_time_cookie(name: &'static str, value: String, config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(LOGIN_COOKIE_MAX_AGE)
        .build()
}

fn user_info_cookie(value: String, config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((USER_INFO_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(USER_INFO_MAX_AGE)
        .build()
}

fn session_cookie(value: String, config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(config.ttl_minutes))
        .build()
}

fn removal_cookie(name: &'static str, config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_user_info_roundtrip() {
        let payload = json!({ "sub": "user-123", "name": "Test User" });
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(serde_json::to_vec(&payload).expect("serialize"));

        let decoded = decode_user_info(&encoded).expect("decode");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn decode_user_info_rejects_garbage() {
        assert!(decode_user_info("%%%not-base64%%%").is_none());

        let not_json = base64::engine::general_purpose::STANDARD.encode(b"not json");
        assert!(decode_user_info(&not_json).is_none());
    }

    #[test]
    fn one_time_cookies_expire_after_ten_minutes() {
        let config = SessionConfig::default();
        let cookie = one_time_cookie(STATE_COOKIE, "s".to_string(), &config);
        assert_eq!(cookie.max_age(), Some(TimeDuration::seconds(600)));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn removal_cookie_has_zero_max_age() {
        let config = SessionConfig::default();
        let cookie = removal_cookie(USER_INFO_COOKIE, &config);
        assert_eq!(cookie.max_age(), Some(TimeDuration::ZERO));
        assert_eq!(cookie.value(), "");
    }
}
