//! OIDC client implementation using the openidconnect crate.
//!
//! Provider metadata is discovered once per process through
//! [`ProviderCache`]; the resulting [`OidcClient`] builds authorization
//! URLs, exchanges authorization codes, and fetches identity claims.

use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::AuthType;
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreErrorResponseType, CoreProviderMetadata,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet, EndpointNotSet,
    EndpointSet, IssuerUrl, Nonce, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    RequestTokenError, Scope, StandardErrorResponse,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use waypoint_platform_access::ProviderClaims;

use crate::config::OidcSettings;

/// `max_age` parameter sent on every authorization request: the provider
/// must re-authenticate users whose session is older than this.
const MAX_AGE_SECONDS: &str = "300";

/// RFC 7523 assertion type for `private_key_jwt` client authentication.
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Client type produced by discovery: authorization endpoint known,
/// token and userinfo endpoints as advertised by the metadata.
type DiscoveredClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// Client authentication method bound at discovery time.
enum ClientAuth {
    /// Authenticate with the configured client secret.
    Secret(ClientSecret),
    /// Authenticate with RFC 7523 client assertions signed by the
    /// imported private key.
    PrivateKeyJwt { key: EncodingKey },
}

/// OIDC client for authenticating users against the identity provider.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    auth: ClientAuth,
    redirect_url: RedirectUrl,
    settings: OidcSettings,
    http_client: reqwest::Client,
}

/// One-time artifacts for an outbound authorization request.
///
/// The caller is responsible for persisting `state`, `nonce`, and
/// `pkce_verifier` (cookies or session store) before redirecting.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
    pub pkce_verifier: String,
}

/// Inputs carried from login initiation into the code exchange.
#[derive(Debug, Clone, Default)]
pub struct ExchangeBinding {
    /// PKCE code verifier, when the login set a code challenge.
    pub pkce_verifier: Option<String>,
    /// Expected nonce, checked against the ID token's embedded claims.
    pub expected_nonce: Option<String>,
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata and
    /// importing the signing key material.
    pub async fn discover(settings: OidcSettings) -> Result<Self, OidcError> {
        if settings.issuer_url.is_empty() {
            return Err(OidcError::Configuration(
                "issuer URL is not configured".to_string(),
            ));
        }
        if settings.client_id.is_empty() {
            return Err(OidcError::Configuration(
                "client ID is not configured".to_string(),
            ));
        }

        let issuer_url = IssuerUrl::new(settings.issuer_url.clone())
            .map_err(|e| OidcError::Configuration(format!("invalid issuer URL: {e}")))?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                OidcError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| OidcError::Discovery(format!("failed to discover provider: {e}")))?;

        let redirect_url = RedirectUrl::new(settings.redirect_uri.clone())
            .map_err(|e| OidcError::Configuration(format!("invalid redirect URI: {e}")))?;

        let auth = match settings.private_key_pem.as_deref() {
            Some(pem) => {
                let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    OidcError::Discovery(format!("failed to import signing key: {e}"))
                })?;
                ClientAuth::PrivateKeyJwt { key }
            }
            None => ClientAuth::Secret(ClientSecret::new(
                settings.client_secret.clone().unwrap_or_default(),
            )),
        };

        tracing::info!(issuer = %settings.issuer_url, "discovered OIDC provider");

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(settings.client_id.clone()),
            auth,
            redirect_url,
            settings,
            http_client,
        })
    }

    /// Generates a cryptographically random state value.
    #[must_use]
    pub fn random_state() -> String {
        CsrfToken::new_random().secret().clone()
    }

    /// Builds an authorization request with fresh state, nonce, and PKCE
    /// artifacts.
    #[must_use]
    pub fn authorization_request(&self) -> AuthorizationRequest {
        let client = self.core_client();
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("acr_values", self.settings.acr_values.clone())
            .add_extra_param("max_age", MAX_AGE_SECONDS);

        for scope in self.settings.scope.split_whitespace() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let (url, state, nonce) = request.url();

        AuthorizationRequest {
            url: url.to_string(),
            state: state.secret().clone(),
            nonce: nonce.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    /// Builds an authorization URL bound to a caller-supplied state, for
    /// the store-backed flow where the state lives on the session record
    /// and no PKCE challenge is set.
    #[must_use]
    pub fn authorization_url_for_state(&self, state: &str) -> String {
        let client = self.core_client();
        let state = state.to_string();

        let mut request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                move || CsrfToken::new(state),
                Nonce::new_random,
            )
            .add_extra_param("acr_values", self.settings.acr_values.clone())
            .add_extra_param("max_age", MAX_AGE_SECONDS);

        for scope in self.settings.scope.split_whitespace() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let (url, _state, _nonce) = request.url();
        url.to_string()
    }

    /// Exchanges the authorization code for tokens.
    ///
    /// Single-attempt: a failure here is terminal for the callback. The
    /// raw response is returned for schema validation by the caller.
    pub async fn exchange_code(
        &self,
        code: &str,
        binding: &ExchangeBinding,
    ) -> Result<Value, OidcError> {
        let client = self.core_client();

        let mut token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| {
                OidcError::TokenExchange(ExchangeFailure::Rejected {
                    message: format!("token endpoint error: {e}"),
                })
            })?;

        if let Some(verifier) = &binding.pkce_verifier {
            token_request = token_request.set_pkce_verifier(PkceCodeVerifier::new(verifier.clone()));
        }

        if let ClientAuth::PrivateKeyJwt { key } = &self.auth {
            let assertion = self.client_assertion(key)?;
            token_request = token_request
                .add_extra_param("client_assertion_type", CLIENT_ASSERTION_TYPE)
                .add_extra_param("client_assertion", assertion);
        }

        let token_response = token_request
            .request_async(&self.http_client)
            .await
            .map_err(|e| OidcError::TokenExchange(ExchangeFailure::from_token_error(e)))?;

        let raw = serde_json::to_value(&token_response).map_err(|e| {
            OidcError::TokenValidation(format!("failed to serialize token response: {e}"))
        })?;

        if let Some(expected) = &binding.expected_nonce {
            self.check_nonce(&raw, expected)?;
        }

        Ok(raw)
    }

    /// Fetches identity claims from the provider's userinfo endpoint.
    pub async fn fetch_user_info(
        &self,
        access_token: &str,
        expected_subject: &str,
    ) -> Result<ProviderClaims, OidcError> {
        let endpoint = self.provider_metadata.userinfo_endpoint().ok_or_else(|| {
            OidcError::Configuration(
                "provider metadata does not include a userinfo endpoint".to_string(),
            )
        })?;

        let response = self
            .http_client
            .get(endpoint.url().clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OidcError::UserInfo(format!("userinfo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::UserInfo(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }

        let claims: ProviderClaims = response
            .json()
            .await
            .map_err(|e| OidcError::UserInfo(format!("failed to parse userinfo response: {e}")))?;

        if !expected_subject.is_empty() {
            let actual = claims.sub.as_deref().unwrap_or_default();
            if actual != expected_subject {
                return Err(OidcError::UserInfo(format!(
                    "userinfo subject '{actual}' does not match token subject '{expected_subject}'"
                )));
            }
        }

        Ok(claims)
    }

    /// Fetches the provider's public key material verbatim from the
    /// advertised `jwks_uri`.
    pub async fn fetch_jwks(&self) -> Result<Vec<u8>, OidcError> {
        let endpoint = self.provider_metadata.jwks_uri();

        let response = self
            .http_client
            .get(endpoint.url().clone())
            .send()
            .await
            .map_err(|e| OidcError::Discovery(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::Discovery(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| OidcError::Discovery(format!("failed to read JWKS response: {e}")))?;

        Ok(body.to_vec())
    }

    fn core_client(&self) -> DiscoveredClient {
        let secret = match &self.auth {
            ClientAuth::Secret(secret) => Some(secret.clone()),
            ClientAuth::PrivateKeyJwt { .. } => None,
        };
        let auth_type = match &self.auth {
            ClientAuth::Secret(_) => AuthType::BasicAuth,
            // client_id travels in the body alongside the assertion
            ClientAuth::PrivateKeyJwt { .. } => AuthType::RequestBody,
        };

        CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            secret,
        )
        .set_auth_type(auth_type)
        .set_redirect_uri(self.redirect_url.clone())
    }

    /// Signs an RFC 7523 client assertion for the token endpoint.
    fn client_assertion(&self, key: &EncodingKey) -> Result<String, OidcError> {
        let token_endpoint = self.provider_metadata.token_endpoint().ok_or_else(|| {
            OidcError::Configuration(
                "provider metadata does not include a token endpoint".to_string(),
            )
        })?;

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.settings.client_id,
            sub: &self.settings.client_id,
            aud: token_endpoint.url().as_str(),
            exp: now + 300,
            iat: now,
            jti: ulid::Ulid::new().to_string(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS512), &claims, key)
            .map_err(|e| OidcError::Configuration(format!("failed to sign client assertion: {e}")))
    }

    fn check_nonce(&self, raw_response: &Value, expected: &str) -> Result<(), OidcError> {
        let id_token = raw_response
            .get("id_token")
            .and_then(Value::as_str)
            .ok_or_else(|| OidcError::TokenValidation("no ID token in response".to_string()))?;

        let claims = decode_jwt_claims(id_token)?;
        let nonce = claims.get("nonce").and_then(Value::as_str).unwrap_or_default();
        if nonce != expected {
            return Err(OidcError::TokenValidation(
                "nonce mismatch in ID token".to_string(),
            ));
        }
        Ok(())
    }
}

/// RFC 7523 client assertion claims: issuer and subject are both the
/// client ID, the audience is the token endpoint.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
    jti: String,
}

/// Decodes the embedded claims of a compact JWT without verifying the
/// signature, for reading claims the typed response does not surface.
pub fn decode_jwt_claims(token: &str) -> Result<Value, OidcError> {
    // JWT is base64url(header).base64url(payload).signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(OidcError::TokenValidation("invalid JWT format".to_string()));
    }

    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| OidcError::TokenValidation(format!("failed to decode JWT payload: {e}")))?;

    serde_json::from_slice(&payload)
        .map_err(|e| OidcError::TokenValidation(format!("failed to parse JWT payload: {e}")))
}

/// Normalized token-exchange failure detail.
///
/// Kept as a tagged union so the log sink receives structured
/// provider/transport detail while clients only ever see a generic
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeFailure {
    /// The token endpoint returned a structured OAuth error body.
    Provider {
        error: String,
        error_description: Option<String>,
        error_uri: Option<String>,
    },
    /// The HTTP request itself failed.
    Transport { message: String },
    /// The endpoint responded with a body that could not be parsed.
    InvalidResponse { message: String, body: String },
    /// Any other rejection.
    Rejected { message: String },
}

impl ExchangeFailure {
    /// Normalizes an openidconnect token-request error.
    pub fn from_token_error<RE>(
        error: RequestTokenError<RE, StandardErrorResponse<CoreErrorResponseType>>,
    ) -> Self
    where
        RE: std::error::Error + 'static,
    {
        match error {
            RequestTokenError::ServerResponse(response) => {
                let error = serde_json::to_value(response.error())
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| format!("{:?}", response.error()));
                Self::Provider {
                    error,
                    error_description: response.error_description().cloned(),
                    error_uri: response.error_uri().cloned(),
                }
            }
            RequestTokenError::Request(e) => Self::Transport {
                message: e.to_string(),
            },
            RequestTokenError::Parse(e, body) => Self::InvalidResponse {
                message: e.to_string(),
                body: String::from_utf8_lossy(&body).into_owned(),
            },
            RequestTokenError::Other(message) => Self::Rejected { message },
        }
    }
}

impl std::fmt::Display for ExchangeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider {
                error,
                error_description,
                ..
            } => match error_description {
                Some(description) => {
                    write!(f, "provider rejected the exchange: {error}: {description}")
                }
                None => write!(f, "provider rejected the exchange: {error}"),
            },
            Self::Transport { message } => {
                write!(f, "token request transport failure: {message}")
            }
            Self::InvalidResponse { message, .. } => {
                write!(f, "unparseable token response: {message}")
            }
            Self::Rejected { message } => write!(f, "{message}"),
        }
    }
}

/// OIDC-related errors.
#[derive(Debug)]
pub enum OidcError {
    /// Configuration error (missing settings, invalid URLs).
    Configuration(String),
    /// Failed to discover provider metadata or import key material.
    Discovery(String),
    /// Token exchange failed.
    TokenExchange(ExchangeFailure),
    /// Token validation failed.
    TokenValidation(String),
    /// Userinfo fetch failed.
    UserInfo(String),
}

impl std::fmt::Display for OidcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "OIDC configuration error: {msg}"),
            Self::Discovery(msg) => write!(f, "OIDC discovery error: {msg}"),
            Self::TokenExchange(failure) => write!(f, "OIDC token exchange error: {failure}"),
            Self::TokenValidation(msg) => write!(f, "OIDC token validation error: {msg}"),
            Self::UserInfo(msg) => write!(f, "OIDC userinfo error: {msg}"),
        }
    }
}

impl std::error::Error for OidcError {}

/// Process-wide, single-flight cache of the discovered provider client.
///
/// Owned by the application state rather than a global, so tests can
/// construct and drop their own. Concurrent first callers share one
/// in-flight discovery and observe the same cached instance.
pub struct ProviderCache {
    settings: OidcSettings,
    cell: OnceCell<Arc<OidcClient>>,
}

impl ProviderCache {
    /// Creates an empty cache for the given provider settings.
    #[must_use]
    pub fn new(settings: OidcSettings) -> Self {
        Self {
            settings,
            cell: OnceCell::new(),
        }
    }

    /// Returns the cached client, discovering the provider on first use.
    ///
    /// # Errors
    ///
    /// Returns `OidcError::Configuration` when required settings are
    /// absent, or `OidcError::Discovery` when the metadata fetch or key
    /// import fails. A failed discovery is not cached.
    pub async fn get(&self) -> Result<Arc<OidcClient>, OidcError> {
        self.cell
            .get_or_try_init(|| async {
                OidcClient::discover(self.settings.clone()).await.map(Arc::new)
            })
            .await
            .map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode_part(value: &Value) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(value).expect("serialize"))
    }

    fn fake_jwt(payload: &Value) -> String {
        let header = encode_part(&json!({ "alg": "RS256", "typ": "JWT" }));
        let body = encode_part(payload);
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"sig");
        format!("{header}.{body}.{signature}")
    }

    #[test]
    fn decode_jwt_claims_reads_payload() {
        let token = fake_jwt(&json!({ "sub": "user-123", "nonce": "n-1" }));
        let claims = decode_jwt_claims(&token).expect("decode");
        assert_eq!(claims["sub"], "user-123");
        assert_eq!(claims["nonce"], "n-1");
    }

    #[test]
    fn decode_jwt_claims_rejects_malformed_tokens() {
        assert!(decode_jwt_claims("not-a-jwt").is_err());
        assert!(decode_jwt_claims("a.b").is_err());
        assert!(decode_jwt_claims("a.%%%.c").is_err());
    }

    #[test]
    fn exchange_failure_provider_display() {
        let failure = ExchangeFailure::Provider {
            error: "invalid_grant".to_string(),
            error_description: Some("code expired".to_string()),
            error_uri: None,
        };
        let rendered = failure.to_string();
        assert!(rendered.contains("invalid_grant"));
        assert!(rendered.contains("code expired"));
    }

    #[test]
    fn exchange_failure_transport_display() {
        let failure = ExchangeFailure::Transport {
            message: "connection refused".to_string(),
        };
        assert!(failure.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn provider_cache_rejects_missing_issuer() {
        let settings: OidcSettings = serde_json::from_str(r#"{}"#).expect("settings");
        let cache = ProviderCache::new(settings);
        let result = cache.get().await;
        assert!(matches!(result, Err(OidcError::Configuration(_))));
    }

    #[tokio::test]
    async fn provider_cache_rejects_missing_client_id() {
        let settings: OidcSettings =
            serde_json::from_str(r#"{ "issuer_url": "https://auth.example.com" }"#)
                .expect("settings");
        let cache = ProviderCache::new(settings);
        let result = cache.get().await;
        assert!(matches!(result, Err(OidcError::Configuration(_))));
    }
}
