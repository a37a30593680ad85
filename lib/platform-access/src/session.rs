//! Session records persisted across the OAuth2 redirect round-trip.
//!
//! A [`SessionRecord`] is created when a login is initiated. It carries the
//! one-time `state` binding the browser's login attempt to its callback,
//! and is mutated exactly once by a successful callback to attach the
//! authenticated identity and its tokens.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SessionError};
use crate::user::UserProfile;

/// Unique identifier for a session.
///
/// Session IDs are opaque strings generated at login initiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session ID from a string.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh unique session ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A validated set of tokens returned by the provider's token endpoint.
///
/// The only hard requirement is a non-empty `access_token`; the remaining
/// fields are carried through as returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenSet {
    /// Creates a token set carrying only an access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
            expires_in: None,
            refresh_token: None,
            id_token: None,
        }
    }

    /// Parses a raw token-endpoint response into a validated token set.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidTokenSet` if the response does not
    /// match the expected shape or the access token is empty.
    pub fn from_response(response: &serde_json::Value) -> Result<Self, SchemaError> {
        let tokens: Self = serde_json::from_value(response.clone()).map_err(|e| {
            SchemaError::InvalidTokenSet {
                reason: e.to_string(),
            }
        })?;
        if tokens.access_token.is_empty() {
            return Err(SchemaError::InvalidTokenSet {
                reason: "access_token is empty".to_string(),
            });
        }
        Ok(tokens)
    }
}

/// Server-side record tracking one browser's authentication transaction.
///
/// The `state` is bound at creation and never mutated. The identity fields
/// (`user_id`, `user`, `tokens`) start empty and are populated exactly once,
/// atomically, by [`SessionRecord::attach_identity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    id: SessionId,
    state: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    user_id: Option<String>,
    user: Option<UserProfile>,
    tokens: HashMap<String, TokenSet>,
}

impl SessionRecord {
    /// Creates a new record bound to `state`, valid for `ttl`.
    #[must_use]
    pub fn new(id: SessionId, state: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            state,
            created_at: now,
            expires_at: now + ttl,
            user_id: None,
            user: None,
            tokens: HashMap::new(),
        }
    }

    /// Reconstructs a record from stored fields.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: SessionId,
        state: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        user_id: Option<String>,
        user: Option<UserProfile>,
        tokens: HashMap<String, TokenSet>,
    ) -> Self {
        Self {
            id,
            state,
            created_at,
            expires_at,
            user_id,
            user,
            tokens,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the one-time state bound at creation.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns when the record was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the record expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the authenticated user's ID, if the callback has completed.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the attached profile, if the callback has completed.
    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    /// Returns the validated token sets keyed by provider name.
    #[must_use]
    pub fn tokens(&self) -> &HashMap<String, TokenSet> {
        &self.tokens
    }

    /// Returns true once the record's expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if `state` matches the state bound at creation.
    #[must_use]
    pub fn matches_state(&self, state: &str) -> bool {
        self.state == state
    }

    /// Attaches the authenticated identity to the record.
    ///
    /// Sets `user_id`, `user`, and the provider's token set together, so a
    /// persisted record is either anonymous or fully bound.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyBound` if the record already carries
    /// an identity: a session is bound exactly once.
    pub fn attach_identity(
        &mut self,
        user_id: String,
        user: UserProfile,
        provider: &str,
        tokens: TokenSet,
    ) -> Result<(), SessionError> {
        if self.user_id.is_some() {
            return Err(SessionError::AlreadyBound {
                session_id: self.id.to_string(),
            });
        }
        self.user_id = Some(user_id);
        self.user = Some(user);
        self.tokens.insert(provider.to_string(), tokens);
        Ok(())
    }
}
