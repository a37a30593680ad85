//! Error types for the platform-access crate.
//!
//! The login flow distinguishes three failure classes:
//! - `SessionError`: logical rejections of a callback (authentication
//!   failures, not defects). These are final and must never be retried.
//! - `SchemaError`: provider data or mapped profile failed shape validation.
//! - `StoreError`: the session store could not be reached. Possibly
//!   transient; callers may retry.

use std::fmt;

/// Logical rejection of a callback's session resolution.
///
/// A rejected callback is an authentication failure and is final: the
/// one-time state binding has been consumed or never existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session ID could be resolved from the browser cookie.
    MissingCookie,
    /// Session was not found in the store, or had already expired.
    NotFound { session_id: String },
    /// Neither the request state nor the cookie state matched the record.
    StateMismatch { session_id: String },
    /// The record already carries an authenticated identity.
    AlreadyBound { session_id: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCookie => {
                write!(f, "no session ID found in cookie")
            }
            Self::NotFound { session_id } => {
                write!(f, "session '{session_id}' not found or expired")
            }
            Self::StateMismatch { session_id } => {
                write!(f, "state mismatch for session '{session_id}'")
            }
            Self::AlreadyBound { session_id } => {
                write!(f, "session '{session_id}' already carries an identity")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Shape violation in provider data or the mapped profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The subject claim is absent or empty.
    MissingSubject,
    /// The token endpoint response does not match the expected token shape.
    InvalidTokenSet { reason: String },
    /// The mapped profile failed validation.
    InvalidProfile { reason: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSubject => {
                write!(f, "identity claims are missing the subject")
            }
            Self::InvalidTokenSet { reason } => {
                write!(f, "invalid token set: {reason}")
            }
            Self::InvalidProfile { reason } => {
                write!(f, "invalid user profile: {reason}")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Session store infrastructure failure.
///
/// Unlike `SessionError`, this may be transient and may be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or returned corrupt data.
    Unavailable { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => {
                write!(f, "session store unavailable: {details}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_not_found_display() {
        let err = SessionError::NotFound {
            session_id: "sess_123".to_string(),
        };
        assert!(err.to_string().contains("sess_123"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn session_error_missing_cookie_display() {
        let err = SessionError::MissingCookie;
        assert_eq!(err.to_string(), "no session ID found in cookie");
    }

    #[test]
    fn session_error_state_mismatch_display() {
        let err = SessionError::StateMismatch {
            session_id: "sess_456".to_string(),
        };
        assert!(err.to_string().contains("state mismatch"));
        assert!(err.to_string().contains("sess_456"));
    }

    #[test]
    fn schema_error_missing_subject_display() {
        let err = SchemaError::MissingSubject;
        assert!(err.to_string().contains("subject"));
    }

    #[test]
    fn schema_error_invalid_token_set_display() {
        let err = SchemaError::InvalidTokenSet {
            reason: "missing field `access_token`".to_string(),
        };
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::Unavailable {
            details: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("connection refused"));
    }
}
