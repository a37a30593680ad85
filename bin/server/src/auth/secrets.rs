//! Secret material for sealing the browser session cookie.
//!
//! The symmetric secret lives in a secret backend behind the
//! [`SecretStore`] seam and is fetched at most once per process through
//! [`SessionSecrets`].

use async_trait::async_trait;
use axum_extra::extract::cookie::Key;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Errors from secret retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// The secret is not present in the backend.
    Missing { name: String },
    /// The backend could not be reached, or the material is unusable.
    Unavailable { details: String },
}

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name } => {
                write!(f, "secret '{name}' not found")
            }
            Self::Unavailable { details } => {
                write!(f, "secret backend unavailable: {details}")
            }
        }
    }
}

impl std::error::Error for SecretError {}

/// Backend seam for secret material.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the secret stored under `name`.
    async fn fetch(&self, name: &str) -> Result<String, SecretError>;
}

/// Reads secrets from process environment variables.
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch(&self, name: &str) -> Result<String, SecretError> {
        std::env::var(name).map_err(|_| SecretError::Missing {
            name: name.to_string(),
        })
    }
}

/// Fixed secret for tests and local development.
pub struct StaticSecretStore(pub String);

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn fetch(&self, _name: &str) -> Result<String, SecretError> {
        Ok(self.0.clone())
    }
}

/// Process-wide, single-flight cache of the cookie-sealing secret.
///
/// Owned by the application state rather than a global, so tests can
/// construct their own with a substitute backend. Concurrent first
/// callers share one in-flight fetch.
pub struct SessionSecrets {
    name: String,
    store: Arc<dyn SecretStore>,
    cell: OnceCell<String>,
}

impl SessionSecrets {
    /// Creates an empty cache reading `name` from `store` on first use.
    #[must_use]
    pub fn new(name: impl Into<String>, store: Arc<dyn SecretStore>) -> Self {
        Self {
            name: name.into(),
            store,
            cell: OnceCell::new(),
        }
    }

    /// Returns the session secret, fetching it from the backend on first
    /// use.
    pub async fn get(&self) -> Result<&str, SecretError> {
        self.cell
            .get_or_try_init(|| async { self.store.fetch(&self.name).await })
            .await
            .map(String::as_str)
    }
}

/// Derives the cookie-sealing key from the session secret.
///
/// # Errors
///
/// Returns `SecretError::Unavailable` for secrets shorter than the
/// 32 bytes the key derivation requires.
pub fn sealing_key(secret: &str) -> Result<Key, SecretError> {
    if secret.len() < 32 {
        return Err(SecretError::Unavailable {
            details: "session secret must be at least 32 bytes".to_string(),
        });
    }
    Ok(Key::derive_from(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        hits: AtomicUsize,
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        async fn fetch(&self, _name: &str) -> Result<String, SecretError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok("a-secret-that-is-at-least-32-bytes-long".to_string())
        }
    }

    #[tokio::test]
    async fn secret_is_fetched_at_most_once() {
        let store = Arc::new(CountingStore {
            hits: AtomicUsize::new(0),
        });
        let secrets = SessionSecrets::new("SESSION_SECRET", store.clone());

        let (a, b, c) = tokio::join!(secrets.get(), secrets.get(), secrets.get());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(a.expect("secret"), b.expect("secret"));
        assert_eq!(store.hits.load(Ordering::SeqCst), 1);

        // Subsequent calls observe the cached value.
        let again = secrets.get().await.expect("secret");
        assert_eq!(again, "a-secret-that-is-at-least-32-bytes-long");
        assert_eq!(store.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn static_store_returns_its_secret() {
        let secrets = SessionSecrets::new(
            "ignored",
            Arc::new(StaticSecretStore("fixed-secret".to_string())),
        );
        assert_eq!(secrets.get().await.expect("secret"), "fixed-secret");
    }

    #[test]
    fn sealing_key_rejects_short_secrets() {
        assert!(sealing_key("too-short").is_err());
        assert!(sealing_key("a-secret-that-is-at-least-32-bytes-long").is_ok());
    }
}
