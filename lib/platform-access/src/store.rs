//! Persistence seam for session records.
//!
//! Implementations are remote I/O and must be awaited. Logical rejections
//! (absent or expired records) surface as `Ok(None)` and are final; only
//! [`StoreError`] may be transient and worth a retry by the caller.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::session::{SessionId, SessionRecord};

/// Session record persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates and persists a new record bound to `state`, valid for `ttl`.
    async fn create_session(
        &self,
        state: &str,
        ttl: Duration,
    ) -> Result<SessionRecord, StoreError>;

    /// Returns the record for `id`.
    ///
    /// A record whose expiry has passed is treated identically to an
    /// absent record and yields `None`, even when it is still physically
    /// retrievable.
    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Replaces the stored record keyed by its ID. Full-record overwrite,
    /// not a merge.
    async fn update_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Deletes the record for `id` (logout).
    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError>;

    /// Deletes expired records, returning how many were removed.
    async fn delete_expired(&self) -> Result<u64, StoreError>;
}

/// In-memory session store for tests and local development.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(
        &self,
        state: &str,
        ttl: Duration,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(SessionId::generate(), state.to_string(), ttl);
        self.records
            .write()
            .await
            .insert(record.id().clone(), record.clone());
        Ok(record)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(id).filter(|r| !r.is_expired()).cloned())
    }

    async fn update_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.id().clone(), record.clone());
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired());
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TokenSet;
    use crate::user::UserProfile;

    fn test_profile() -> UserProfile {
        UserProfile {
            uid: "user-123".to_string(),
            selected_role_id: String::new(),
            display_name: "Test User".to_string(),
            rbac_roles: vec![],
            org_memberships: vec![],
            user_orgs: vec![],
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let store = MemorySessionStore::new();
        let record = store
            .create_session("state-abc", Duration::minutes(60))
            .await
            .expect("create");

        let fetched = store
            .get_session(record.id())
            .await
            .expect("get")
            .expect("record present");
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn missing_record_yields_none() {
        let store = MemorySessionStore::new();
        let fetched = store
            .get_session(&SessionId::new("missing".to_string()))
            .await
            .expect("get");
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn expired_record_is_treated_as_absent() {
        let store = MemorySessionStore::new();
        let record = store
            .create_session("state-abc", Duration::seconds(-1))
            .await
            .expect("create");

        // Still physically present, but logically gone.
        let fetched = store.get_session(record.id()).await.expect("get");
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn update_overwrites_the_full_record() {
        let store = MemorySessionStore::new();
        let mut record = store
            .create_session("state-abc", Duration::minutes(60))
            .await
            .expect("create");

        record
            .attach_identity(
                "user-123".to_string(),
                test_profile(),
                "cis2",
                TokenSet::new("access-token"),
            )
            .expect("attach");
        store.update_session(&record).await.expect("update");

        let fetched = store
            .get_session(record.id())
            .await
            .expect("get")
            .expect("record present");
        assert_eq!(fetched.user_id(), Some("user-123"));
        assert!(fetched.tokens().contains_key("cis2"));
    }

    #[tokio::test]
    async fn delete_session_removes_the_record() {
        let store = MemorySessionStore::new();
        let record = store
            .create_session("state-abc", Duration::minutes(60))
            .await
            .expect("create");

        store.delete_session(record.id()).await.expect("delete");
        assert!(store.get_session(record.id()).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn delete_expired_removes_only_expired_records() {
        let store = MemorySessionStore::new();
        let live = store
            .create_session("state-live", Duration::minutes(60))
            .await
            .expect("create");
        store
            .create_session("state-dead", Duration::seconds(-1))
            .await
            .expect("create");

        let removed = store.delete_expired().await.expect("cleanup");
        assert_eq!(removed, 1);
        assert!(store.get_session(live.id()).await.expect("get").is_some());
    }
}
