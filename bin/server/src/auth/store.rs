//! Postgres-backed session store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use waypoint_platform_access::{
    SessionId, SessionRecord, SessionStore, StoreError, TokenSet, UserProfile,
};

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    state: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    user_id: Option<String>,
    user_profile: Option<serde_json::Value>,
    tokens: serde_json::Value,
}

impl SessionRow {
    fn try_into_record(self) -> Result<SessionRecord, StoreError> {
        let user: Option<UserProfile> = match self.user_profile {
            Some(value) => Some(serde_json::from_value(value).map_err(|e| {
                StoreError::Unavailable {
                    details: format!("corrupt profile for session '{}': {e}", self.id),
                }
            })?),
            None => None,
        };
        let tokens: HashMap<String, TokenSet> =
            serde_json::from_value(self.tokens).unwrap_or_default();

        Ok(SessionRecord::with_all_fields(
            SessionId::new(self.id),
            self.state,
            self.created_at,
            self.expires_at,
            self.user_id,
            user,
            tokens,
        ))
    }
}

fn storage(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        details: error.to_string(),
    }
}

/// Session store backed by PostgreSQL.
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new store on the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(
        &self,
        state: &str,
        ttl: Duration,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(SessionId::generate(), state.to_string(), ttl);
        let tokens = serde_json::to_value(record.tokens()).expect("serialize tokens");

        sqlx::query(
            r#"
            INSERT INTO sessions (id, state, created_at, expires_at, user_id, user_profile, tokens)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id().as_str())
        .bind(record.state())
        .bind(record.created_at())
        .bind(record.expires_at())
        .bind(record.user_id())
        .bind(Option::<serde_json::Value>::None)
        .bind(tokens)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(record)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, state, created_at, expires_at, user_id, user_profile, tokens
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => {
                let record = row.try_into_record()?;
                // An expired record is indistinguishable from an absent one.
                if record.is_expired() {
                    Ok(None)
                } else {
                    Ok(Some(record))
                }
            }
            None => Ok(None),
        }
    }

    async fn update_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let user = record
            .user()
            .map(|profile| serde_json::to_value(profile).expect("serialize profile"));
        let tokens = serde_json::to_value(record.tokens()).expect("serialize tokens");

        sqlx::query(
            r#"
            UPDATE sessions
            SET state = $2, created_at = $3, expires_at = $4,
                user_id = $5, user_profile = $6, tokens = $7
            WHERE id = $1
            "#,
        )
        .bind(record.id().as_str())
        .bind(record.state())
        .bind(record.created_at())
        .bind(record.expires_at())
        .bind(record.user_id())
        .bind(user)
        .bind(tokens)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected())
    }
}
