use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;

use crate::db::models::Session;
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Corrupt session timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Persistence for login sessions. Expiry is judged by the caller.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), SessionStoreError>;

    /// Point lookup through the unique token index. Returns expired rows too.
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, SessionStoreError>;

    async fn delete_by_id(&self, id: &str) -> Result<bool, SessionStoreError>;

    async fn delete_by_token(&self, token: &str) -> Result<bool, SessionStoreError>;

    /// Removes every session of the user in a single statement.
    async fn delete_for_user(&self, user_id: &str) -> Result<u64, SessionStoreError>;

    /// Purge sessions expired at `now` (returns count deleted)
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionStoreError>;
}

pub struct SqliteSessionStore {
    pool: DbPool,
}

impl SqliteSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Fixed-width UTC timestamps so text comparison in SQL matches time order.
fn encode_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), SessionStoreError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO sessions (id, user_id, token, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.user_id,
                session.token,
                encode_time(session.created_at),
                encode_time(session.expires_at),
            ],
        )?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, SessionStoreError> {
        let conn = self.pool.get()?;

        let row: Option<(String, String, String, String, String)> = conn
            .query_row(
                "SELECT id, user_id, token, created_at, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        match row {
            Some((id, user_id, token, created_at, expires_at)) => Ok(Some(Session {
                id,
                user_id,
                token,
                created_at: decode_time(&created_at)?,
                expires_at: decode_time(&expires_at)?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, SessionStoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool, SessionStoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64, SessionStoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        Ok(rows as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionStoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![encode_time(now)],
        )?;
        Ok(rows as u64)
    }
}

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Periodically deletes expired sessions. Lookups check expiry on their own;
/// this only reclaims rows. Returns None when `interval_minutes` is 0.
pub fn spawn_reaper(
    store: Arc<dyn SessionStore>,
    interval_minutes: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_minutes == 0 {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_minutes * 60));
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Purged {} expired sessions", n),
                Err(e) => tracing::warn!("Session purge failed: {}", e),
            }
        }
    }))
}
