//! Conversation history, SQLite-backed.
//!
//! Turns are append-only per session; prompt assembly only ever reads
//! the suffix window, so `recent` does the windowing in SQL. Roles are
//! validated against the closed enum on the way out — rows with an
//! unknown role are dropped rather than passed through.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTurn {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn open(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id)")
            .execute(&pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(Self { pool })
    }

    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<i64, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO turns (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    /// Last `limit` turns in insertion order.
    pub async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT role, content FROM \
             (SELECT id, role, content FROM turns WHERE session_id = ? ORDER BY id DESC LIMIT ?) \
             ORDER BY id ASC",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let messages = rows
            .iter()
            .filter_map(|row| {
                let role = Role::parse(&row.get::<String, _>("role"))?;
                Some(ChatMessage {
                    role,
                    content: row.get("content"),
                })
            })
            .collect();

        Ok(messages)
    }

    /// Full transcript of one session, oldest first.
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<StoredTurn>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM turns \
             WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let turns = rows
            .iter()
            .filter_map(|row| {
                let role = Role::parse(&row.get::<String, _>("role"))?;
                Some(StoredTurn {
                    id: row.get("id"),
                    session_id: row.get("session_id"),
                    role,
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                })
            })
            .collect();

        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn recent_returns_suffix_in_order() {
        let (_dir, store) = open_temp().await;
        for i in 0..8 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store
                .append("s1", role, &format!("turn {}", i))
                .await
                .unwrap();
        }

        let recent = store.recent("s1", 6).await.unwrap();
        assert_eq!(recent.len(), 6);
        assert_eq!(recent[0].content, "turn 2");
        assert_eq!(recent[5].content, "turn 7");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let (_dir, store) = open_temp().await;
        store.append("a", Role::User, "for a").await.unwrap();
        store.append("b", Role::User, "for b").await.unwrap();

        let recent = store.recent("a", 6).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "for a");
    }

    #[tokio::test]
    async fn unknown_roles_are_dropped_on_read() {
        let (_dir, store) = open_temp().await;
        store.append("s", Role::User, "ok").await.unwrap();
        sqlx::query("INSERT INTO turns (session_id, role, content) VALUES ('s', 'tool', 'bad')")
            .execute(&store.pool)
            .await
            .unwrap();

        let recent = store.recent("s", 6).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "ok");
    }
}
