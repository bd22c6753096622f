use anyhow::{Context, Result};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::SessionId;

/// Fixed names under which the client persists its local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    SessionUuid,
    Messages,
    MessagesWatermark,
    MessagesHasMore,
    PendingMessages,
    Participants,
    ParticipantsWatermark,
}

impl StateKey {
    pub const ALL: [StateKey; 7] = [
        StateKey::SessionUuid,
        StateKey::Messages,
        StateKey::MessagesWatermark,
        StateKey::MessagesHasMore,
        StateKey::PendingMessages,
        StateKey::Participants,
        StateKey::ParticipantsWatermark,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StateKey::SessionUuid => "session-uuid",
            StateKey::Messages => "messages",
            StateKey::MessagesWatermark => "messages-watermark",
            StateKey::MessagesHasMore => "messages-has-more",
            StateKey::PendingMessages => "pending-messages",
            StateKey::Participants => "participants",
            StateKey::ParticipantsWatermark => "participants-watermark",
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, key: StateKey, value: &T) -> Result<()> {
        let encoded = serde_json::to_string(value)
            .with_context(|| format!("failed to encode local state '{}'", key.as_str()))?;
        sqlx::query(
            "INSERT INTO local_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        )
        .bind(key.as_str())
        .bind(encoded)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write local state '{}'", key.as_str()))?;
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: StateKey) -> Result<Option<T>> {
        let row = sqlx::query("SELECT value FROM local_state WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read local state '{}'", key.as_str()))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raw = row.get::<String, _>(0);
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt local state '{}'", key.as_str()))?;
        Ok(Some(value))
    }

    pub async fn remove(&self, keys: &[StateKey]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM local_state WHERE key = ?")
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_session_id(&self) -> Result<Option<SessionId>> {
        self.get_json(StateKey::SessionUuid).await
    }

    pub async fn save_session_id(&self, session_id: &SessionId) -> Result<()> {
        self.put_json(StateKey::SessionUuid, session_id).await
    }

    /// Drops every cached chat record but keeps the session id.
    pub async fn clear_chat_state(&self) -> Result<()> {
        let keys: Vec<StateKey> = StateKey::ALL
            .into_iter()
            .filter(|key| *key != StateKey::SessionUuid)
            .collect();
        self.remove(&keys)
            .await
            .context("failed to clear cached chat state")
    }

    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_state")
            .execute(&self.pool)
            .await
            .context("failed to clear local state")?;
        Ok(())
    }
}

pub fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
