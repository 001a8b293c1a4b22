use std::path::PathBuf;

use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::chat_repository::{BoxFuture, ChatRepository, FEED_CAPACITY, MessageFeed};
use super::error::{RepositoryError, RepositoryResult};
use crate::models::{Chat, Message, NewMessage, Role, now_millis};

/// Migrations applied in order. Each entry is (version, sql).
/// To add a new migration: append a tuple with the next version number and
/// its SQL. Never edit or remove existing entries — existing databases
/// depend on them.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS chats (
        id         TEXT    PRIMARY KEY,
        user_id    TEXT    NOT NULL DEFAULT '',
        title      TEXT    NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_chats_updated_at
        ON chats (updated_at DESC);
    CREATE TABLE IF NOT EXISTS messages (
        id         TEXT    PRIMARY KEY,
        chat_id    TEXT    NOT NULL,
        role       TEXT    NOT NULL,
        text       TEXT    NOT NULL DEFAULT '',
        file_name  TEXT,
        file_type  TEXT,
        file_size  INTEGER,
        created_at INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_messages_chat_created
        ON messages (chat_id, created_at);",
)];

/// SQLite-backed chat repository.
///
/// Uses WAL journal mode for concurrent reads during writes. `SqlitePool`
/// is internally reference-counted and cheap to clone. Inserted messages
/// are additionally published on a broadcast channel, which stands in for
/// the hosted backend's row-insert push feed.
pub struct ChatSqliteRepository {
    pool: SqlitePool,
    events: broadcast::Sender<Message>,
}

impl ChatSqliteRepository {
    /// Open (or create) the database at the platform-specific config path.
    pub async fn new() -> RepositoryResult<Self> {
        let db_path = Self::db_path()?;

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!(path = %db_path.display(), "Opened SQLite chat database");

        Self::from_pool(pool)
    }

    /// Fresh in-memory database. A single connection, so every query sees
    /// the same memory store.
    pub async fn open_in_memory() -> RepositoryResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        Self::from_pool(pool)
    }

    fn from_pool(pool: SqlitePool) -> RepositoryResult<Self> {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        Ok(Self { pool, events })
    }

    /// Create the schema_version table if absent, then apply any pending
    /// migrations.
    async fn run_migrations(pool: &SqlitePool) -> RepositoryResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // Seed version 0 if the table is empty (fresh database).
        sqlx::query(
            "INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)",
        )
        .execute(pool)
        .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                // sqlx doesn't support multiple statements in a single query
                // call, so split on ';' and execute each one individually.
                for statement in sql.split(';') {
                    let trimmed = statement.trim();
                    if !trimmed.is_empty() {
                        sqlx::query(trimmed).execute(pool).await?;
                    }
                }
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(*version)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }

    fn db_path() -> RepositoryResult<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| RepositoryError::Initialization {
                message: "Cannot find config directory".into(),
            })
            .map(|p| p.join("insight-chat").join("chats.db"))
    }
}

impl Clone for ChatSqliteRepository {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            events: self.events.clone(),
        }
    }
}

fn chat_from_row(row: &SqliteRow) -> RepositoryResult<Chat> {
    Ok(Chat {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_from_row(row: &SqliteRow) -> RepositoryResult<Message> {
    let role_value: String = row.try_get("role")?;
    let role = Role::parse(&role_value).unwrap_or_else(|| {
        warn!(role = %role_value, "Unknown role in messages table, treating as user");
        Role::User
    });

    Ok(Message {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        role,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
        file_name: row.try_get("file_name")?,
        file_type: row.try_get("file_type")?,
        file_size: row.try_get("file_size")?,
    })
}

impl ChatRepository for ChatSqliteRepository {
    fn list_chats(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<Chat>>> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();

        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, title, created_at, updated_at FROM chats
                 WHERE user_id = ? ORDER BY updated_at DESC",
            )
            .bind(&user_id)
            .fetch_all(&pool)
            .await?;

            rows.iter().map(chat_from_row).collect()
        })
    }

    fn insert_chat(
        &self,
        user_id: &str,
        title: &str,
    ) -> BoxFuture<'static, RepositoryResult<Chat>> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        let title = title.to_string();

        Box::pin(async move {
            let now = now_millis();
            let chat = Chat {
                id: Uuid::new_v4().to_string(),
                title,
                created_at: now,
                updated_at: now,
            };

            sqlx::query(
                "INSERT INTO chats (id, user_id, title, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chat.id)
            .bind(&user_id)
            .bind(&chat.title)
            .bind(chat.created_at)
            .bind(chat.updated_at)
            .execute(&pool)
            .await?;

            Ok(chat)
        })
    }

    fn rename_chat(
        &self,
        chat_id: &str,
        title: &str,
    ) -> BoxFuture<'static, RepositoryResult<Chat>> {
        let pool = self.pool.clone();
        let chat_id = chat_id.to_string();
        let title = title.to_string();

        Box::pin(async move {
            let result = sqlx::query("UPDATE chats SET title = ? WHERE id = ?")
                .bind(&title)
                .bind(&chat_id)
                .execute(&pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::ChatNotFound { chat_id });
            }

            let row = sqlx::query("SELECT id, title, created_at, updated_at FROM chats WHERE id = ?")
                .bind(&chat_id)
                .fetch_one(&pool)
                .await?;

            chat_from_row(&row)
        })
    }

    fn delete_chat(&self, chat_id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        let chat_id = chat_id.to_string();

        Box::pin(async move {
            // Messages first, then the chat row, mirroring the cascade the
            // hosted backend performs.
            sqlx::query("DELETE FROM messages WHERE chat_id = ?")
                .bind(&chat_id)
                .execute(&pool)
                .await?;
            sqlx::query("DELETE FROM chats WHERE id = ?")
                .bind(&chat_id)
                .execute(&pool)
                .await?;

            Ok(())
        })
    }

    fn list_messages(&self, chat_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<Message>>> {
        let pool = self.pool.clone();
        let chat_id = chat_id.to_string();

        Box::pin(async move {
            // rowid breaks ties between messages inserted within the same
            // millisecond.
            let rows = sqlx::query(
                "SELECT id, chat_id, role, text, file_name, file_type, file_size, created_at
                 FROM messages WHERE chat_id = ? ORDER BY created_at ASC, rowid ASC",
            )
            .bind(&chat_id)
            .fetch_all(&pool)
            .await?;

            rows.iter().map(message_from_row).collect()
        })
    }

    fn insert_message(
        &self,
        message: NewMessage,
    ) -> BoxFuture<'static, RepositoryResult<Message>> {
        let pool = self.pool.clone();
        let events = self.events.clone();

        Box::pin(async move {
            let stored = Message {
                id: Uuid::new_v4().to_string(),
                chat_id: message.chat_id,
                role: message.role,
                text: message.text,
                created_at: now_millis(),
                file_name: message.file_name,
                file_type: message.file_type,
                file_size: message.file_size,
            };

            sqlx::query(
                "INSERT INTO messages (id, chat_id, role, text, file_name, file_type, file_size, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&stored.id)
            .bind(&stored.chat_id)
            .bind(stored.role.as_str())
            .bind(&stored.text)
            .bind(&stored.file_name)
            .bind(&stored.file_type)
            .bind(stored.file_size)
            .bind(stored.created_at)
            .execute(&pool)
            .await?;

            sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
                .bind(stored.created_at)
                .bind(&stored.chat_id)
                .execute(&pool)
                .await?;

            // No receivers is fine; the feed is optional.
            let _ = events.send(stored.clone());

            Ok(stored)
        })
    }

    fn subscribe_messages(&self, chat_id: &str) -> MessageFeed {
        MessageFeed::new(chat_id.to_string(), self.events.subscribe())
    }
}
