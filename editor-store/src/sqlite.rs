//! SQLite-backed [`DataStore`].
//!
//! Schema (created by [`SqliteDataStore::migrate`]); timestamps are Unix
//! milliseconds so ordering and range filters compare integers:
//! ```sql
//! users            (user_id PK, email, name)
//! snippets         (id PK, user_id, title, language, code, name, star_count, created_at)
//! stars            (snippet_id FK, user_id, created_at, PK (snippet_id, user_id))
//! snippet_comments (id PK, snippet_id FK, user_id, name, content, created_at)
//! code_executions  (id PK, user_id, language, code, output, error, created_at)
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{
    Comment, ExecutionRecord, Language, NewComment, NewExecutionRecord, NewSnippet, Snippet, Star,
    UserRecord,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::store::{DataStore, StoreError};

const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        email   TEXT,
        name    TEXT
    )",
    "CREATE TABLE IF NOT EXISTS snippets (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    TEXT    NOT NULL,
        title      TEXT    NOT NULL,
        language   TEXT    NOT NULL,
        code       TEXT    NOT NULL,
        name       TEXT    NOT NULL,
        star_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS stars (
        snippet_id INTEGER NOT NULL REFERENCES snippets(id) ON DELETE CASCADE,
        user_id    TEXT    NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (snippet_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS snippet_comments (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        snippet_id INTEGER NOT NULL REFERENCES snippets(id) ON DELETE CASCADE,
        user_id    TEXT    NOT NULL,
        name       TEXT    NOT NULL,
        content    TEXT    NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS code_executions (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    TEXT    NOT NULL,
        language   TEXT    NOT NULL,
        code       TEXT    NOT NULL,
        output     TEXT    NOT NULL,
        error      TEXT,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS code_executions_user ON code_executions (user_id, created_at)",
];

const SNIPPET_COLUMNS: &str = "id, user_id, title, language, code, name, star_count, created_at";

#[derive(Debug, Clone)]
pub struct SqliteDataStore {
    pool: SqlitePool,
}

impl SqliteDataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `sqlite:<path>` or `sqlite::memory:`.
    ///
    /// An in-memory database lives in its single connection, so the pool is
    /// pinned to one connection that never expires.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str(database_url)?)
                .await?
        } else {
            let file_path = PathBuf::from(
                database_url
                    .strip_prefix("sqlite:")
                    .unwrap_or(database_url),
            );
            if let Some(parent) = file_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StoreError::Database(e.to_string()))?;
                }
            }
            SqlitePool::connect_with(
                SqliteConnectOptions::new()
                    .filename(&file_path)
                    .create_if_missing(true),
            )
            .await?
        };

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Data store schema ready");
        Ok(())
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Serialization(format!("invalid timestamp: {millis}")))
}

fn language(raw: &str) -> Result<Language, StoreError> {
    raw.parse()
        .map_err(|e: shared_types::UnknownLanguage| StoreError::Serialization(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct SnippetRow {
    id: i64,
    user_id: String,
    title: String,
    language: String,
    code: String,
    name: String,
    star_count: i64,
    created_at: i64,
}

impl TryFrom<SnippetRow> for Snippet {
    type Error = StoreError;

    fn try_from(row: SnippetRow) -> Result<Self, Self::Error> {
        Ok(Snippet {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            language: language(&row.language)?,
            code: row.code,
            name: row.name,
            star_count: row.star_count,
            created_at: timestamp(row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: i64,
    user_id: String,
    language: String,
    code: String,
    output: String,
    error: Option<String>,
    created_at: i64,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(ExecutionRecord {
            id: row.id,
            user_id: row.user_id,
            language: language(&row.language)?,
            code: row.code,
            output: row.output,
            error: row.error,
            created_at: timestamp(row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    snippet_id: i64,
    user_id: String,
    name: String,
    content: String,
    created_at: i64,
}

impl TryFrom<CommentRow> for Comment {
    type Error = StoreError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        Ok(Comment {
            id: row.id,
            snippet_id: row.snippet_id,
            user_id: row.user_id,
            name: row.name,
            content: row.content,
            created_at: timestamp(row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: String,
    email: Option<String>,
    name: Option<String>,
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn require_affected(rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

// ============================================================================
// DataStore
// ============================================================================

#[async_trait]
impl DataStore for SqliteDataStore {
    async fn insert_execution(
        &self,
        record: NewExecutionRecord,
    ) -> Result<ExecutionRecord, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "INSERT INTO code_executions (user_id, language, code, output, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, user_id, language, code, output, error, created_at",
        )
        .bind(&record.user_id)
        .bind(record.language.as_str())
        .bind(&record.code)
        .bind(&record.output)
        .bind(&record.error)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_executions(&self, user_id: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT id, user_id, language, code, output, error, created_at
             FROM code_executions
             WHERE user_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn count_executions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError> {
        let since = since.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM code_executions WHERE user_id = ? AND created_at >= ?",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_snippet(&self, snippet: NewSnippet) -> Result<Snippet, StoreError> {
        let row = sqlx::query_as::<_, SnippetRow>(&format!(
            "INSERT INTO snippets (user_id, title, language, code, name, star_count, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)
             RETURNING {SNIPPET_COLUMNS}"
        ))
        .bind(&snippet.user_id)
        .bind(&snippet.title)
        .bind(snippet.language.as_str())
        .bind(&snippet.code)
        .bind(&snippet.name)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_snippet(&self, id: i64) -> Result<Snippet, StoreError> {
        let row = sqlx::query_as::<_, SnippetRow>(&format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_snippets(&self) -> Result<Vec<Snippet>, StoreError> {
        let rows = sqlx::query_as::<_, SnippetRow>(&format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_snippets_by_ids(&self, ids: &[i64]) -> Result<Vec<Snippet>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY created_at DESC, id DESC");

        let rows = query
            .build_query_as::<SnippetRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn list_snippet_languages(&self, user_id: &str) -> Result<Vec<Language>, StoreError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT language FROM snippets WHERE user_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|raw| language(raw)).collect()
    }

    async fn delete_snippet(&self, id: i64, user_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM snippets WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        require_affected(result.rows_affected())
    }

    async fn insert_star(&self, star: Star) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO stars (snippet_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(star.snippet_id)
            .bind(&star.user_id)
            .bind(now_millis())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE snippets SET star_count = star_count + 1 WHERE id = ?")
            .bind(star.snippet_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_star(&self, star: &Star) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM stars WHERE snippet_id = ? AND user_id = ?")
            .bind(star.snippet_id)
            .bind(&star.user_id)
            .execute(&mut *tx)
            .await?;
        require_affected(result.rows_affected())?;
        sqlx::query("UPDATE snippets SET star_count = MAX(star_count - 1, 0) WHERE id = ?")
            .bind(star.snippet_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_starred_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT snippet_id FROM stars WHERE user_id = ? ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn count_stars(&self, user_id: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stars WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_comments(&self, snippet_id: i64) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT id, snippet_id, user_id, name, content, created_at
             FROM snippet_comments
             WHERE snippet_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(snippet_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let row = sqlx::query_as::<_, CommentRow>(
            "INSERT INTO snippet_comments (snippet_id, user_id, name, content, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, snippet_id, user_id, name, content, created_at",
        )
        .bind(comment.snippet_id)
        .bind(&comment.user_id)
        .bind(&comment.name)
        .bind(&comment.content)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn delete_comment(&self, id: i64, user_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM snippet_comments WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        require_affected(result.rows_affected())
    }

    async fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (user_id, email, name) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET email = excluded.email, name = excluded.name",
        )
        .bind(&user.user_id)
        .bind(&user.email)
        .bind(&user.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, email, name FROM users WHERE lower(email) = lower(?) LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| UserRecord {
            user_id: row.user_id,
            email: row.email,
            name: row.name,
        }))
    }
}
