//! Data store seam: the table operations the coordinators consume.
//!
//! Owner-scoped deletes report [`StoreError::NotFound`] when no row matched,
//! so a delete of someone else's row is a failure rather than a silent no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{
    Comment, ExecutionRecord, Language, NewComment, NewExecutionRecord, NewSnippet, Snippet, Star,
    UserRecord,
};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Row not found")]
    NotFound,

    #[error("Rejected by data store: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Rejected(db.message().to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    // Executions (append-only)

    async fn insert_execution(
        &self,
        record: NewExecutionRecord,
    ) -> Result<ExecutionRecord, StoreError>;

    /// Newest first
    async fn list_executions(&self, user_id: &str) -> Result<Vec<ExecutionRecord>, StoreError>;

    async fn count_executions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError>;

    // Snippets

    async fn insert_snippet(&self, snippet: NewSnippet) -> Result<Snippet, StoreError>;

    async fn get_snippet(&self, id: i64) -> Result<Snippet, StoreError>;

    /// Newest first
    async fn list_snippets(&self) -> Result<Vec<Snippet>, StoreError>;

    /// Newest first; unknown ids are skipped
    async fn list_snippets_by_ids(&self, ids: &[i64]) -> Result<Vec<Snippet>, StoreError>;

    /// Language of every snippet the user owns, oldest first
    async fn list_snippet_languages(&self, user_id: &str) -> Result<Vec<Language>, StoreError>;

    async fn delete_snippet(&self, id: i64, user_id: &str) -> Result<(), StoreError>;

    // Stars

    async fn insert_star(&self, star: Star) -> Result<(), StoreError>;

    async fn delete_star(&self, star: &Star) -> Result<(), StoreError>;

    async fn list_starred_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError>;

    async fn count_stars(&self, user_id: &str) -> Result<i64, StoreError>;

    // Comments

    /// Oldest first
    async fn list_comments(&self, snippet_id: i64) -> Result<Vec<Comment>, StoreError>;

    /// Returns the row with its server-assigned id and timestamp
    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError>;

    async fn delete_comment(&self, id: i64, user_id: &str) -> Result<(), StoreError>;

    // Identity mirror

    /// Insert or update on `user_id` conflict
    async fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError>;

    /// Case-insensitive email lookup
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
}
