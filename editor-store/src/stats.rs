//! Usage statistics for the profile page. Read-only.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shared_types::{ExecutionRecord, Language, Snippet, User, UserStats};
use tracing::debug;

use crate::store::{DataStore, StoreError};

/// Count per language, in the order each language was first seen.
pub fn language_histogram(languages: impl IntoIterator<Item = Language>) -> Vec<(Language, usize)> {
    let mut histogram: Vec<(Language, usize)> = Vec::new();
    for language in languages {
        match histogram.iter_mut().find(|(l, _)| *l == language) {
            Some((_, count)) => *count += 1,
            None => histogram.push((language, 1)),
        }
    }
    histogram
}

/// Highest count; ties go to the language seen first.
pub fn most_common(histogram: &[(Language, usize)]) -> Option<Language> {
    let mut best: Option<(Language, usize)> = None;
    for &(language, count) in histogram {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((language, count));
        }
    }
    best.map(|(language, _)| language)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileData {
    pub stats: UserStats,
    /// Newest first
    pub executions: Vec<ExecutionRecord>,
    /// Newest first
    pub starred: Vec<Snippet>,
}

pub struct UsageAggregator {
    store: Arc<dyn DataStore>,
}

impl UsageAggregator {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub async fn user_stats(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserStats, StoreError> {
        let total_executions = self.store.count_executions(user_id, None).await?;
        let executions_24h = self
            .store
            .count_executions(user_id, Some(now - Duration::hours(24)))
            .await?;
        let starred_snippets = self.store.count_stars(user_id).await?;

        let own = language_histogram(self.store.list_snippet_languages(user_id).await?);
        let starred = language_histogram(
            self.starred_snippets(user_id)
                .await?
                .iter()
                .map(|s| s.language),
        );

        let stats = UserStats {
            total_executions,
            executions_24h,
            starred_snippets,
            most_starred_language: most_common(&starred),
            languages_used: own.len() as i64,
            most_used_language: most_common(&own),
        };
        debug!(user_id, total = stats.total_executions, "User stats computed");
        Ok(stats)
    }

    /// Snippets the user starred, newest first.
    pub async fn starred_snippets(&self, user_id: &str) -> Result<Vec<Snippet>, StoreError> {
        let ids = self.store.list_starred_ids(user_id).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.list_snippets_by_ids(&ids).await
    }

    pub async fn execution_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.store.list_executions(user_id).await
    }

    pub async fn profile(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<ProfileData, StoreError> {
        Ok(ProfileData {
            stats: self.user_stats(&user.id, now).await?,
            executions: self.execution_history(&user.id).await?,
            starred: self.starred_snippets(&user.id).await?,
        })
    }
}
