//! Snippet feed: the shared-snippet list with stars, deletes and sharing.
//!
//! Star toggles are optimistic; deletes and shares wait for the data store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use shared_types::{Language, NewSnippet, Snippet, Star, User};
use tracing::{debug, error, warn};

use crate::auth::{author_name, IdentityService};
use crate::notify::{Notice, NotificationCenter};
use crate::optimistic::{
    confirm_then_apply, optimistic_toggle, require_user, Feedback, MutationError,
};
use crate::store::DataStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    /// Newest first
    pub snippets: Vec<Snippet>,
    pub starred: HashSet<i64>,
    pub current_user: Option<User>,
    /// Load failure shown in place of the feed
    pub error: Option<String>,
    pub loaded: bool,
}

/// Everything needed to put one snippet's star state back exactly
struct StarUndo {
    snippet_id: i64,
    was_member: bool,
    prior_count: Option<i64>,
}

pub struct SnippetFeed {
    state: Mutex<FeedState>,
    store: Arc<dyn DataStore>,
    identity: Arc<dyn IdentityService>,
    notifications: Arc<NotificationCenter>,
}

impl SnippetFeed {
    pub fn new(
        store: Arc<dyn DataStore>,
        identity: Arc<dyn IdentityService>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            state: Mutex::new(FeedState::default()),
            store,
            identity,
            notifications,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().expect("SnippetFeed lock poisoned")
    }

    /// Fetch snippets and, when signed in, the caller's starred ids.
    pub async fn load(&self) {
        let user = match self.identity.current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Identity lookup failed while loading snippets");
                None
            }
        };

        let snippets = self.store.list_snippets().await;

        let starred = match user.as_ref() {
            Some(user) => match self.store.list_starred_ids(&user.id).await {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    error!(error = %e, user_id = %user.id, "Error fetching stars");
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };

        let mut state = self.lock();
        state.current_user = user;
        state.starred = starred;
        match snippets {
            Ok(snippets) => {
                debug!(count = snippets.len(), "Snippets loaded");
                state.snippets = snippets;
                state.error = None;
            }
            Err(e) => {
                error!(error = %e, "Error fetching snippets");
                state.error = Some(e.to_string());
            }
        }
        state.loaded = true;
    }

    pub fn snapshot(&self) -> FeedState {
        self.lock().clone()
    }

    pub fn is_starred(&self, snippet_id: i64) -> bool {
        self.lock().starred.contains(&snippet_id)
    }

    pub fn star_count(&self, snippet_id: i64) -> Option<i64> {
        self.lock()
            .snippets
            .iter()
            .find(|s| s.id == snippet_id)
            .map(|s| s.star_count)
    }

    /// Snippets whose title, language or author contains `query`
    /// (case-insensitive), optionally restricted to one language.
    pub fn filtered(&self, query: &str, language: Option<Language>) -> Vec<Snippet> {
        let query = query.to_lowercase();
        self.lock()
            .snippets
            .iter()
            .filter(|s| {
                let matches_search = s.title.to_lowercase().contains(&query)
                    || s.language.as_str().contains(&query)
                    || s.name.to_lowercase().contains(&query);
                matches_search && language.map_or(true, |l| s.language == l)
            })
            .cloned()
            .collect()
    }

    /// Distinct languages in feed order.
    pub fn languages(&self) -> Vec<Language> {
        let mut seen = HashSet::new();
        self.lock()
            .snippets
            .iter()
            .map(|s| s.language)
            .filter(|l| seen.insert(*l))
            .collect()
    }

    /// Fetch one snippet for its detail page.
    pub async fn get(&self, snippet_id: i64) -> Result<Snippet, MutationError> {
        Ok(self.store.get_snippet(snippet_id).await?)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Star or unstar `snippet_id`. The membership and counter change before
    /// the data store answers and are restored if it refuses.
    pub async fn toggle_star(
        &self,
        snippet_id: i64,
        currently_starred: bool,
    ) -> Result<(), MutationError> {
        let user = require_user(
            self.identity.as_ref(),
            &self.notifications,
            Notice::error("Sign in to star snippets"),
        )
        .await?;

        let star = Star {
            snippet_id,
            user_id: user.id,
        };
        let feedback = if currently_starred {
            Feedback::new(
                Notice::info("Snippet unstarred"),
                Notice::error("Failed to update star"),
            )
        } else {
            Feedback::new(
                Notice::success("Snippet starred!"),
                Notice::error("Failed to update star"),
            )
        };

        let store = self.store.clone();
        let remote = async move {
            if currently_starred {
                store.delete_star(&star).await
            } else {
                store.insert_star(star).await
            }
        };

        optimistic_toggle(
            &self.notifications,
            feedback,
            || self.apply_star(snippet_id, currently_starred),
            remote,
            |undo| self.revert_star(undo),
        )
        .await
    }

    fn apply_star(&self, snippet_id: i64, currently_starred: bool) -> StarUndo {
        let mut state = self.lock();
        let was_member = state.starred.contains(&snippet_id);
        let snippet = state.snippets.iter_mut().find(|s| s.id == snippet_id);
        let prior_count = snippet.as_ref().map(|s| s.star_count);

        if let Some(snippet) = snippet {
            let delta = if currently_starred { -1 } else { 1 };
            snippet.star_count = (snippet.star_count + delta).max(0);
        }
        if currently_starred {
            state.starred.remove(&snippet_id);
        } else {
            state.starred.insert(snippet_id);
        }

        StarUndo {
            snippet_id,
            was_member,
            prior_count,
        }
    }

    fn revert_star(&self, undo: StarUndo) {
        let mut state = self.lock();
        if undo.was_member {
            state.starred.insert(undo.snippet_id);
        } else {
            state.starred.remove(&undo.snippet_id);
        }
        if let Some(prior) = undo.prior_count {
            if let Some(snippet) = state.snippets.iter_mut().find(|s| s.id == undo.snippet_id) {
                snippet.star_count = prior;
            }
        }
    }

    /// Delete one of the caller's snippets. Removed locally only once the
    /// data store confirms.
    pub async fn delete_snippet(&self, snippet_id: i64) -> Result<(), MutationError> {
        // Signed-out callers never see a delete control; nothing to announce.
        let user = match self.identity.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(MutationError::Unauthenticated),
            Err(e) => {
                warn!(error = %e, "Identity lookup failed; treating as signed out");
                return Err(MutationError::Unauthenticated);
            }
        };

        confirm_then_apply(
            &self.notifications,
            Feedback::new(
                Notice::success("Snippet deleted successfully"),
                Notice::error("Failed to delete snippet"),
            ),
            self.store.delete_snippet(snippet_id, &user.id),
            |()| {
                let mut state = self.lock();
                state.snippets.retain(|s| s.id != snippet_id);
                state.starred.remove(&snippet_id);
            },
        )
        .await
    }

    /// Save `code` as a new snippet titled `title` and put it at the top of
    /// the feed.
    pub async fn share(
        &self,
        title: &str,
        language: Language,
        code: &str,
    ) -> Result<Snippet, MutationError> {
        let user = require_user(
            self.identity.as_ref(),
            &self.notifications,
            Notice::error("Sign in to share snippets"),
        )
        .await?;

        let title = title.trim().to_string();
        if title.is_empty() {
            self.notifications
                .notify(Notice::error("Snippet title is required"));
            return Err(MutationError::InvalidInput(
                "Snippet title is required".to_string(),
            ));
        }

        let snippet = NewSnippet {
            user_id: user.id.clone(),
            title: title.clone(),
            language,
            code: code.to_string(),
            name: author_name(&user),
        };

        confirm_then_apply(
            &self.notifications,
            Feedback::new(
                Notice::success(format!("Snippet {title} was saved")),
                Notice::error("Could not save snippet"),
            ),
            self.store.insert_snippet(snippet),
            |saved| {
                self.lock().snippets.insert(0, saved.clone());
                saved
            },
        )
        .await
    }
}
