//! Discussion thread under a single snippet.

use std::sync::{Arc, Mutex, MutexGuard};

use shared_types::{Comment, NewComment, User};
use tracing::{debug, error, warn};

use crate::auth::{author_name, IdentityService};
use crate::notify::{Notice, NotificationCenter};
use crate::optimistic::{confirm_then_apply, require_user, Feedback, MutationError};
use crate::store::DataStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadState {
    /// Oldest first
    pub comments: Vec<Comment>,
    pub current_user: Option<User>,
    pub is_submitting: bool,
    pub deleting_comment_id: Option<i64>,
}

/// Resets a busy flag on every exit path
struct BusyGuard<'a> {
    state: &'a Mutex<ThreadState>,
    reset: fn(&mut ThreadState),
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        (self.reset)(&mut state);
    }
}

pub struct CommentThread {
    snippet_id: i64,
    state: Mutex<ThreadState>,
    store: Arc<dyn DataStore>,
    identity: Arc<dyn IdentityService>,
    notifications: Arc<NotificationCenter>,
}

impl CommentThread {
    pub fn new(
        snippet_id: i64,
        store: Arc<dyn DataStore>,
        identity: Arc<dyn IdentityService>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            snippet_id,
            state: Mutex::new(ThreadState::default()),
            store,
            identity,
            notifications,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock().expect("CommentThread lock poisoned")
    }

    pub fn snippet_id(&self) -> i64 {
        self.snippet_id
    }

    pub async fn load(&self) {
        let user = match self.identity.current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Identity lookup failed while loading comments");
                None
            }
        };
        let comments = self.store.list_comments(self.snippet_id).await;

        let mut state = self.lock();
        state.current_user = user;
        match comments {
            Ok(comments) => {
                debug!(snippet_id = self.snippet_id, count = comments.len(), "Comments loaded");
                state.comments = comments;
            }
            Err(e) => error!(error = %e, snippet_id = self.snippet_id, "Error fetching comments"),
        }
    }

    pub fn snapshot(&self) -> ThreadState {
        self.lock().clone()
    }

    pub fn comment_count(&self) -> usize {
        self.lock().comments.len()
    }

    /// Post `content` as the signed-in user. The row is appended only after
    /// the data store returns it with its id and timestamp.
    pub async fn submit(&self, content: &str) -> Result<Comment, MutationError> {
        let user = require_user(
            self.identity.as_ref(),
            &self.notifications,
            Notice::error("User needs to signin to post comments."),
        )
        .await?;

        let content = content.trim();
        if content.is_empty() {
            self.notifications
                .notify(Notice::error("Comment cannot be empty."));
            return Err(MutationError::InvalidInput(
                "Comment cannot be empty.".to_string(),
            ));
        }

        self.lock().is_submitting = true;
        let _busy = BusyGuard {
            state: &self.state,
            reset: |state| state.is_submitting = false,
        };

        let comment = NewComment {
            snippet_id: self.snippet_id,
            user_id: user.id.clone(),
            name: author_name(&user),
            content: content.to_string(),
        };

        confirm_then_apply(
            &self.notifications,
            Feedback::new(
                Notice::success("Comment posted successfully!"),
                Notice::error("Failed to post comment. Please try again."),
            ),
            self.store.insert_comment(comment),
            |saved| {
                self.lock().comments.push(saved.clone());
                saved
            },
        )
        .await
    }

    /// Delete one of the caller's comments once the data store confirms.
    pub async fn delete(&self, comment_id: i64) -> Result<(), MutationError> {
        let user = require_user(
            self.identity.as_ref(),
            &self.notifications,
            Notice::error("You must be signed in to delete comments."),
        )
        .await?;

        self.lock().deleting_comment_id = Some(comment_id);
        let _busy = BusyGuard {
            state: &self.state,
            reset: |state| state.deleting_comment_id = None,
        };

        confirm_then_apply(
            &self.notifications,
            Feedback::new(
                Notice::success("Comment deleted successfully."),
                Notice::error("Failed to delete comment."),
            ),
            self.store.delete_comment(comment_id, &user.id),
            |()| self.lock().comments.retain(|c| c.id != comment_id),
        )
        .await
    }
}
