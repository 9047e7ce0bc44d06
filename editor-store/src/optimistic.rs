//! Optimistic mutation combinators.
//!
//! Two ways to sequence a local change against a remote mutation:
//!
//! - [`optimistic_toggle`]: apply locally, call remote, revert on failure.
//!   `apply` returns an undo token captured before anything changed, and
//!   `revert` consumes it, so the rollback never depends on server data.
//! - [`confirm_then_apply`]: call remote first, apply locally only on
//!   success. Used where a false-positive local change is worse than a delay
//!   (deletes) or where the server assigns identity (inserts).
//!
//! Both surface exactly one notification when the mutation settles.

use std::future::Future;

use shared_types::User;
use tracing::warn;

use crate::auth::IdentityService;
use crate::notify::{Notice, NotificationCenter};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote mutation failed: {0}")]
    Remote(#[from] StoreError),
}

/// Notifications for the two ways a mutation can settle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub on_success: Notice,
    pub on_failure: Notice,
}

impl Feedback {
    pub fn new(on_success: Notice, on_failure: Notice) -> Self {
        Self {
            on_success,
            on_failure,
        }
    }
}

/// Check for a signed-in identity at the time of the action.
///
/// Without one, `notice` is surfaced and nothing else happens. Identity
/// lookup failures count as signed out.
pub async fn require_user(
    identity: &dyn IdentityService,
    notifications: &NotificationCenter,
    notice: Notice,
) -> Result<User, MutationError> {
    let user = match identity.current_user().await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "Identity lookup failed; treating as signed out");
            None
        }
    };

    user.ok_or_else(|| {
        notifications.notify(notice);
        MutationError::Unauthenticated
    })
}

pub async fn optimistic_toggle<U, T, Fut>(
    notifications: &NotificationCenter,
    feedback: Feedback,
    apply: impl FnOnce() -> U,
    remote: Fut,
    revert: impl FnOnce(U),
) -> Result<T, MutationError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    let undo = apply();

    match remote.await {
        Ok(value) => {
            notifications.notify(feedback.on_success);
            Ok(value)
        }
        Err(e) => {
            warn!(error = %e, "Remote mutation rejected; reverting local change");
            revert(undo);
            notifications.notify(feedback.on_failure);
            Err(MutationError::Remote(e))
        }
    }
}

pub async fn confirm_then_apply<T, R, Fut>(
    notifications: &NotificationCenter,
    feedback: Feedback,
    remote: Fut,
    apply: impl FnOnce(T) -> R,
) -> Result<R, MutationError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    match remote.await {
        Ok(value) => {
            let applied = apply(value);
            notifications.notify(feedback.on_success);
            Ok(applied)
        }
        Err(e) => {
            warn!(error = %e, "Remote mutation failed; local state unchanged");
            notifications.notify(feedback.on_failure);
            Err(MutationError::Remote(e))
        }
    }
}
