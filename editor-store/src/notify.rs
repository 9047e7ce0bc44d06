//! Transient user notifications (toasts).

use std::sync::Mutex;

use serde::Serialize;

pub const DEFAULT_DURATION_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub variant: NotificationVariant,
    pub duration_ms: u64,
}

/// A message waiting to be surfaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub variant: NotificationVariant,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            variant: NotificationVariant::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            variant: NotificationVariant::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            variant: NotificationVariant::Info,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct NotificationCenter {
    active: Mutex<Vec<Notification>>,
    duration_ms: u64,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION_MS)
    }
}

impl NotificationCenter {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            active: Mutex::new(Vec::new()),
            duration_ms,
        }
    }

    /// Surface `notice` and return its id.
    pub fn notify(&self, notice: Notice) -> String {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            message: notice.message,
            variant: notice.variant,
            duration_ms: self.duration_ms,
        };
        let id = notification.id.clone();
        self.active
            .lock()
            .expect("NotificationCenter lock poisoned")
            .push(notification);
        id
    }

    pub fn dismiss(&self, id: &str) {
        self.active
            .lock()
            .expect("NotificationCenter lock poisoned")
            .retain(|n| n.id != id);
    }

    /// Notifications currently on screen, oldest first.
    pub fn active(&self) -> Vec<Notification> {
        self.active
            .lock()
            .expect("NotificationCenter lock poisoned")
            .clone()
    }

    /// Remove and return everything on screen.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.active.lock().expect("NotificationCenter lock poisoned"))
    }
}
