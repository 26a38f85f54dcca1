//! Process-wide notification store.
//!
//! Holds the session's notification list and the derived unseen counter. The
//! state is persisted to a [`CacheBackend`] after every mutation and restored
//! with [`NotificationStore::hydrate`] at start-up.

use serde::{Deserialize, Serialize};
use serde_json::json;
use slog::{debug, info, warn, Logger};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::cache::{self, CacheBackend};
use crate::errors::ServiceError;
use crate::models::notification::SEEN;
use crate::models::Notification;
use crate::store::{doctypes, DocumentStore};

/// How `mark_seen_notification` adjusts the unseen counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenDecrementPolicy {
    /// Decrement only when the local copy was unseen
    #[default]
    OnlyIfUnseen,
    /// Decrement on every successful mark, even for already-seen entries
    Unconditional,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct NotificationState {
    notifications: Vec<Notification>,
    #[serde(rename = "notificationsCount")]
    count: usize,
}

impl NotificationState {
    fn recount(&mut self) {
        self.count = self.notifications.iter().filter(|n| n.is_unseen()).count();
    }
}

pub struct NotificationStore {
    state: Mutex<NotificationState>,
    cache: Arc<dyn CacheBackend>,
    cache_key: String,
    policy: SeenDecrementPolicy,
    logger: Logger,
}

impl NotificationStore {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        session_id: &str,
        policy: SeenDecrementPolicy,
        logger: Logger,
    ) -> Self {
        Self {
            state: Mutex::new(NotificationState::default()),
            cache,
            cache_key: cache::notifications_key(session_id),
            policy,
            logger,
        }
    }

    pub fn policy(&self) -> SeenDecrementPolicy {
        self.policy
    }

    /// Restores the persisted list. The counter is recomputed from the list.
    pub async fn hydrate(&self) -> Result<usize, ServiceError> {
        let persisted: Option<NotificationState> =
            cache::get_json(self.cache.as_ref(), &self.cache_key).await?;
        let mut state = self.state.lock().await;
        *state = persisted.unwrap_or_default();
        state.recount();
        info!(self.logger, "Notifications hydrated";
            "count" => state.notifications.len(), "unseen" => state.count);
        Ok(state.notifications.len())
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }

    pub async fn notifications_count(&self) -> usize {
        self.state.lock().await.count
    }

    /// Inserts at the head unless an entry with the same name exists.
    /// Returns whether the notification was inserted.
    pub async fn add_new_notification(&self, notification: Notification) -> bool {
        let mut state = self.state.lock().await;
        if state
            .notifications
            .iter()
            .any(|existing| existing.name == notification.name)
        {
            debug!(self.logger, "Duplicate notification ignored"; "name" => &notification.name);
            return false;
        }
        if notification.is_unseen() {
            state.count += 1;
        }
        debug!(self.logger, "Notification added"; "name" => &notification.name);
        state.notifications.insert(0, notification);
        self.persist(&state).await;
        true
    }

    /// Replaces the whole list; used for initial load from the server.
    pub async fn add_all_notific_directly(&self, notifications: Vec<Notification>) {
        let mut state = self.state.lock().await;
        state.notifications = notifications;
        state.recount();
        info!(self.logger, "Notifications replaced";
            "count" => state.notifications.len(), "unseen" => state.count);
        self.persist(&state).await;
    }

    /// Persists `seen = "true"` remotely, then updates the local copy.
    ///
    /// A failed remote update is logged and returned; local state is untouched.
    #[instrument(skip(self, store, notification), fields(name = %notification.name))]
    pub async fn mark_seen_notification(
        &self,
        store: &dyn DocumentStore,
        notification: &Notification,
    ) -> Result<(), ServiceError> {
        if let Err(err) = store
            .update(doctypes::NOTIFICATIONS, &notification.name, json!({ "seen": SEEN }))
            .await
        {
            warn!(self.logger, "Failed to mark notification as seen";
                "name" => &notification.name, "error" => %err);
            return Err(err);
        }

        let mut state = self.state.lock().await;
        let was_unseen = match state
            .notifications
            .iter_mut()
            .find(|n| n.name == notification.name)
        {
            Some(local) => {
                let was_unseen = local.is_unseen();
                local.seen = SEEN.to_string();
                was_unseen
            }
            None => false,
        };
        let decrement = match self.policy {
            SeenDecrementPolicy::OnlyIfUnseen => was_unseen,
            SeenDecrementPolicy::Unconditional => true,
        };
        if decrement {
            state.count = state.count.saturating_sub(1);
        }
        self.persist(&state).await;
        Ok(())
    }

    /// Removes the entry named `id`. Returns whether anything was removed.
    pub async fn delete_notification(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(index) = state.notifications.iter().position(|n| n.name == id) else {
            return false;
        };
        let removed = state.notifications.remove(index);
        if removed.is_unseen() {
            state.count = state.count.saturating_sub(1);
        }
        self.persist(&state).await;
        true
    }

    pub async fn clear_notifications(&self) {
        let mut state = self.state.lock().await;
        *state = NotificationState::default();
        self.persist(&state).await;
    }

    async fn persist(&self, state: &NotificationState) {
        if let Err(err) = cache::set_json(self.cache.as_ref(), &self.cache_key, state).await {
            warn!(self.logger, "Failed to persist notifications"; "error" => %err);
        }
    }
}
