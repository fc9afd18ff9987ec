// notification.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::models::{Notification, UserId};

pub type NotifyError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: UserId, message: &str) -> Result<(), NotifyError>;
}

/// Persists notifications so a client can list them later.
#[derive(Clone)]
pub struct StoreNotifier {
    store: Store,
}

impl StoreNotifier {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Newest first.
    pub async fn list(&self, user_id: UserId) -> CoreResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, message, read, created_at
            FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.store.pool())
        .await?;

        Ok(notifications)
    }

    pub async fn mark_read(&self, user_id: UserId, notification_id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
            .bind(notification_id)
            .bind(user_id)
            .execute(self.store.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn send(&self, user_id: UserId, message: &str) -> Result<(), NotifyError> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, message, read, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(message)
        .bind(Utc::now())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }
}

/// Best-effort dispatcher. Every send runs on its own task; the caller never
/// waits for it and never sees its failure.
#[derive(Clone, Default)]
pub struct Notifications {
    notifier: Option<Arc<dyn Notifier>>,
}

impl Notifications {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn poll_created(&self, user_id: UserId, poll_name: &str) {
        self.dispatch(user_id, format!("You created the poll \"{poll_name}\""));
    }

    pub fn poll_joined(&self, user_id: UserId, poll_name: &str) {
        self.dispatch(user_id, format!("You joined the poll \"{poll_name}\""));
    }

    pub fn member_joined(&self, owner_id: UserId, poll_name: &str) {
        self.dispatch(owner_id, format!("A new member joined your poll \"{poll_name}\""));
    }

    pub fn voted(&self, user_id: UserId, restaurant_name: &str) {
        self.dispatch(user_id, format!("You voted for \"{restaurant_name}\""));
    }

    pub fn match_invited(&self, invitee_id: UserId) {
        self.dispatch(invitee_id, "You have been invited to a head-to-head match".to_string());
    }

    pub fn match_accepted(&self, inviter_id: UserId) {
        self.dispatch(inviter_id, "Your head-to-head match was accepted".to_string());
    }

    fn dispatch(&self, user_id: UserId, message: String) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%user_id, "no runtime available, dropping notification");
            return;
        };

        runtime.spawn(async move {
            match notifier.send(user_id, &message).await {
                Ok(()) => debug!(%user_id, "notification sent"),
                Err(e) => warn!(%user_id, error = %e, "failed to send notification"),
            }
        });
    }
}
