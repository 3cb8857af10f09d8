use chrono::{SubsecRound, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::CreateNotificationRequest;
use crate::error::{AppError, Result};
use crate::models::{Notification, LIST_LIMIT};
use crate::store::NotificationStore;

/// Front door to the notification store: validates input, stamps new records
/// and bounds every storage call with a timeout.
#[derive(Clone)]
pub struct NotificationManager {
    pub store: Arc<dyn NotificationStore>,
    timeout: Duration,
}

impl NotificationManager {
    pub fn new(store: Arc<dyn NotificationStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Storage call exceeded {:?}", self.timeout);
                Err(AppError::StorageTimeout(self.timeout.as_millis() as u64))
            }
        }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Notification>> {
        let user_id = require_user_id(user_id)?;
        self.bounded(self.store.list_recent(user_id, LIST_LIMIT)).await
    }

    pub async fn create(&self, request: CreateNotificationRequest) -> Result<Notification> {
        let user_id = request
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let message = request
            .message
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let (user_id, message) = match (user_id, message) {
            (Some(user_id), Some(message)) => (user_id.to_string(), message.to_string()),
            _ => return Err(AppError::Validation("userId and message are required".to_string())),
        };

        let notification = Notification::new(
            user_id,
            message,
            request.kind.unwrap_or_default(),
            request.related_entity,
            // Millisecond precision, matching what the store keeps.
            Utc::now().trunc_subsecs(3),
        );
        let created = self.bounded(self.store.insert(notification)).await?;
        tracing::info!("Created notification {} for user {}", created.id, created.user_id);
        Ok(created)
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        self.bounded(self.store.mark_read(id)).await
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let user_id = require_user_id(user_id)?;
        self.bounded(self.store.mark_all_read(user_id)).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.bounded(self.store.delete(id)).await?;
        tracing::info!("Deleted notification {}", id);
        Ok(())
    }

    pub async fn clear_all(&self, user_id: &str) -> Result<u64> {
        let user_id = require_user_id(user_id)?;
        let removed = self.bounded(self.store.clear_all(user_id)).await?;
        tracing::info!("Cleared {} notifications for user {}", removed, user_id);
        Ok(removed)
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<u64> {
        let user_id = require_user_id(user_id)?;
        self.bounded(self.store.unread_count(user_id)).await
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        self.bounded(self.store.purge_expired(Utc::now())).await
    }
}

fn require_user_id(user_id: &str) -> Result<&str> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }
    Ok(user_id)
}
