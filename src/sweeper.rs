use std::sync::Arc;
use std::time::Duration;

use crate::state::NotificationManager;

/// Periodically drops notifications past the retention window.
/// Reads already hide them, so a late or failed sweep only costs memory.
pub async fn run_expiry_sweeper(manager: Arc<NotificationManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!("Expiry sweeper started, interval {:?}", interval);
    loop {
        ticker.tick().await;
        match manager.purge_expired().await {
            Ok(0) => tracing::debug!("Expiry sweep found nothing to remove"),
            Ok(purged) => tracing::info!("Expiry sweep removed {} notifications", purged),
            Err(e) => tracing::error!("Expiry sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Notification, NotificationType};
    use crate::store::{MemoryStore, NotificationStore};
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test]
    async fn sweeper_removes_expired_records() {
        let store = Arc::new(MemoryStore::new());
        let stale = Notification::new(
            "u1".into(),
            "stale".into(),
            NotificationType::Info,
            None,
            Utc::now() - ChronoDuration::days(45),
        );
        let stale_id = stale.id;
        store.insert(stale).await.unwrap();

        let manager = Arc::new(NotificationManager::new(store.clone(), Duration::from_secs(1)));
        let task = tokio::spawn(run_expiry_sweeper(manager, Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert!(store.delete(stale_id).await.is_err());
        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 0);
    }
}
