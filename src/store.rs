use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{retention_cutoff, Notification, LIST_LIMIT};

/// Persistence for notification records.
///
/// Every read path must hide records past the retention window even if the
/// backend has not physically removed them yet.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<Notification>;

    /// Newest first, at most `limit` live records.
    async fn list_recent(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>>;

    async fn mark_read(&self, id: Uuid) -> Result<Notification>;

    /// Returns the number of records that changed from unread to read.
    async fn mark_all_read(&self, user_id: &str) -> Result<u64>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Returns the number of live records removed.
    async fn clear_all(&self, user_id: &str) -> Result<u64>;

    async fn unread_count(&self, user_id: &str) -> Result<u64>;

    /// Physically drop records older than the retention window.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub(crate) fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Notification {} not found", id))
}

/// In-process backend keyed by user id, with an id index for singular operations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    by_user: DashMap<String, Vec<Notification>>,
    owners: DashMap<Uuid, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn owner_of(&self, id: Uuid) -> Result<String> {
        self.owners
            .get(&id)
            .map(|owner| owner.value().clone())
            .ok_or_else(|| not_found(id))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: Notification) -> Result<Notification> {
        self.owners.insert(notification.id, notification.user_id.clone());
        self.by_user
            .entry(notification.user_id.clone())
            .or_default()
            .push(notification.clone());
        Ok(notification)
    }

    async fn list_recent(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let cutoff = retention_cutoff(Utc::now());
        let mut live: Vec<Notification> = match self.by_user.get(user_id) {
            Some(records) => records
                .iter()
                .filter(|n| n.timestamp > cutoff)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        live.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        live.truncate(limit.min(LIST_LIMIT));
        Ok(live)
    }

    async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        let owner = self.owner_of(id)?;
        let now = Utc::now();
        let mut records = self.by_user.get_mut(&owner).ok_or_else(|| not_found(id))?;
        let record = records
            .iter_mut()
            .find(|n| n.id == id && !n.is_expired(now))
            .ok_or_else(|| not_found(id))?;
        record.read = true;
        Ok(record.clone())
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let now = Utc::now();
        let mut changed = 0;
        if let Some(mut records) = self.by_user.get_mut(user_id) {
            for record in records.iter_mut().filter(|n| !n.read && !n.is_expired(now)) {
                record.read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let owner = self.owner_of(id)?;
        let now = Utc::now();
        let mut records = self.by_user.get_mut(&owner).ok_or_else(|| not_found(id))?;
        let position = records
            .iter()
            .position(|n| n.id == id && !n.is_expired(now))
            .ok_or_else(|| not_found(id))?;
        records.remove(position);
        drop(records);
        self.owners.remove(&id);
        Ok(())
    }

    async fn clear_all(&self, user_id: &str) -> Result<u64> {
        let now = Utc::now();
        let removed = match self.by_user.remove(user_id) {
            Some((_, records)) => records,
            None => return Ok(0),
        };
        let mut live = 0;
        for record in &removed {
            self.owners.remove(&record.id);
            if !record.is_expired(now) {
                live += 1;
            }
        }
        Ok(live)
    }

    async fn unread_count(&self, user_id: &str) -> Result<u64> {
        let cutoff = retention_cutoff(Utc::now());
        let count = self
            .by_user
            .get(user_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|n| !n.read && n.timestamp > cutoff)
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut purged = 0;
        for mut entry in self.by_user.iter_mut() {
            let before = entry.value().len();
            let mut expired_ids = Vec::new();
            entry.value_mut().retain(|n| {
                if n.is_expired(now) {
                    expired_ids.push(n.id);
                    false
                } else {
                    true
                }
            });
            purged += (before - entry.value().len()) as u64;
            for id in expired_ids {
                self.owners.remove(&id);
            }
        }
        self.by_user.retain(|_, records| !records.is_empty());
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;
    use chrono::Duration;
    use std::sync::Arc;

    fn record(user: &str, message: &str, age: Duration) -> Notification {
        Notification::new(
            user.to_string(),
            message.to_string(),
            NotificationType::Info,
            None,
            Utc::now() - age,
        )
    }

    #[tokio::test]
    async fn list_is_newest_first_and_capped() {
        let store = MemoryStore::new();
        for i in 0..60 {
            store.insert(record("u1", &format!("m{}", i), Duration::minutes(i))).await.unwrap();
        }
        let listed = store.list_recent("u1", LIST_LIMIT).await.unwrap();
        assert_eq!(listed.len(), LIST_LIMIT);
        assert_eq!(listed[0].message, "m0");
        assert!(listed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[tokio::test]
    async fn users_do_not_see_each_other() {
        let store = MemoryStore::new();
        store.insert(record("u1", "a", Duration::zero())).await.unwrap();
        store.insert(record("u2", "b", Duration::zero())).await.unwrap();
        assert_eq!(store.mark_all_read("u1").await.unwrap(), 1);
        assert_eq!(store.unread_count("u2").await.unwrap(), 1);
        assert_eq!(store.clear_all("u1").await.unwrap(), 1);
        assert_eq!(store.list_recent("u2", LIST_LIMIT).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_read_twice_is_a_no_op() {
        let store = MemoryStore::new();
        let n = store.insert(record("u1", "a", Duration::zero())).await.unwrap();
        let first = store.mark_read(n.id).await.unwrap();
        let second = store.mark_read(n.id).await.unwrap();
        assert!(first.read && second.read);
        assert_eq!(first, second);
        assert_eq!(store.mark_all_read("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_twice_reports_not_found() {
        let store = MemoryStore::new();
        let n = store.insert(record("u1", "a", Duration::zero())).await.unwrap();
        store.delete(n.id).await.unwrap();
        assert!(matches!(store.delete(n.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(store.mark_read(n.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_records_are_hidden_then_purged() {
        let store = MemoryStore::new();
        let old = store.insert(record("u1", "old", Duration::days(31))).await.unwrap();
        store.insert(record("u1", "new", Duration::zero())).await.unwrap();

        let listed = store.list_recent("u1", LIST_LIMIT).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message, "new");
        assert_eq!(store.unread_count("u1").await.unwrap(), 1);
        assert!(matches!(store.mark_read(old.id).await, Err(AppError::NotFound(_))));
        assert_eq!(store.mark_all_read("u1").await.unwrap(), 1);

        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 1);
        assert!(matches!(store.delete(old.id).await, Err(AppError::NotFound(_))));
        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_all_counts_only_live_records() {
        let store = MemoryStore::new();
        store.insert(record("u1", "old", Duration::days(40))).await.unwrap();
        store.insert(record("u1", "a", Duration::zero())).await.unwrap();
        store.insert(record("u1", "b", Duration::zero())).await.unwrap();
        assert_eq!(store.clear_all("u1").await.unwrap(), 2);
        assert!(store.list_recent("u1", LIST_LIMIT).await.unwrap().is_empty());
        assert_eq!(store.clear_all("u1").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn interleaved_writers_keep_counts_consistent() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for i in 0..40i64 {
            let writer = store.clone();
            tasks.push(tokio::spawn(async move {
                let age = if i % 10 == 0 { Duration::days(40) } else { Duration::seconds(i) };
                writer.insert(record("u1", &format!("m{}", i), age)).await.map(|_| 0)
            }));
            if i % 4 == 0 {
                let store = store.clone();
                tasks.push(tokio::spawn(async move { store.mark_all_read("u1").await }));
            }
            if i % 7 == 0 {
                let store = store.clone();
                tasks.push(tokio::spawn(async move { store.purge_expired(Utc::now()).await }));
            }
        }
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let listed = store.list_recent("u1", LIST_LIMIT).await.unwrap();
        assert_eq!(listed.len(), 36);
        let unread = listed.iter().filter(|n| !n.read).count() as u64;
        assert_eq!(store.unread_count("u1").await.unwrap(), unread);
        assert_eq!(store.mark_all_read("u1").await.unwrap(), unread);
        assert_eq!(store.unread_count("u1").await.unwrap(), 0);

        store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 0);
        assert_eq!(store.clear_all("u1").await.unwrap(), 36);
    }
}
