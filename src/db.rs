use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::batch::{Batch, BatchType};
use scylla::response::query_result::QueryResult;
use scylla::statement::prepared::PreparedStatement;
use scylla::value::{CqlValue, Row};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ScyllaConfig;
use crate::error::{AppError, Result, TraceErr};
use crate::models::{retention, retention_cutoff, Notification, NotificationType, RelatedEntity, LIST_LIMIT};
use crate::store::{not_found, NotificationStore};

const NOTIFICATION_COLUMNS: &str = "id, user_id, message, kind, read, entity_type, entity_id, ts";

/// Upper bound on statements per batch, well under the cluster's batch size limit.
const MAX_BATCH_STATEMENTS: usize = 100;

// message and kind are nullable on read: an update racing a delete can leave a
// row holding only its key and `read`.
type NotificationRow = (
    Uuid,
    String,
    Option<String>,
    Option<String>,
    bool,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

/// `None` for a row that lost its body; callers treat it as absent.
fn row_to_notification(row: NotificationRow) -> Result<Option<Notification>> {
    let (id, user_id, message, kind, read, entity_type, entity_id, timestamp) = row;
    let (message, kind) = match (message, kind) {
        (Some(message), Some(kind)) => (message, kind),
        _ => {
            tracing::warn!("Skipping notification {} for user {} with no message or kind", id, user_id);
            return Ok(None);
        }
    };
    let kind = kind.parse::<NotificationType>().map_err(AppError::Internal)?;
    let related_entity = match (entity_type, entity_id) {
        (Some(entity_type), Some(entity_id)) => Some(RelatedEntity {
            entity_type: entity_type.parse().map_err(AppError::Internal)?,
            entity_id,
        }),
        _ => None,
    };
    Ok(Some(Notification {
        id,
        user_id,
        message,
        kind,
        read,
        related_entity,
        timestamp,
    }))
}

/// First column of a conditional statement's result row is `[applied]`.
fn lwt_applied(row: &Row) -> bool {
    matches!(row.columns.first(), Some(Some(CqlValue::Boolean(true))))
}

fn was_applied(result: QueryResult) -> Result<bool> {
    let rows = result.into_rows_result()?;
    let mut applied = true;
    for row in rows.rows::<Row>()? {
        applied &= lwt_applied(&row?);
    }
    Ok(applied)
}

/// Seconds a record written at `timestamp` still has to live; zero or less means expired.
fn remaining_ttl(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    let left = (timestamp + retention() - now).num_seconds();
    left.clamp(0, i32::MAX as i64) as i32
}

struct Statements {
    insert: PreparedStatement,
    insert_index: PreparedStatement,
    list: PreparedStatement,
    lookup: PreparedStatement,
    select_one: PreparedStatement,
    set_read: PreparedStatement,
    unread_keys: PreparedStatement,
    read_flags: PreparedStatement,
    live_keys: PreparedStatement,
    delete_one: PreparedStatement,
    delete_index: PreparedStatement,
    delete_partition: PreparedStatement,
}

/// Scylla backend. Expiry is native: both tables carry a 30-day default TTL and
/// every write restates the record's remaining lifetime.
#[derive(Clone)]
pub struct ScyllaConnector {
    session: Arc<Session>,
    statements: Arc<Statements>,
}

impl ScyllaConnector {
    pub async fn connect(config: &ScyllaConfig) -> Result<Session> {
        let mut builder = SessionBuilder::new().known_nodes(&config.nodes);
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.user(user, password);
        }
        let session = builder.build().await.trace_err("connecting to scylla")?;
        tracing::info!("Connected to Scylla nodes {:?}", config.nodes);
        Ok(session)
    }

    /// Prepare statements against an already migrated keyspace.
    pub async fn with_session(session: Arc<Session>, keyspace: &str) -> Result<Self> {
        let ks = keyspace;
        let statements = Statements {
            insert: session
                .prepare(format!(
                    "INSERT INTO {ks}.notifications_by_user ({NOTIFICATION_COLUMNS}) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?) USING TTL ?"
                ))
                .await?,
            insert_index: session
                .prepare(format!(
                    "INSERT INTO {ks}.notification_by_id (id, user_id, ts) VALUES (?, ?, ?) USING TTL ?"
                ))
                .await?,
            list: session
                .prepare(format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM {ks}.notifications_by_user \
                     WHERE user_id = ? AND ts > ? LIMIT ?"
                ))
                .await?,
            lookup: session
                .prepare(format!("SELECT user_id, ts FROM {ks}.notification_by_id WHERE id = ?"))
                .await?,
            select_one: session
                .prepare(format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM {ks}.notifications_by_user \
                     WHERE user_id = ? AND ts = ? AND id = ?"
                ))
                .await?,
            set_read: session
                .prepare(format!(
                    "UPDATE {ks}.notifications_by_user USING TTL ? SET read = true \
                     WHERE user_id = ? AND ts = ? AND id = ? IF EXISTS"
                ))
                .await?,
            unread_keys: session
                .prepare(format!(
                    "SELECT ts, id, read FROM {ks}.notifications_by_user WHERE user_id = ? AND ts > ?"
                ))
                .await?,
            read_flags: session
                .prepare(format!(
                    "SELECT read FROM {ks}.notifications_by_user WHERE user_id = ? AND ts > ?"
                ))
                .await?,
            live_keys: session
                .prepare(format!(
                    "SELECT ts, id FROM {ks}.notifications_by_user WHERE user_id = ?"
                ))
                .await?,
            delete_one: session
                .prepare(format!(
                    "DELETE FROM {ks}.notifications_by_user WHERE user_id = ? AND ts = ? AND id = ?"
                ))
                .await?,
            delete_index: session
                .prepare(format!("DELETE FROM {ks}.notification_by_id WHERE id = ?"))
                .await?,
            delete_partition: session
                .prepare(format!("DELETE FROM {ks}.notifications_by_user WHERE user_id = ?"))
                .await?,
        };

        Ok(Self {
            session,
            statements: Arc::new(statements),
        })
    }

    /// Resolve an id to its partition and clustering key, hiding expired records.
    async fn locate(&self, id: Uuid, now: DateTime<Utc>) -> Result<(String, DateTime<Utc>)> {
        let result = self
            .session
            .execute_unpaged(&self.statements.lookup, (id,))
            .await?
            .into_rows_result()?;
        let mut rows = result.rows::<(String, DateTime<Utc>)>()?;
        match rows.next() {
            Some(row) => {
                let (user_id, ts) = row?;
                if ts <= retention_cutoff(now) {
                    return Err(not_found(id));
                }
                Ok((user_id, ts))
            }
            None => Err(not_found(id)),
        }
    }

    async fn select_one(&self, user_id: &str, ts: DateTime<Utc>, id: Uuid) -> Result<Notification> {
        let result = self
            .session
            .execute_unpaged(&self.statements.select_one, (user_id, ts, id))
            .await?
            .into_rows_result()?;
        let mut rows = result.rows::<NotificationRow>()?;
        match rows.next() {
            Some(row) => row_to_notification(row?)?.ok_or_else(|| not_found(id)),
            None => Err(not_found(id)),
        }
    }

    /// Conditional update; false when the row vanished since it was read.
    async fn set_read(&self, user_id: &str, ts: DateTime<Utc>, id: Uuid, ttl: i32) -> Result<bool> {
        let result = self
            .session
            .execute_unpaged(&self.statements.set_read, (ttl, user_id, ts, id))
            .await
            .trace_err("marking notification read")?;
        was_applied(result)
    }
}

#[async_trait]
impl NotificationStore for ScyllaConnector {
    async fn insert(&self, notification: Notification) -> Result<Notification> {
        let ttl = remaining_ttl(notification.timestamp, Utc::now());
        if ttl == 0 {
            return Err(AppError::Validation("Notification timestamp is past the retention window".to_string()));
        }
        let (entity_type, entity_id) = match &notification.related_entity {
            Some(related) => (Some(related.entity_type.as_str()), Some(related.entity_id.as_str())),
            None => (None, None),
        };

        // Record and id index land together or not at all.
        let mut batch = Batch::new(BatchType::Logged);
        batch.append_statement(self.statements.insert.clone());
        batch.append_statement(self.statements.insert_index.clone());
        self.session
            .batch(
                &batch,
                (
                    (
                        notification.id,
                        notification.user_id.as_str(),
                        notification.message.as_str(),
                        notification.kind.as_str(),
                        notification.read,
                        entity_type,
                        entity_id,
                        notification.timestamp,
                        ttl,
                    ),
                    (notification.id, notification.user_id.as_str(), notification.timestamp, ttl),
                ),
            )
            .await
            .trace_err("inserting notification")?;

        Ok(notification)
    }

    async fn list_recent(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let cutoff = retention_cutoff(Utc::now());
        let limit = limit.min(LIST_LIMIT) as i32;
        let result = self
            .session
            .execute_unpaged(&self.statements.list, (user_id, cutoff, limit))
            .await
            .trace_err("listing notifications")?
            .into_rows_result()?;

        let mut notifications = Vec::new();
        for row in result.rows::<NotificationRow>()? {
            if let Some(notification) = row_to_notification(row?)? {
                notifications.push(notification);
            }
        }
        Ok(notifications)
    }

    async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        let now = Utc::now();
        let (user_id, ts) = self.locate(id, now).await?;
        let mut notification = self.select_one(&user_id, ts, id).await?;
        if !notification.read {
            let ttl = remaining_ttl(ts, now);
            if ttl == 0 {
                return Err(not_found(id));
            }
            if !self.set_read(&user_id, ts, id, ttl).await? {
                return Err(not_found(id));
            }
            notification.read = true;
        }
        Ok(notification)
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let now = Utc::now();
        let result = self
            .session
            .execute_unpaged(&self.statements.unread_keys, (user_id, retention_cutoff(now)))
            .await?
            .into_rows_result()?;

        let mut pending = Vec::new();
        for row in result.rows::<(DateTime<Utc>, Uuid, Option<bool>)>()? {
            let (ts, id, read) = row?;
            let ttl = remaining_ttl(ts, now);
            if read == Some(true) || ttl == 0 {
                continue;
            }
            pending.push((ttl, user_id, ts, id));
        }

        // Each chunk is one single-partition conditional batch. If any row in it
        // disappeared the batch is not applied, so that chunk falls back to
        // row-by-row updates and only surviving rows are counted.
        let mut changed = 0u64;
        for chunk in pending.chunks(MAX_BATCH_STATEMENTS) {
            let mut batch = Batch::new(BatchType::Logged);
            for _ in chunk {
                batch.append_statement(self.statements.set_read.clone());
            }
            let result = self
                .session
                .batch(&batch, chunk.to_vec())
                .await
                .trace_err("marking all notifications read")?;
            if was_applied(result)? {
                changed += chunk.len() as u64;
                continue;
            }
            for &(ttl, user_id, ts, id) in chunk {
                if self.set_read(user_id, ts, id, ttl).await? {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let (user_id, ts) = self.locate(id, Utc::now()).await?;
        match self.select_one(&user_id, ts, id).await {
            Ok(_) => {}
            Err(AppError::NotFound(message)) => {
                // Index entry left behind by an interrupted ClearAll.
                self.session
                    .execute_unpaged(&self.statements.delete_index, (id,))
                    .await
                    .trace_err("dropping stale notification index")?;
                return Err(AppError::NotFound(message));
            }
            Err(e) => return Err(e),
        }

        let mut batch = Batch::new(BatchType::Logged);
        batch.append_statement(self.statements.delete_one.clone());
        batch.append_statement(self.statements.delete_index.clone());
        self.session
            .batch(&batch, ((user_id.as_str(), ts, id), (id,)))
            .await
            .trace_err("deleting notification")?;
        Ok(())
    }

    async fn clear_all(&self, user_id: &str) -> Result<u64> {
        let now = Utc::now();
        let cutoff = retention_cutoff(now);
        let result = self
            .session
            .execute_unpaged(&self.statements.live_keys, (user_id,))
            .await?
            .into_rows_result()?;

        let mut ids = Vec::new();
        let mut live = 0u64;
        for row in result.rows::<(DateTime<Utc>, Uuid)>()? {
            let (ts, id) = row?;
            if ts > cutoff {
                live += 1;
            }
            ids.push(id);
        }
        if ids.is_empty() {
            return Ok(0);
        }

        // Records go first in one partition tombstone. Index entries follow in
        // bounded batches; any left behind by a failure resolve to NotFound and
        // expire with their TTL.
        self.session
            .execute_unpaged(&self.statements.delete_partition, (user_id,))
            .await
            .trace_err("clearing notifications")?;
        for chunk in ids.chunks(MAX_BATCH_STATEMENTS) {
            let mut batch = Batch::new(BatchType::Unlogged);
            let mut values = Vec::with_capacity(chunk.len());
            for id in chunk {
                batch.append_statement(self.statements.delete_index.clone());
                values.push((*id,));
            }
            self.session
                .batch(&batch, values)
                .await
                .trace_err("clearing notification index")?;
        }
        Ok(live)
    }

    async fn unread_count(&self, user_id: &str) -> Result<u64> {
        let result = self
            .session
            .execute_unpaged(&self.statements.read_flags, (user_id, retention_cutoff(Utc::now())))
            .await
            .trace_err("counting unread notifications")?
            .into_rows_result()?;

        let mut unread = 0u64;
        for row in result.rows::<(Option<bool>,)>()? {
            let (read,) = row?;
            if read == Some(false) {
                unread += 1;
            }
        }
        Ok(unread)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
        // Table TTL removes expired rows; reads already skip them.
        tracing::debug!("Scylla TTL handles notification expiry, nothing to sweep");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ttl_counts_down_from_thirty_days() {
        let now = Utc::now();
        assert_eq!(remaining_ttl(now, now), 30 * 24 * 60 * 60);
        assert_eq!(remaining_ttl(now - Duration::days(29), now), 24 * 60 * 60);
        assert_eq!(remaining_ttl(now - Duration::days(31), now), 0);
    }

    #[test]
    fn rows_with_partial_entity_drop_it() {
        let row: NotificationRow = (
            Uuid::new_v4(),
            "u1".into(),
            Some("hello".into()),
            Some("warning".into()),
            false,
            Some("fee".into()),
            None,
            Utc::now(),
        );
        let n = row_to_notification(row).unwrap().unwrap();
        assert_eq!(n.kind, NotificationType::Warning);
        assert!(n.related_entity.is_none());
    }

    #[test]
    fn unknown_kind_is_an_internal_error() {
        let row: NotificationRow = (
            Uuid::new_v4(),
            "u1".into(),
            Some("hello".into()),
            Some("shout".into()),
            false,
            None,
            None,
            Utc::now(),
        );
        assert!(matches!(row_to_notification(row), Err(AppError::Internal(_))));
    }

    #[test]
    fn row_missing_its_body_is_skipped() {
        let row: NotificationRow = (
            Uuid::new_v4(),
            "u1".into(),
            None,
            None,
            true,
            None,
            None,
            Utc::now(),
        );
        assert!(row_to_notification(row).unwrap().is_none());
    }

    #[test]
    fn conditional_result_reports_applied_flag() {
        let applied = Row { columns: vec![Some(CqlValue::Boolean(true))] };
        let rejected = Row {
            columns: vec![Some(CqlValue::Boolean(false)), Some(CqlValue::Text("u1".into()))],
        };
        assert!(lwt_applied(&applied));
        assert!(!lwt_applied(&rejected));
        assert!(!lwt_applied(&Row { columns: vec![] }));
    }

    #[test]
    fn bulk_writes_are_split_under_the_batch_limit() {
        let ids: Vec<Uuid> = (0..250).map(|_| Uuid::new_v4()).collect();
        let sizes: Vec<usize> = ids.chunks(MAX_BATCH_STATEMENTS).map(<[Uuid]>::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }
}
