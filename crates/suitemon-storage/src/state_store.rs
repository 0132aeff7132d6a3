use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Dedup entries older than this are semantically absent.
pub const DEDUP_WINDOW_MINUTES: i64 = 5;
/// Notification entries older than this are semantically absent.
pub const NOTIFY_WINDOW_MINUTES: i64 = 60;

/// Row key for both alert-state tables: a truncated SHA-256 digest over the
/// rule name and the lowercased acting user. The empty user is hashed as the
/// empty string, giving a rule with no acting user a single per-(tenant,
/// rule) slot.
pub fn state_row_key(rule_name: &str, user: &str) -> String {
    let input = format!("{rule_name}|{}", user.to_lowercase());
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..32].to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupEntry {
    /// Timestamp of the recorded source event, not wall-clock.
    pub event_time: DateTime<Utc>,
    pub rule_name: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEntry {
    pub last_notified: DateTime<Utc>,
    pub alert_count: i64,
    pub rule_name: String,
    pub user: String,
}

/// Key-value backend for the two alert-state tables.
///
/// Entries are idempotent upserts and reads compare stored timestamps to a
/// window, so concurrent access from other processes is safe without
/// locking. The sweeper bounds storage; lookups never depend on it having
/// run.
#[async_trait]
pub trait AlertStateStore: Send + Sync {
    async fn get_dedup(&self, tenant_id: &str, row_key: &str) -> Result<Option<DedupEntry>>;

    async fn put_dedup(&self, tenant_id: &str, row_key: &str, entry: &DedupEntry) -> Result<()>;

    async fn get_notification(
        &self,
        tenant_id: &str,
        row_key: &str,
    ) -> Result<Option<NotificationEntry>>;

    async fn put_notification(
        &self,
        tenant_id: &str,
        row_key: &str,
        entry: &NotificationEntry,
    ) -> Result<()>;

    /// Deletes entries past their window relative to `now`. Returns the
    /// number of rows removed across both tables.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

const DEDUP_STATE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dedup_state (
    tenant_id TEXT NOT NULL,
    row_key TEXT NOT NULL,
    event_time INTEGER NOT NULL,
    rule_name TEXT NOT NULL,
    user TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (tenant_id, row_key)
);
CREATE INDEX IF NOT EXISTS idx_dedup_state_event_time ON dedup_state(event_time);
";

const NOTIFICATION_STATE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notification_state (
    tenant_id TEXT NOT NULL,
    row_key TEXT NOT NULL,
    last_notified INTEGER NOT NULL,
    alert_count INTEGER NOT NULL,
    rule_name TEXT NOT NULL,
    user TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (tenant_id, row_key)
);
CREATE INDEX IF NOT EXISTS idx_notification_state_last_notified ON notification_state(last_notified);
";

/// SQLite-backed alert-state store.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("alert_state.db"))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(DEDUP_STATE_SCHEMA)?;
        conn.execute_batch(NOTIFICATION_STATE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AlertStateStore for SqliteStateStore {
    async fn get_dedup(&self, tenant_id: &str, row_key: &str) -> Result<Option<DedupEntry>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT event_time, rule_name, user FROM dedup_state WHERE tenant_id = ?1 AND row_key = ?2",
        )?;
        let entry = stmt
            .query_row(rusqlite::params![tenant_id, row_key], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map(|(millis, rule_name, user)| DedupEntry {
                event_time: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
                rule_name,
                user,
            });
        match entry {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_dedup(&self, tenant_id: &str, row_key: &str, entry: &DedupEntry) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO dedup_state (tenant_id, row_key, event_time, rule_name, user, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tenant_id, row_key) DO UPDATE SET
                 event_time = excluded.event_time,
                 rule_name = excluded.rule_name,
                 user = excluded.user,
                 updated_at = excluded.updated_at",
            rusqlite::params![
                tenant_id,
                row_key,
                entry.event_time.timestamp_millis(),
                entry.rule_name,
                entry.user,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn get_notification(
        &self,
        tenant_id: &str,
        row_key: &str,
    ) -> Result<Option<NotificationEntry>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT last_notified, alert_count, rule_name, user FROM notification_state
             WHERE tenant_id = ?1 AND row_key = ?2",
        )?;
        let entry = stmt
            .query_row(rusqlite::params![tenant_id, row_key], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map(|(millis, alert_count, rule_name, user)| NotificationEntry {
                last_notified: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
                alert_count,
                rule_name,
                user,
            });
        match entry {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_notification(
        &self,
        tenant_id: &str,
        row_key: &str,
        entry: &NotificationEntry,
    ) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO notification_state (tenant_id, row_key, last_notified, alert_count, rule_name, user, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_id, row_key) DO UPDATE SET
                 last_notified = excluded.last_notified,
                 alert_count = excluded.alert_count,
                 rule_name = excluded.rule_name,
                 user = excluded.user,
                 updated_at = excluded.updated_at",
            rusqlite::params![
                tenant_id,
                row_key,
                entry.last_notified.timestamp_millis(),
                entry.alert_count,
                entry.rule_name,
                entry.user,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let dedup_cutoff = (now - Duration::minutes(DEDUP_WINDOW_MINUTES)).timestamp_millis();
        let notify_cutoff = (now - Duration::minutes(NOTIFY_WINDOW_MINUTES)).timestamp_millis();
        let conn = self.lock_conn();
        let dedup_removed = conn.execute(
            "DELETE FROM dedup_state WHERE event_time < ?1",
            rusqlite::params![dedup_cutoff],
        )?;
        let notify_removed = conn.execute(
            "DELETE FROM notification_state WHERE last_notified < ?1",
            rusqlite::params![notify_cutoff],
        )?;
        Ok((dedup_removed + notify_removed) as u64)
    }
}

/// In-memory alert-state store. Used in tests and suitable for single-process
/// deployments that can tolerate losing suppression state on restart.
#[derive(Default)]
pub struct MemoryStateStore {
    dedup: Mutex<HashMap<(String, String), DedupEntry>>,
    notifications: Mutex<HashMap<(String, String), NotificationEntry>>,
}

#[async_trait]
impl AlertStateStore for MemoryStateStore {
    async fn get_dedup(&self, tenant_id: &str, row_key: &str) -> Result<Option<DedupEntry>> {
        let dedup = self
            .dedup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(dedup.get(&(tenant_id.to_string(), row_key.to_string())).cloned())
    }

    async fn put_dedup(&self, tenant_id: &str, row_key: &str, entry: &DedupEntry) -> Result<()> {
        let mut dedup = self
            .dedup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        dedup.insert((tenant_id.to_string(), row_key.to_string()), entry.clone());
        Ok(())
    }

    async fn get_notification(
        &self,
        tenant_id: &str,
        row_key: &str,
    ) -> Result<Option<NotificationEntry>> {
        let notifications = self
            .notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(notifications
            .get(&(tenant_id.to_string(), row_key.to_string()))
            .cloned())
    }

    async fn put_notification(
        &self,
        tenant_id: &str,
        row_key: &str,
        entry: &NotificationEntry,
    ) -> Result<()> {
        let mut notifications = self
            .notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        notifications.insert((tenant_id.to_string(), row_key.to_string()), entry.clone());
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let dedup_cutoff = now - Duration::minutes(DEDUP_WINDOW_MINUTES);
        let notify_cutoff = now - Duration::minutes(NOTIFY_WINDOW_MINUTES);
        let mut removed = 0u64;
        {
            let mut dedup = self
                .dedup
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let before = dedup.len();
            dedup.retain(|_, entry| entry.event_time >= dedup_cutoff);
            removed += (before - dedup.len()) as u64;
        }
        {
            let mut notifications = self
                .notifications
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let before = notifications.len();
            notifications.retain(|_, entry| entry.last_notified >= notify_cutoff);
            removed += (before - notifications.len()) as u64;
        }
        Ok(removed)
    }
}
