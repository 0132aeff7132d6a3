use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use suitemon_common::types::{
    RunStatus, RunSummary, Tenant, TenantStatus, PLACEHOLDER_TENANT_ID,
};

const TENANTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    last_poll INTEGER,
    status TEXT NOT NULL DEFAULT 'unknown',
    status_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

const RUN_HISTORY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS run_history (
    row_key TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    clients_checked INTEGER NOT NULL,
    events_processed INTEGER NOT NULL,
    alerts_generated INTEGER NOT NULL,
    status TEXT NOT NULL,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_run_history_start_time ON run_history(start_time);
";

/// Row key for run history: the inverted start timestamp, zero-padded so that
/// ascending key iteration yields newest-first retrieval.
pub fn run_row_key(start_time: DateTime<Utc>) -> String {
    let inverted = u64::MAX - start_time.timestamp_millis().max(0) as u64;
    format!("{inverted:020}")
}

/// Configuration store for the polling engine: the monitored tenant set and
/// the per-run summary history.
pub struct PollStore {
    conn: Mutex<Connection>,
}

impl PollStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("suitemon.db"))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(TENANTS_SCHEMA)?;
        conn.execute_batch(RUN_HISTORY_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- tenants ----

    /// Registers a tenant (operator action). An existing tenant keeps its
    /// watermark and status; only the display name is refreshed.
    pub fn upsert_tenant(&self, id: &str, name: &str) -> Result<()> {
        let conn = self.lock_conn();
        let now = Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO tenants (id, name, status, created_at, updated_at)
             VALUES (?1, ?2, 'unknown', ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            rusqlite::params![id, name, now],
        )?;
        Ok(())
    }

    pub fn remove_tenant(&self, id: &str) -> Result<bool> {
        let conn = self.lock_conn();
        let removed = conn.execute("DELETE FROM tenants WHERE id = ?1", rusqlite::params![id])?;
        Ok(removed > 0)
    }

    /// Lists monitored tenants, excluding the reserved placeholder row.
    pub fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, last_poll, status, status_message FROM tenants
             WHERE id != ?1 ORDER BY name, id",
        )?;
        let rows = stmt.query_map(rusqlite::params![PLACEHOLDER_TENANT_ID], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut tenants = Vec::new();
        for row in rows {
            let (id, name, last_poll, status, status_message) = row?;
            tenants.push(Tenant {
                id,
                name,
                last_poll: last_poll.and_then(DateTime::from_timestamp_millis),
                status: status.parse().unwrap_or(TenantStatus::Unknown),
                status_message,
            });
        }
        Ok(tenants)
    }

    /// Terminal outcome of a successful tenant run: advance the watermark and
    /// clear any previous failure status.
    pub fn record_poll_success(&self, id: &str, last_poll: DateTime<Utc>) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE tenants SET last_poll = ?2, status = 'success', status_message = NULL,
             updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, last_poll.timestamp_millis(), Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Terminal outcome of a failed tenant run: the watermark is left
    /// untouched so the next run retries the same window.
    pub fn record_poll_failure(
        &self,
        id: &str,
        status: TenantStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE tenants SET status = ?2, status_message = ?3, updated_at = ?4 WHERE id = ?1",
            rusqlite::params![
                id,
                status.to_string(),
                message,
                Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    // ---- run history ----

    pub fn append_run_summary(&self, summary: &RunSummary) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT OR REPLACE INTO run_history
             (row_key, start_time, end_time, duration_ms, clients_checked, events_processed,
              alerts_generated, status, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                run_row_key(summary.start_time),
                summary.start_time.timestamp_millis(),
                summary.end_time.timestamp_millis(),
                summary.duration_ms,
                summary.clients_checked,
                summary.events_processed as i64,
                summary.alerts_generated as i64,
                summary.status.to_string(),
                summary.error_message,
            ],
        )?;
        Ok(())
    }

    /// Newest-first run summaries; ascending row-key order is descending
    /// start-time order by construction.
    pub fn list_run_summaries(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT start_time, end_time, duration_ms, clients_checked, events_processed,
                    alerts_generated, status, error_message
             FROM run_history ORDER BY row_key ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (start, end, duration_ms, clients, events, alerts, status, error_message) = row?;
            summaries.push(RunSummary {
                start_time: DateTime::from_timestamp_millis(start).unwrap_or_default(),
                end_time: DateTime::from_timestamp_millis(end).unwrap_or_default(),
                duration_ms,
                clients_checked: clients as u32,
                events_processed: events as u64,
                alerts_generated: alerts as u64,
                status: status.parse().unwrap_or(RunStatus::Error),
                error_message,
            });
        }
        Ok(summaries)
    }

    /// Removes run summaries older than the retention period. Returns the
    /// number of rows removed.
    pub fn cleanup_run_history(&self, retention_days: u32) -> Result<u32> {
        let cutoff = (Utc::now() - Duration::days(retention_days as i64)).timestamp_millis();
        let conn = self.lock_conn();
        let removed = conn.execute(
            "DELETE FROM run_history WHERE start_time < ?1",
            rusqlite::params![cutoff],
        )?;
        Ok(removed as u32)
    }
}
