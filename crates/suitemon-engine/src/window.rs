use chrono::{DateTime, Duration, Utc};

/// Window used for a tenant that has never been polled successfully.
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 60;
/// Floor on how far back any window may reach. Keeps a long-offline tenant
/// from replaying days of history into the pipeline.
pub const MAX_LOOKBACK_MINUTES: i64 = 360;

/// Selects the half-open `[since, until)` fetch window for a tenant.
pub fn poll_window(
    last_poll: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let floor = now - Duration::minutes(MAX_LOOKBACK_MINUTES);
    let since = match last_poll {
        Some(last_poll) => last_poll.max(floor),
        None => now - Duration::minutes(DEFAULT_LOOKBACK_MINUTES),
    };
    (since, now)
}
