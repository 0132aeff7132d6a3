use crate::extract;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use suitemon_common::types::{Alert, Severity, SourceType, Tenant};
use suitemon_rules::Rule;
use suitemon_storage::state_store::{
    state_row_key, AlertStateStore, DedupEntry, NotificationEntry, DEDUP_WINDOW_MINUTES,
    NOTIFY_WINDOW_MINUTES,
};

/// Drives a matched event through the two-layer alert state machine.
///
/// Layer one suppresses duplicate emissions of the same (tenant, rule, user)
/// within the dedup window, compared by absolute difference of *event*
/// timestamps so out-of-order arrivals collapse symmetrically. Layer two
/// throttles notifications within its window; critical severity bypasses it.
///
/// All state operations are best-effort: a store error on read is treated as
/// "entry absent" and a store error on write is logged, so an alert is never
/// silently dropped because the state store is unavailable.
pub struct AlertProcessor {
    state: Arc<dyn AlertStateStore>,
}

impl AlertProcessor {
    pub fn new(state: Arc<dyn AlertStateStore>) -> Self {
        Self { state }
    }

    /// Returns the alert to emit, or `None` when the dedup layer suppresses
    /// the event.
    pub async fn process(
        &self,
        tenant: &Tenant,
        rule: &Rule,
        source: SourceType,
        event: &Value,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let user = extract::acting_user(source, event);
        let event_time = extract::event_time(source, event, now);
        let row_key = state_row_key(&rule.name, &user);

        if self.is_duplicate(&tenant.id, &row_key, event_time).await {
            tracing::debug!(
                tenant_id = %tenant.id,
                rule = %rule.name,
                user = %user,
                "Alert suppressed (dedup window)"
            );
            return None;
        }

        let entry = DedupEntry {
            event_time,
            rule_name: rule.name.clone(),
            user: user.clone(),
        };
        if let Err(e) = self.state.put_dedup(&tenant.id, &row_key, &entry).await {
            tracing::warn!(tenant_id = %tenant.id, rule = %rule.name, error = %e, "Failed to record dedup entry, alert proceeds");
        }

        let should_notify = self
            .resolve_notification(&tenant.id, &row_key, rule, &user, now)
            .await;

        Some(Alert {
            time_generated: event_time,
            time_processed: now,
            tenant_id: tenant.id.clone(),
            tenant_name: tenant.name.clone(),
            user,
            rule_name: rule.name.clone(),
            severity: rule.severity,
            description: rule.description.clone(),
            source,
            event_id: extract::event_id(source, event),
            raw_event: extract::raw_summary(source, event),
            should_notify,
        })
    }

    async fn is_duplicate(&self, tenant_id: &str, row_key: &str, event_time: DateTime<Utc>) -> bool {
        let entry = match self.state.get_dedup(tenant_id, row_key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(tenant_id, error = %e, "Dedup lookup failed, treating as absent");
                return false;
            }
        };
        match entry {
            Some(entry) => {
                let delta = (event_time - entry.event_time).num_milliseconds().abs();
                delta < Duration::minutes(DEDUP_WINDOW_MINUTES).num_milliseconds()
            }
            None => false,
        }
    }

    /// Applies the notification throttle and updates its state. Critical
    /// alerts always notify and still refresh the record.
    async fn resolve_notification(
        &self,
        tenant_id: &str,
        row_key: &str,
        rule: &Rule,
        user: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let prior = match self.state.get_notification(tenant_id, row_key).await {
            Ok(prior) => prior,
            Err(e) => {
                tracing::warn!(tenant_id, error = %e, "Notification lookup failed, treating as absent");
                None
            }
        };

        let critical = rule.severity == Severity::Critical;
        if !critical {
            if let Some(prior) = &prior {
                let elapsed = (now - prior.last_notified).num_milliseconds();
                if elapsed < Duration::minutes(NOTIFY_WINDOW_MINUTES).num_milliseconds() {
                    return false;
                }
            }
        }

        let entry = NotificationEntry {
            last_notified: now,
            alert_count: prior.map(|p| p.alert_count + 1).unwrap_or(1),
            rule_name: rule.name.to_string(),
            user: user.to_string(),
        };
        if let Err(e) = self.state.put_notification(tenant_id, row_key, &entry).await {
            tracing::warn!(tenant_id, rule = %rule.name, error = %e, "Failed to record notification entry, alert proceeds");
        }
        true
    }
}
