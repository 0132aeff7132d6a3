use crate::processor::AlertProcessor;
use crate::sink::AlertSink;
use crate::window::poll_window;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use suitemon_clients::EventSource;
use suitemon_common::types::{
    Alert, RunStatus, RunSummary, Tenant, TenantStatus,
};
use suitemon_notify::AlertNotifier;
use suitemon_rules::loader::RuleCatalog;
use suitemon_rules::{evaluator, Rule};
use suitemon_storage::poll_store::PollStore;
use suitemon_storage::state_store::AlertStateStore;

/// Status messages recorded against a tenant are bounded to this length.
const STATUS_MESSAGE_MAX_CHARS: usize = 500;

/// Executes one full poll across all monitored tenants.
///
/// Tenants are processed sequentially to bound upstream load and keep
/// failure attribution unambiguous; within one tenant the source fetches run
/// concurrently and the run waits for all of them.
pub struct PollOrchestrator {
    store: Arc<PollStore>,
    state: Arc<dyn AlertStateStore>,
    sources: Vec<Arc<dyn EventSource>>,
    sink: Arc<dyn AlertSink>,
    notifier: Arc<dyn AlertNotifier>,
    catalog: RuleCatalog,
    processor: AlertProcessor,
    run_history_retention_days: u32,
}

struct TenantOutcome {
    events_processed: u64,
    alerts: Vec<Alert>,
    failed: bool,
}

impl PollOrchestrator {
    pub fn new(
        store: Arc<PollStore>,
        state: Arc<dyn AlertStateStore>,
        sources: Vec<Arc<dyn EventSource>>,
        sink: Arc<dyn AlertSink>,
        notifier: Arc<dyn AlertNotifier>,
        catalog: RuleCatalog,
        run_history_retention_days: u32,
    ) -> Self {
        let processor = AlertProcessor::new(state.clone());
        Self {
            store,
            state,
            sources,
            sink,
            notifier,
            catalog,
            processor,
            run_history_retention_days,
        }
    }

    /// Runs one poll cycle and returns its summary. Tenant failures and
    /// failures of the shared tail steps (sink, notifier) degrade the run
    /// status to partial; the run itself always completes.
    pub async fn run_once(&self) -> RunSummary {
        let start_time = Utc::now();
        let rules = self.catalog.load();
        tracing::info!(rules = rules.len(), "Polling run started");

        let tenants = match self.store.list_tenants() {
            Ok(tenants) => tenants,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list tenants, aborting run");
                return self.finish_run(start_time, 0, 0, 0, RunStatus::Error, Some(e.to_string()));
            }
        };

        let mut events_processed = 0u64;
        let mut batch: Vec<Alert> = Vec::new();
        let mut failed_tenants = 0u32;

        for tenant in &tenants {
            let outcome = self.poll_tenant(tenant, &rules).await;
            events_processed += outcome.events_processed;
            batch.extend(outcome.alerts);
            if outcome.failed {
                failed_tenants += 1;
            }
        }

        let mut status = if failed_tenants > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        let mut error_message: Option<String> = None;

        if let Err(e) = self.sink.upload(&batch).await {
            tracing::error!(error = %e, "Alert batch ingestion failed");
            status = RunStatus::Partial;
            error_message.get_or_insert_with(|| format!("sink: {e}"));
        }

        if let Err(e) = self.notifier.notify(&batch).await {
            tracing::error!(error = %e, "Notification delivery failed");
            status = RunStatus::Partial;
            error_message.get_or_insert_with(|| format!("notifier: {e}"));
        }

        match self.state.sweep_expired(Utc::now()).await {
            Ok(removed) if removed > 0 => {
                tracing::debug!(removed, "Swept expired alert state entries");
            }
            Err(e) => tracing::warn!(error = %e, "Alert state sweep failed"),
            _ => {}
        }

        self.finish_run(
            start_time,
            tenants.len() as u32,
            events_processed,
            batch.len() as u64,
            status,
            error_message,
        )
    }

    fn finish_run(
        &self,
        start_time: chrono::DateTime<Utc>,
        clients_checked: u32,
        events_processed: u64,
        alerts_generated: u64,
        status: RunStatus,
        error_message: Option<String>,
    ) -> RunSummary {
        let end_time = Utc::now();
        let summary = RunSummary {
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds(),
            clients_checked,
            events_processed,
            alerts_generated,
            status,
            error_message,
        };

        if let Err(e) = self.store.append_run_summary(&summary) {
            tracing::error!(error = %e, "Failed to record run summary");
        }
        if let Err(e) = self.store.cleanup_run_history(self.run_history_retention_days) {
            tracing::warn!(error = %e, "Run history cleanup failed");
        }

        tracing::info!(
            status = %summary.status,
            tenants = summary.clients_checked,
            events = summary.events_processed,
            alerts = summary.alerts_generated,
            duration_ms = summary.duration_ms,
            "Polling run finished"
        );
        summary
    }

    /// Polls one tenant: pick the window, fetch the three feeds concurrently,
    /// evaluate every event, and record the terminal outcome. The watermark
    /// advances only on success.
    async fn poll_tenant(&self, tenant: &Tenant, rules: &[Rule]) -> TenantOutcome {
        let now = Utc::now();
        let (since, until) = poll_window(tenant.last_poll, now);
        tracing::debug!(
            tenant_id = %tenant.id,
            since = %since,
            until = %until,
            "Polling tenant"
        );

        let mut handles = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let source = source.clone();
            let tenant_id = tenant.id.clone();
            let source_type = source.source_type();
            handles.push((
                source_type,
                tokio::spawn(async move { source.fetch_since(&tenant_id, since, now).await }),
            ));
        }

        let mut fetched: Vec<(suitemon_common::types::SourceType, Vec<Value>)> = Vec::new();
        let mut failure: Option<(TenantStatus, String)> = None;
        for (source_type, handle) in handles {
            match handle.await {
                Ok(Ok(events)) => fetched.push((source_type, events)),
                Ok(Err(e)) => {
                    tracing::warn!(
                        tenant_id = %tenant.id,
                        source = %source_type,
                        error = %e,
                        "Tenant source fetch failed"
                    );
                    if failure.is_none() {
                        failure = Some((e.tenant_status(), e.to_string()));
                    }
                }
                Err(e) => {
                    tracing::error!(
                        tenant_id = %tenant.id,
                        source = %source_type,
                        error = %e,
                        "Tenant source fetch task aborted"
                    );
                    if failure.is_none() {
                        failure = Some((TenantStatus::Error, format!("fetch task aborted: {e}")));
                    }
                }
            }
        }

        // Events from feeds that did complete are still evaluated; the dedup
        // key absorbs the re-fetch overlap when the tenant retries.
        let mut events_processed = 0u64;
        let mut alerts = Vec::new();
        for (source_type, events) in &fetched {
            for event in events {
                events_processed += 1;
                let matched = evaluator::evaluate(event, *source_type, rules, Some(&tenant.id));
                if let Some(rule) = matched {
                    if let Some(alert) = self
                        .processor
                        .process(tenant, rule, *source_type, event, now)
                        .await
                    {
                        alerts.push(alert);
                    }
                }
            }
        }

        let failed = match failure {
            Some((status, message)) => {
                let message = truncate_chars(&message, STATUS_MESSAGE_MAX_CHARS);
                tracing::warn!(
                    tenant_id = %tenant.id,
                    status = %status,
                    message = %message,
                    "Tenant poll failed, watermark not advanced"
                );
                if let Err(e) = self
                    .store
                    .record_poll_failure(&tenant.id, status, Some(&message))
                {
                    tracing::error!(tenant_id = %tenant.id, error = %e, "Failed to record tenant status");
                }
                true
            }
            None => {
                if let Err(e) = self.store.record_poll_success(&tenant.id, until) {
                    tracing::error!(tenant_id = %tenant.id, error = %e, "Failed to advance tenant watermark");
                }
                false
            }
        };

        tracing::info!(
            tenant_id = %tenant.id,
            events = events_processed,
            alerts = alerts.len(),
            failed,
            "Tenant poll finished"
        );

        TenantOutcome {
            events_processed,
            alerts,
            failed,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
