//! Chat-webhook notification delivery.
//!
//! The notifier receives the full alert batch of a run, keeps alerts at or
//! above the configured minimum severity whose `should_notify` flag survived
//! the throttle, groups them by tenant, and posts a single card per run to
//! the configured webhook. Delivery failures are reported to the caller but
//! never retried within the run.

pub mod card;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use suitemon_common::types::{Alert, Severity};

/// Alert-delivery configuration as read from the configuration store.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_minimum_severity")]
    pub minimum_severity: Severity,
}

fn default_minimum_severity() -> Severity {
    Severity::Low
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            minimum_severity: default_minimum_severity(),
        }
    }
}

/// Delivers a run's alert batch to operators.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// Sends at most one notification for the batch.
    ///
    /// # Errors
    ///
    /// Returns an error when the webhook rejects the card or the post fails;
    /// the caller records the failure, it is not retried within the run.
    async fn notify(&self, alerts: &[Alert]) -> Result<()>;
}

/// Alerts that pass the delivery filter: severity at or above the minimum,
/// and not muted by the notification throttle.
pub fn eligible_alerts<'a>(alerts: &'a [Alert], minimum: Severity) -> Vec<&'a Alert> {
    alerts
        .iter()
        .filter(|alert| alert.severity >= minimum && alert.should_notify)
        .collect()
}

pub struct WebhookNotifier {
    config: NotifyConfig,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertNotifier for WebhookNotifier {
    async fn notify(&self, alerts: &[Alert]) -> Result<()> {
        let url = match (self.config.enabled, self.config.webhook_url.as_deref()) {
            (true, Some(url)) if !url.is_empty() => url,
            _ => {
                tracing::debug!("Notifications disabled or webhook not configured, skipping");
                return Ok(());
            }
        };

        let eligible = eligible_alerts(alerts, self.config.minimum_severity);
        if eligible.is_empty() {
            return Ok(());
        }

        let groups = card::group_by_tenant(&eligible);
        let payload = card::render_card(&groups);

        let response = self.http.post(url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("chat webhook returned {status}: {body}");
        }

        tracing::info!(
            alerts = eligible.len(),
            tenants = groups.len(),
            "Notification card sent"
        );
        Ok(())
    }
}
