use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use suitemon_clients::auth::TokenProvider;
use suitemon_common::types::Alert;

/// Scope requested for the log-ingestion endpoint.
pub const INGESTION_SCOPE: &str = "https://monitor.azure.com/.default";

/// Downstream log-ingestion sink. The sink is the authoritative store of
/// emitted alerts; delivery is at-least-once and duplicates are absorbed by
/// the dedup layer's key.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Submits the whole batch as one upload. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the upload fails; the orchestrator records the
    /// run as partial but still notifies.
    async fn upload(&self, alerts: &[Alert]) -> Result<()>;
}

/// HTTP sink adapter: one JSON upload per run, addressed by an immutable
/// collection-rule id and a stream name.
pub struct HttpLogSink {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    /// Home tenant used to authorize ingestion.
    tenant_id: String,
    endpoint: String,
    rule_id: String,
    stream_name: String,
}

impl HttpLogSink {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        tenant_id: impl Into<String>,
        endpoint: impl Into<String>,
        rule_id: impl Into<String>,
        stream_name: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            tenant_id: tenant_id.into(),
            endpoint: endpoint.into(),
            rule_id: rule_id.into(),
            stream_name: stream_name.into(),
        }
    }
}

#[async_trait]
impl AlertSink for HttpLogSink {
    async fn upload(&self, alerts: &[Alert]) -> Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }

        let token = self
            .tokens
            .token_for(&self.tenant_id, INGESTION_SCOPE)
            .await?;
        let url = format!(
            "{}/dataCollectionRules/{}/streams/{}?api-version=2023-01-01",
            self.endpoint.trim_end_matches('/'),
            self.rule_id,
            self.stream_name,
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token.secret)
            .json(alerts)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("sink upload returned {status}: {body}");
        }

        tracing::info!(rows = alerts.len(), stream = %self.stream_name, "Alert batch ingested");
        Ok(())
    }
}
