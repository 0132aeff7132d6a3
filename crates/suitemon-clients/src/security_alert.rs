use crate::auth::{TokenProvider, GRAPH_SCOPE};
use crate::{fetch_pages, EventSource, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use suitemon_common::types::SourceType;

/// Alerts raised by the suite's own security products.
pub struct SecurityAlertClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
}

impl SecurityAlertClient {
    pub fn new(tokens: Arc<dyn TokenProvider>, base_url: impl Into<String>) -> Self {
        Self {
            http: crate::http_client(),
            tokens,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl EventSource for SecurityAlertClient {
    fn source_type(&self) -> SourceType {
        SourceType::SecurityAlert
    }

    async fn fetch_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Value>, SourceError> {
        let token = self.tokens.token_for(tenant_id, GRAPH_SCOPE).await?;
        let url = format!(
            "{}/v1.0/security/alerts_v2?$filter=createdDateTime ge {} and createdDateTime lt {}",
            self.base_url.trim_end_matches('/'),
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let events = fetch_pages(&self.http, &token.secret, url, SourceType::SecurityAlert).await?;
        tracing::debug!(tenant_id, count = events.len(), "Security alerts fetched");
        Ok(events)
    }
}
