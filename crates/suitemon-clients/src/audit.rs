use crate::auth::{TokenProvider, MANAGEMENT_SCOPE};
use crate::{EventSource, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use suitemon_common::types::SourceType;

/// Content feeds the audit-activity API is subscribed to.
const CONTENT_TYPES: [&str; 4] = [
    "Audit.AzureActiveDirectory",
    "Audit.Exchange",
    "Audit.SharePoint",
    "Audit.General",
];

/// Unified audit-activity events.
///
/// The feed is blob-based: a content listing yields URIs, each resolving to a
/// batch of audit records. Every content type needs an idempotent
/// subscription `start` before its listing is readable; a "tenant does not
/// exist" response there means audit logging has never been enabled for the
/// tenant.
pub struct AuditLogClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
}

#[derive(Deserialize)]
struct ContentBlob {
    #[serde(rename = "contentUri")]
    content_uri: String,
}

impl AuditLogClient {
    pub fn new(tokens: Arc<dyn TokenProvider>, base_url: impl Into<String>) -> Self {
        Self {
            http: crate::http_client(),
            tokens,
            base_url: base_url.into(),
        }
    }

    async fn ensure_subscription(
        &self,
        tenant_id: &str,
        bearer: &str,
        content_type: &str,
    ) -> Result<(), SourceError> {
        let url = format!(
            "{}/api/v1.0/{}/activity/feed/subscriptions/start?contentType={}",
            self.base_url.trim_end_matches('/'),
            tenant_id,
            content_type,
        );
        let response = self.http.post(&url).bearer_auth(bearer).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let lower = body.to_lowercase();
        if lower.contains("subscription") && lower.contains("enabled") {
            // Already subscribed; start is idempotent in spirit if not in status code.
            return Ok(());
        }
        if lower.contains("tenant") && (lower.contains("not exist") || lower.contains("not found"))
        {
            return Err(SourceError::AuditLogDisabled {
                tenant_id: tenant_id.to_string(),
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::PermissionDenied {
                detail: format!("audit subscription start returned {status}: {body}"),
            });
        }
        Err(SourceError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Lists available content blobs for one content type, following the
    /// `NextPageUri` header continuation.
    async fn list_content(
        &self,
        tenant_id: &str,
        bearer: &str,
        content_type: &str,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentBlob>, SourceError> {
        let time_format = "%Y-%m-%dT%H:%M:%S";
        let mut url = Some(format!(
            "{}/api/v1.0/{}/activity/feed/subscriptions/content?contentType={}&startTime={}&endTime={}",
            self.base_url.trim_end_matches('/'),
            tenant_id,
            content_type,
            since.format(time_format),
            now.format(time_format),
        ));

        let mut blobs = Vec::new();
        while let Some(current) = url.take() {
            let response = match self.http.get(&current).bearer_auth(bearer).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(tenant_id, content_type, error = %e, "Audit content listing failed, returning partial results");
                    return Ok(blobs);
                }
            };
            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                let body = response.text().await.unwrap_or_default();
                return Err(SourceError::PermissionDenied {
                    detail: format!("audit content listing returned {status}: {body}"),
                });
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(tenant_id, content_type, status = status.as_u16(), body = %body, "Audit content listing rejected, returning partial results");
                return Ok(blobs);
            }

            let next = response
                .headers()
                .get("NextPageUri")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match response.json::<Vec<ContentBlob>>().await {
                Ok(page) => {
                    blobs.extend(page);
                    url = next;
                }
                Err(e) => {
                    tracing::warn!(tenant_id, content_type, error = %e, "Audit content listing decode failed");
                    return Ok(blobs);
                }
            }
        }
        Ok(blobs)
    }

    async fn fetch_blob(&self, bearer: &str, blob: &ContentBlob) -> Vec<Value> {
        let response = match self.http.get(&blob.content_uri).bearer_auth(bearer).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(uri = %blob.content_uri, error = %e, "Audit blob fetch failed, skipping");
                return Vec::new();
            }
        };
        if !response.status().is_success() {
            tracing::warn!(uri = %blob.content_uri, status = response.status().as_u16(), "Audit blob fetch rejected, skipping");
            return Vec::new();
        }
        match response.json::<Vec<Value>>().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(uri = %blob.content_uri, error = %e, "Audit blob decode failed, skipping");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl EventSource for AuditLogClient {
    fn source_type(&self) -> SourceType {
        SourceType::AuditLog
    }

    async fn fetch_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Value>, SourceError> {
        let token = self.tokens.token_for(tenant_id, MANAGEMENT_SCOPE).await?;

        let mut events = Vec::new();
        for content_type in CONTENT_TYPES {
            self.ensure_subscription(tenant_id, &token.secret, content_type)
                .await?;
            let blobs = self
                .list_content(tenant_id, &token.secret, content_type, since, now)
                .await?;
            for blob in &blobs {
                events.extend(self.fetch_blob(&token.secret, blob).await);
            }
        }

        // Blobs overlap the window boundaries; keep records inside [since, now).
        events.retain(|event| match creation_time(event) {
            Some(t) => t >= since && t < now,
            None => true,
        });

        tracing::debug!(tenant_id, count = events.len(), "Audit events fetched");
        Ok(events)
    }
}

fn creation_time(event: &Value) -> Option<DateTime<Utc>> {
    let raw = event.get("CreationTime")?.as_str()?;
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    // The audit feed usually omits the timezone suffix; values are UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
