//! Upstream log-source clients.
//!
//! Each client implements [`EventSource`]: fetch the events a tenant produced
//! in a half-open `[since, now)` window, paginating internally. Authentication
//! failures propagate as classified [`SourceError`] values so the orchestrator
//! can record a per-tenant status; content-retrieval failures inside an
//! otherwise authenticated tenant degrade to partial or empty result lists
//! with a logged warning.

pub mod audit;
pub mod auth;
pub mod security_alert;
pub mod signin;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use suitemon_common::types::{SourceType, TenantStatus};

/// Default deadline for any single upstream HTTP call.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("application consent missing in tenant {tenant_id}: {detail}")]
    AppNotConsented { tenant_id: String, detail: String },

    #[error("tenant {tenant_id} not found: {detail}")]
    TenantNotFound { tenant_id: String, detail: String },

    #[error("permission denied: {detail}")]
    PermissionDenied { detail: String },

    #[error("audit logging is not enabled for tenant {tenant_id}")]
    AuditLogDisabled { tenant_id: String },

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream API error: status={status}, body={body}")]
    Api { status: u16, body: String },
}

impl SourceError {
    /// Maps the error to the tenant status the orchestrator records.
    pub fn tenant_status(&self) -> TenantStatus {
        match self {
            SourceError::AppNotConsented { .. } => TenantStatus::AppNotConsented,
            SourceError::TenantNotFound { .. } => TenantStatus::TenantNotFound,
            SourceError::PermissionDenied { .. } => TenantStatus::PermissionDenied,
            SourceError::AuditLogDisabled { .. } => TenantStatus::AuditLogDisabled,
            SourceError::Http(_) | SourceError::Api { .. } => TenantStatus::Error,
        }
    }
}

/// One upstream feed, time-bounded and paginated internally.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Fetches events produced in `[since, now)` for the tenant.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`] for authentication-class
    /// failures; transient content errors are logged and absorbed into a
    /// shorter (possibly empty) result list.
    async fn fetch_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Value>, SourceError>;
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

#[derive(serde::Deserialize)]
pub(crate) struct EventPage {
    #[serde(default)]
    pub value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Follows `@odata.nextLink` continuations until the feed is exhausted.
///
/// 401/403 on any page propagates as [`SourceError::PermissionDenied`];
/// other failures keep whatever pages already arrived and log a warning.
pub(crate) async fn fetch_pages(
    http: &reqwest::Client,
    bearer: &str,
    first_url: String,
    source: SourceType,
) -> Result<Vec<Value>, SourceError> {
    let mut events = Vec::new();
    let mut url = Some(first_url);

    while let Some(current) = url.take() {
        let response = match http.get(&current).bearer_auth(bearer).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%source, error = %e, "Upstream page fetch failed, returning partial results");
                return Ok(events);
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::PermissionDenied {
                detail: format!("{source} fetch returned {status}: {body}"),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%source, status = status.as_u16(), body = %body, "Upstream page fetch rejected, returning partial results");
            return Ok(events);
        }

        match response.json::<EventPage>().await {
            Ok(page) => {
                events.extend(page.value);
                url = page.next_link;
            }
            Err(e) => {
                tracing::warn!(%source, error = %e, "Upstream page decode failed, returning partial results");
                return Ok(events);
            }
        }
    }

    Ok(events)
}
