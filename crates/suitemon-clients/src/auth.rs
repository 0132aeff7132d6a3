use crate::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Scope requested for the directory/graph-style APIs (sign-ins, security
/// alerts).
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Scope requested for the audit-activity management API.
pub const MANAGEMENT_SCOPE: &str = "https://manage.office.com/.default";

/// A bearer token with its expiry instant.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Usable when the expiry is still comfortably in the future.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::minutes(5) > now
    }
}

/// Issues bearer tokens for a (tenant, scope) pair.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token_for(&self, tenant_id: &str, scope: &str) -> Result<AccessToken, SourceError>;
}

/// How the application proves its identity to the token endpoint.
#[derive(Debug, Clone)]
pub enum ClientAuth {
    Secret(String),
    /// Workload-identity federation: the assertion token is read fresh from
    /// this file on every token request (the platform rotates it).
    FederatedAssertion { token_file: PathBuf },
}

/// OAuth2 client-credentials flow against a per-tenant token endpoint.
pub struct ClientCredentials {
    http: reqwest::Client,
    authority: String,
    client_id: String,
    auth: ClientAuth,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl ClientCredentials {
    pub fn new(authority: impl Into<String>, client_id: impl Into<String>, auth: ClientAuth) -> Self {
        Self {
            http: crate::http_client(),
            authority: authority.into(),
            client_id: client_id.into(),
            auth,
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn token_for(&self, tenant_id: &str, scope: &str) -> Result<AccessToken, SourceError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            tenant_id
        );

        let mut form = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), self.client_id.clone()),
            ("scope".to_string(), scope.to_string()),
        ];
        match &self.auth {
            ClientAuth::Secret(secret) => {
                form.push(("client_secret".to_string(), secret.clone()));
            }
            ClientAuth::FederatedAssertion { token_file } => {
                let assertion = std::fs::read_to_string(token_file).map_err(|e| {
                    SourceError::Api {
                        status: 0,
                        body: format!("failed to read federation assertion: {e}"),
                    }
                })?;
                form.push((
                    "client_assertion_type".to_string(),
                    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
                ));
                form.push(("client_assertion".to_string(), assertion.trim().to_string()));
            }
        }

        let response = self.http.post(&url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_error(tenant_id, status.as_u16(), &body));
        }

        let token: TokenResponse = response.json().await?;
        Ok(AccessToken {
            secret: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

/// Maps a token-endpoint rejection to the engine's error taxonomy.
pub(crate) fn classify_token_error(tenant_id: &str, status: u16, body: &str) -> SourceError {
    let lower = body.to_lowercase();
    let detail = truncate(body, 200);

    if lower.contains("consent")
        || (lower.contains("principal") && lower.contains("not found"))
        || lower.contains("application with identifier")
    {
        return SourceError::AppNotConsented {
            tenant_id: tenant_id.to_string(),
            detail,
        };
    }
    if lower.contains("tenant") && (lower.contains("not found") || lower.contains("does not exist"))
    {
        return SourceError::TenantNotFound {
            tenant_id: tenant_id.to_string(),
            detail,
        };
    }
    if status == 403 {
        return SourceError::PermissionDenied { detail };
    }
    SourceError::Api { status, body: detail }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Caches one credential per (tenant, scope) pair so that the three fetches
/// of a tenant's run share a token instead of each hitting the token
/// endpoint.
pub struct CredentialCache {
    inner: Arc<dyn TokenProvider>,
    cache: Mutex<HashMap<(String, String), AccessToken>>,
}

impl CredentialCache {
    pub fn new(inner: Arc<dyn TokenProvider>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TokenProvider for CredentialCache {
    async fn token_for(&self, tenant_id: &str, scope: &str) -> Result<AccessToken, SourceError> {
        let key = (tenant_id.to_string(), scope.to_string());
        let now = Utc::now();
        {
            let cache = self
                .cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(token) = cache.get(&key) {
                if token.is_fresh(now) {
                    return Ok(token.clone());
                }
            }
        }

        let token = self.inner.token_for(tenant_id, scope).await?;
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.insert(key, token.clone());
        Ok(token)
    }
}
