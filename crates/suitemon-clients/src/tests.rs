use crate::auth::{classify_token_error, AccessToken, CredentialCache, TokenProvider};
use crate::SourceError;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use suitemon_common::types::TenantStatus;

#[test]
fn token_error_consent_required_classifies_as_app_not_consented() {
    let err = classify_token_error(
        "t1",
        401,
        "AADSTS65001: The user or administrator has not consented to use the application",
    );
    assert!(matches!(err, SourceError::AppNotConsented { .. }));
    assert_eq!(err.tenant_status(), TenantStatus::AppNotConsented);
}

#[test]
fn token_error_missing_principal_classifies_as_app_not_consented() {
    let err = classify_token_error(
        "t1",
        400,
        "AADSTS700016: Service principal named suitemon was not found in the directory",
    );
    assert!(matches!(err, SourceError::AppNotConsented { .. }));
}

#[test]
fn token_error_unknown_tenant_classifies_as_tenant_not_found() {
    let err = classify_token_error("t1", 400, "AADSTS90002: Tenant 'contoso' not found");
    assert!(matches!(err, SourceError::TenantNotFound { .. }));
    assert_eq!(err.tenant_status(), TenantStatus::TenantNotFound);
}

#[test]
fn token_error_forbidden_classifies_as_permission_denied() {
    let err = classify_token_error("t1", 403, "insufficient privileges");
    assert!(matches!(err, SourceError::PermissionDenied { .. }));
    assert_eq!(err.tenant_status(), TenantStatus::PermissionDenied);
}

#[test]
fn token_error_other_is_generic_api_error() {
    let err = classify_token_error("t1", 500, "internal server error");
    assert!(matches!(err, SourceError::Api { status: 500, .. }));
    assert_eq!(err.tenant_status(), TenantStatus::Error);
}

#[test]
fn audit_log_disabled_maps_to_its_own_status() {
    let err = SourceError::AuditLogDisabled {
        tenant_id: "t1".into(),
    };
    assert_eq!(err.tenant_status(), TenantStatus::AuditLogDisabled);
}

#[test]
fn access_token_freshness_applies_expiry_slack() {
    let now = Utc::now();
    let fresh = AccessToken {
        secret: "s".into(),
        expires_at: now + Duration::minutes(30),
    };
    assert!(fresh.is_fresh(now));

    // Inside the 5-minute slack the token is considered stale.
    let nearly_expired = AccessToken {
        secret: "s".into(),
        expires_at: now + Duration::minutes(4),
    };
    assert!(!nearly_expired.is_fresh(now));
}

struct CountingProvider {
    calls: AtomicUsize,
    ttl: chrono::Duration,
}

#[async_trait]
impl TokenProvider for CountingProvider {
    async fn token_for(&self, _tenant_id: &str, _scope: &str) -> Result<AccessToken, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken {
            secret: format!("token-{}", self.calls.load(Ordering::SeqCst)),
            expires_at: Utc::now() + self.ttl,
        })
    }
}

#[tokio::test]
async fn credential_cache_reuses_fresh_tokens() {
    let provider = Arc::new(CountingProvider {
        calls: AtomicUsize::new(0),
        ttl: Duration::hours(1),
    });
    let cache = CredentialCache::new(provider.clone());

    let first = cache.token_for("t1", "scope-a").await.unwrap();
    let second = cache.token_for("t1", "scope-a").await.unwrap();
    assert_eq!(first.secret, second.secret);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    // Different tenant or scope is a different cache slot.
    cache.token_for("t2", "scope-a").await.unwrap();
    cache.token_for("t1", "scope-b").await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn credential_cache_refreshes_expired_tokens() {
    let provider = Arc::new(CountingProvider {
        calls: AtomicUsize::new(0),
        // Already inside the freshness slack when issued.
        ttl: Duration::minutes(1),
    });
    let cache = CredentialCache::new(provider.clone());

    cache.token_for("t1", "scope-a").await.unwrap();
    cache.token_for("t1", "scope-a").await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}
