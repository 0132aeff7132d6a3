use crate::processor::AlertProcessor;
use crate::window::{poll_window, DEFAULT_LOOKBACK_MINUTES, MAX_LOOKBACK_MINUTES};
use crate::{extract, window};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use suitemon_common::types::{Severity, SourceType, Tenant, TenantStatus};
use suitemon_rules::{Condition, ConditionOperator, ConditionSet, MatchMode, Rule};
use suitemon_storage::state_store::{
    AlertStateStore, DedupEntry, MemoryStateStore, NotificationEntry,
};

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
}

fn tenant(id: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        name: format!("{id}-name"),
        last_poll: None,
        status: TenantStatus::Unknown,
        status_message: None,
    }
}

fn rule(name: &str, severity: Severity) -> Rule {
    Rule {
        id: format!("test/{name}"),
        name: name.to_string(),
        description: format!("{name} fired"),
        severity,
        enabled: true,
        source: SourceType::AuditLog,
        conditions: ConditionSet {
            mode: MatchMode::All,
            rules: vec![Condition {
                field: "Operation".to_string(),
                operator: ConditionOperator::Exists,
                value: None,
            }],
        },
        exceptions: Vec::new(),
        tenant_ids: Vec::new(),
        author: None,
        tags: Vec::new(),
    }
}

fn audit_event(user: &str, time: DateTime<Utc>) -> serde_json::Value {
    json!({
        "Id": "evt-1",
        "CreationTime": time.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "Operation": "Add member to role",
        "UserId": user,
        "Workload": "AzureActiveDirectory",
    })
}

// ---- window selection ----

#[test]
fn window_uses_default_lookback_without_watermark() {
    let now = at(12, 0, 0);
    let (since, until) = poll_window(None, now);
    assert_eq!(since, now - Duration::minutes(DEFAULT_LOOKBACK_MINUTES));
    assert_eq!(until, now);
}

#[test]
fn window_resumes_from_recent_watermark() {
    let now = at(12, 0, 0);
    let last_poll = at(11, 30, 0);
    let (since, until) = poll_window(Some(last_poll), now);
    assert_eq!(since, last_poll);
    assert_eq!(until, now);
}

#[test]
fn window_clamps_stale_watermark_to_max_lookback() {
    let now = at(12, 0, 0);
    // Tenant offline for two days.
    let last_poll = now - Duration::days(2);
    let (since, _) = poll_window(Some(last_poll), now);
    assert_eq!(since, now - Duration::minutes(MAX_LOOKBACK_MINUTES));
}

#[test]
fn window_since_never_precedes_the_floor() {
    let now = at(12, 0, 0);
    for last_poll in [
        Some(now - Duration::days(30)),
        Some(now - Duration::minutes(MAX_LOOKBACK_MINUTES)),
        Some(now - Duration::minutes(1)),
        None,
    ] {
        let (since, _) = poll_window(last_poll, now);
        assert!(since >= now - Duration::minutes(window::MAX_LOOKBACK_MINUTES));
    }
}

// ---- extraction ----

#[test]
fn acting_user_per_source() {
    let signin = json!({"userPrincipalName": "alice@contoso.example"});
    assert_eq!(
        extract::acting_user(SourceType::SignIn, &signin),
        "alice@contoso.example"
    );

    let audit = json!({"UserId": "bob@contoso.example"});
    assert_eq!(
        extract::acting_user(SourceType::AuditLog, &audit),
        "bob@contoso.example"
    );

    let sec = json!({"title": "Suspicious activity"});
    assert_eq!(extract::acting_user(SourceType::SecurityAlert, &sec), "");
}

#[test]
fn event_time_parses_both_timestamp_shapes() {
    let fallback = at(9, 0, 0);

    let signin = json!({"createdDateTime": "2024-06-01T12:00:00Z"});
    assert_eq!(
        extract::event_time(SourceType::SignIn, &signin, fallback),
        at(12, 0, 0)
    );

    // Audit feed omits the timezone suffix.
    let audit = json!({"CreationTime": "2024-06-01T13:30:00"});
    assert_eq!(
        extract::event_time(SourceType::AuditLog, &audit, fallback),
        at(13, 30, 0)
    );

    let missing = json!({});
    assert_eq!(
        extract::event_time(SourceType::SignIn, &missing, fallback),
        fallback
    );
}

#[test]
fn event_id_per_source() {
    let audit = json!({"Id": "audit-1"});
    assert_eq!(extract::event_id(SourceType::AuditLog, &audit), "audit-1");

    let signin = json!({"id": "signin-1"});
    assert_eq!(extract::event_id(SourceType::SignIn, &signin), "signin-1");
}

#[test]
fn raw_summary_is_concise_and_bounded() {
    let signin = json!({
        "userPrincipalName": "alice@contoso.example",
        "appDisplayName": "Outlook",
        "ipAddress": "203.0.113.7",
        "location": {"city": "Oslo", "countryOrRegion": "NO"},
        "riskLevelDuringSignIn": "high",
    });
    let summary = extract::raw_summary(SourceType::SignIn, &signin);
    assert!(summary.contains("user=alice@contoso.example"));
    assert!(summary.contains("risk=high"));
    assert!(summary.contains("city=Oslo"));

    let huge = json!({"Operation": "x".repeat(2000), "UserId": "u"});
    let summary = extract::raw_summary(SourceType::AuditLog, &huge);
    assert!(summary.chars().count() <= extract::RAW_SUMMARY_MAX_CHARS);
}

// ---- dedup layer (S3) ----

#[tokio::test]
async fn dedup_suppresses_within_window_and_admits_after() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state.clone());
    let t = tenant("t1");
    let r = rule("role-added", Severity::High);
    let now = at(12, 10, 0);

    let first = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 0, 0)), now)
        .await;
    assert!(first.is_some());

    // 4m59s after the recorded event: suppressed.
    let second = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 4, 59)), now)
        .await;
    assert!(second.is_none());

    // 5m01s after the recorded event: admitted again.
    let third = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 5, 1)), now)
        .await;
    assert!(third.is_some());
}

#[tokio::test]
async fn dedup_boundary_is_strict() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state);
    let t = tenant("t1");
    let r = rule("role-added", Severity::High);
    let now = at(12, 10, 0);

    processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 0, 0)), now)
        .await
        .unwrap();

    // Exactly five minutes apart is not a duplicate.
    let admitted = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 5, 0)), now)
        .await;
    assert!(admitted.is_some());
}

#[tokio::test]
async fn dedup_is_symmetric_for_out_of_order_events() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state);
    let t = tenant("t1");
    let r = rule("role-added", Severity::High);
    let now = at(12, 10, 0);

    processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 4, 0)), now)
        .await
        .unwrap();

    // An earlier event arriving late lands inside the same window.
    let late = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 0, 30)), now)
        .await;
    assert!(late.is_none());
}

#[tokio::test]
async fn dedup_keys_are_scoped_by_user_and_tenant() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state);
    let r = rule("role-added", Severity::High);
    let now = at(12, 10, 0);
    let time = at(12, 0, 0);

    assert!(processor
        .process(&tenant("t1"), &r, SourceType::AuditLog, &audit_event("u@x", time), now)
        .await
        .is_some());
    // Different user, same rule and tenant: separate slot.
    assert!(processor
        .process(&tenant("t1"), &r, SourceType::AuditLog, &audit_event("v@x", time), now)
        .await
        .is_some());
    // Same user, different tenant: separate slot.
    assert!(processor
        .process(&tenant("t2"), &r, SourceType::AuditLog, &audit_event("u@x", time), now)
        .await
        .is_some());
}

// ---- notification layer (S4) ----

#[tokio::test]
async fn throttle_mutes_repeat_notifications_within_window() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state);
    let t = tenant("t1");
    let r = rule("role-added", Severity::High);

    let first = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(10, 0, 0)), at(10, 0, 0))
        .await
        .unwrap();
    assert!(first.should_notify);

    // Thirty minutes later: event admitted by dedup, muted by throttle.
    let second = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(10, 30, 0)), at(10, 30, 0))
        .await
        .unwrap();
    assert!(!second.should_notify);
}

#[tokio::test]
async fn throttle_boundary_is_strict() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state);
    let t = tenant("t1");
    let r = rule("role-added", Severity::High);

    processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(10, 0, 0)), at(10, 0, 0))
        .await
        .unwrap();

    // Exactly sixty minutes since the last notification: not throttled.
    let next = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(11, 0, 0)), at(11, 0, 0))
        .await
        .unwrap();
    assert!(next.should_notify);
}

#[tokio::test]
async fn critical_severity_bypasses_throttle() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state.clone());
    let t = tenant("t1");
    let r = rule("breach", Severity::Critical);

    let first = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(10, 0, 0)), at(10, 0, 0))
        .await
        .unwrap();
    let second = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(10, 30, 0)), at(10, 30, 0))
        .await
        .unwrap();
    assert!(first.should_notify);
    assert!(second.should_notify);

    // The notification record is refreshed on every critical alert.
    let key = suitemon_storage::state_store::state_row_key(&r.name, "u@x");
    let entry = state.get_notification("t1", &key).await.unwrap().unwrap();
    assert_eq!(entry.last_notified, at(10, 30, 0));
    assert_eq!(entry.alert_count, 2);
}

#[tokio::test]
async fn throttle_does_not_refresh_window_while_muted() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state.clone());
    let t = tenant("t1");
    let r = rule("role-added", Severity::High);

    processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(10, 0, 0)), at(10, 0, 0))
        .await
        .unwrap();
    let muted = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(10, 54, 0)), at(10, 54, 0))
        .await
        .unwrap();
    assert!(!muted.should_notify);

    // The window is measured from the first notification, so 10:00 + 60m
    // re-opens it even though a muted alert arrived at 10:54.
    let reopened = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(11, 0, 30)), at(11, 0, 30))
        .await
        .unwrap();
    assert!(reopened.should_notify);
}

// ---- failure policy ----

struct FailingStateStore;

#[async_trait]
impl AlertStateStore for FailingStateStore {
    async fn get_dedup(&self, _: &str, _: &str) -> Result<Option<DedupEntry>> {
        anyhow::bail!("state store unavailable")
    }
    async fn put_dedup(&self, _: &str, _: &str, _: &DedupEntry) -> Result<()> {
        anyhow::bail!("state store unavailable")
    }
    async fn get_notification(&self, _: &str, _: &str) -> Result<Option<NotificationEntry>> {
        anyhow::bail!("state store unavailable")
    }
    async fn put_notification(&self, _: &str, _: &str, _: &NotificationEntry) -> Result<()> {
        anyhow::bail!("state store unavailable")
    }
    async fn sweep_expired(&self, _: DateTime<Utc>) -> Result<u64> {
        anyhow::bail!("state store unavailable")
    }
}

#[tokio::test]
async fn state_store_failure_never_drops_the_alert() {
    let processor = AlertProcessor::new(Arc::new(FailingStateStore));
    let t = tenant("t1");
    let r = rule("role-added", Severity::High);

    let alert = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 0, 0)), at(12, 0, 0))
        .await;

    // Reads degrade to "entry absent", writes are logged: at-least-once wins.
    let alert = alert.unwrap();
    assert!(alert.should_notify);
    assert_eq!(alert.rule_name, "role-added");
}

#[tokio::test]
async fn emitted_alert_carries_event_fields() {
    let state = Arc::new(MemoryStateStore::default());
    let processor = AlertProcessor::new(state);
    let t = tenant("t1");
    let r = rule("role-added", Severity::High);
    let now = at(12, 10, 0);

    let alert = processor
        .process(&t, &r, SourceType::AuditLog, &audit_event("u@x", at(12, 0, 0)), now)
        .await
        .unwrap();

    assert_eq!(alert.time_generated, at(12, 0, 0));
    assert_eq!(alert.time_processed, now);
    assert_eq!(alert.tenant_id, "t1");
    assert_eq!(alert.tenant_name, "t1-name");
    assert_eq!(alert.user, "u@x");
    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.source, SourceType::AuditLog);
    assert_eq!(alert.event_id, "evt-1");
    assert!(alert.raw_event.contains("op=Add member to role"));
}
