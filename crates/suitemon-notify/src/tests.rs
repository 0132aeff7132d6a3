use crate::{card, eligible_alerts};
use chrono::{TimeZone, Utc};
use suitemon_common::types::{Alert, Severity, SourceType};

fn alert(tenant: &str, rule: &str, severity: Severity, should_notify: bool) -> Alert {
    Alert {
        time_generated: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        time_processed: Utc.with_ymd_and_hms(2024, 6, 1, 12, 5, 0).unwrap(),
        tenant_id: format!("{tenant}-id"),
        tenant_name: tenant.to_string(),
        user: "alice@contoso.example".to_string(),
        rule_name: rule.to_string(),
        severity,
        description: format!("{rule} fired"),
        source: SourceType::SignIn,
        event_id: "evt-1".to_string(),
        raw_event: "user=alice app=Outlook".to_string(),
        should_notify,
    }
}

#[test]
fn eligibility_respects_minimum_severity_inclusively() {
    let alerts = vec![
        alert("Contoso", "low-rule", Severity::Low, true),
        alert("Contoso", "medium-rule", Severity::Medium, true),
        alert("Contoso", "high-rule", Severity::High, true),
    ];

    let eligible = eligible_alerts(&alerts, Severity::Medium);
    let names: Vec<_> = eligible.iter().map(|a| a.rule_name.as_str()).collect();
    assert_eq!(names, vec!["medium-rule", "high-rule"]);
}

#[test]
fn eligibility_drops_throttled_alerts() {
    let alerts = vec![
        alert("Contoso", "rule", Severity::High, false),
        alert("Contoso", "rule", Severity::Critical, true),
    ];

    let eligible = eligible_alerts(&alerts, Severity::Low);
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].severity, Severity::Critical);
}

#[test]
fn grouping_preserves_tenant_and_alert_order() {
    let alerts = vec![
        alert("Contoso", "a", Severity::High, true),
        alert("Fabrikam", "b", Severity::Low, true),
        alert("Contoso", "c", Severity::Medium, true),
    ];
    let refs: Vec<&Alert> = alerts.iter().collect();

    let groups = card::group_by_tenant(&refs);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].0, "Contoso");
    assert_eq!(groups[0].1.len(), 2);
    assert_eq!(groups[0].1[1].rule_name, "c");
    assert_eq!(groups[1].0, "Fabrikam");
}

#[test]
fn card_has_one_section_per_tenant() {
    let alerts = vec![
        alert("Contoso", "a", Severity::High, true),
        alert("Fabrikam", "b", Severity::Low, true),
    ];
    let refs: Vec<&Alert> = alerts.iter().collect();
    let groups = card::group_by_tenant(&refs);

    let payload = card::render_card(&groups);
    assert_eq!(payload["@type"], "MessageCard");
    assert_eq!(payload["title"], "2 new security alerts");

    let sections = payload["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0]["activityTitle"], "Contoso");
    let text = sections[0]["text"].as_str().unwrap();
    assert!(text.contains("[high] a"));
    assert!(text.contains("user: alice@contoso.example"));
    assert!(text.contains("source: sign_in"));
}

#[test]
fn card_theme_color_follows_highest_severity() {
    let alerts = vec![
        alert("Contoso", "a", Severity::Low, true),
        alert("Contoso", "b", Severity::Critical, true),
    ];
    let refs: Vec<&Alert> = alerts.iter().collect();
    let payload = card::render_card(&card::group_by_tenant(&refs));
    assert_eq!(payload["themeColor"], "8b0000");
}

#[test]
fn card_omits_user_when_empty() {
    let mut a = alert("Contoso", "sec", Severity::High, true);
    a.user = String::new();
    let alerts = vec![a];
    let refs: Vec<&Alert> = alerts.iter().collect();
    let payload = card::render_card(&card::group_by_tenant(&refs));
    let text = payload["sections"][0]["text"].as_str().unwrap();
    assert!(!text.contains("user:"));
}
