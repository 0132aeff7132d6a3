use serde_json::{json, Value};
use suitemon_common::types::{Alert, Severity};

/// Groups eligible alerts by tenant name, preserving first-seen tenant order
/// and in-tenant alert order.
pub fn group_by_tenant<'a>(alerts: &[&'a Alert]) -> Vec<(String, Vec<&'a Alert>)> {
    let mut groups: Vec<(String, Vec<&'a Alert>)> = Vec::new();
    for alert in alerts {
        match groups.iter_mut().find(|(name, _)| *name == alert.tenant_name) {
            Some((_, items)) => items.push(alert),
            None => groups.push((alert.tenant_name.clone(), vec![alert])),
        }
    }
    groups
}

/// Renders one MessageCard payload with a section per tenant.
pub fn render_card(groups: &[(String, Vec<&Alert>)]) -> Value {
    let total: usize = groups.iter().map(|(_, alerts)| alerts.len()).sum();
    let max_severity = groups
        .iter()
        .flat_map(|(_, alerts)| alerts.iter().map(|a| a.severity))
        .max()
        .unwrap_or(Severity::Low);

    let title = if total == 1 {
        "1 new security alert".to_string()
    } else {
        format!("{total} new security alerts")
    };

    let sections: Vec<Value> = groups
        .iter()
        .map(|(tenant_name, alerts)| {
            let text = alerts
                .iter()
                .map(|alert| alert_line(alert))
                .collect::<Vec<_>>()
                .join("\n\n");
            json!({
                "activityTitle": tenant_name,
                "activitySubtitle": format!("{} alert(s)", alerts.len()),
                "text": text,
            })
        })
        .collect();

    json!({
        "@type": "MessageCard",
        "@context": "http://schema.org/extensions",
        "themeColor": theme_color(max_severity),
        "summary": title,
        "title": title,
        "sections": sections,
    })
}

fn alert_line(alert: &Alert) -> String {
    let mut line = format!(
        "**[{}] {}**: {}",
        alert.severity, alert.rule_name, alert.description
    );
    if !alert.user.is_empty() {
        line.push_str(&format!("  \nuser: {}", alert.user));
    }
    line.push_str(&format!(
        "  \nsource: {} · {}",
        alert.source,
        alert.time_generated.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    line
}

fn theme_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "8b0000",
        Severity::High => "d93025",
        Severity::Medium => "f9a825",
        Severity::Low => "2e7d32",
    }
}
