use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use suitemon_common::types::SourceType;
use suitemon_rules::{accessor, operator};

/// Upper bound on the raw-event summary carried on an alert.
pub const RAW_SUMMARY_MAX_CHARS: usize = 500;

/// The identity that performed the event, used as part of the alert-state
/// key. Security alerts carry no single acting user; the empty string is a
/// valid key of its own.
pub fn acting_user(source: SourceType, event: &Value) -> String {
    let path = match source {
        SourceType::SignIn => "userPrincipalName",
        SourceType::AuditLog => "UserId",
        SourceType::SecurityAlert => return String::new(),
    };
    field(event, path).unwrap_or_default()
}

/// The source event timestamp. Events without a parseable timestamp fall
/// back to the engine's processing time so dedup still has a usable anchor.
pub fn event_time(source: SourceType, event: &Value, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let path = match source {
        SourceType::SignIn | SourceType::SecurityAlert => "createdDateTime",
        SourceType::AuditLog => "CreationTime",
    };
    field(event, path)
        .and_then(|raw| parse_timestamp(&raw))
        .unwrap_or(fallback)
}

pub fn event_id(source: SourceType, event: &Value) -> String {
    let path = match source {
        SourceType::AuditLog => "Id",
        SourceType::SignIn | SourceType::SecurityAlert => "id",
    };
    field(event, path).unwrap_or_default()
}

/// A concise single-line summary of the event's most salient fields. Never
/// the whole payload.
pub fn raw_summary(source: SourceType, event: &Value) -> String {
    let summary = match source {
        SourceType::SignIn => join_fields(
            event,
            &[
                ("user", "userPrincipalName"),
                ("app", "appDisplayName"),
                ("ip", "ipAddress"),
                ("city", "location.city"),
                ("country", "location.countryOrRegion"),
                ("risk", "riskLevelDuringSignIn"),
                ("client", "clientAppUsed"),
            ],
        ),
        SourceType::SecurityAlert => join_fields(
            event,
            &[
                ("title", "title"),
                ("category", "category"),
                ("severity", "severity"),
                ("incident", "incidentId"),
                ("url", "alertWebUrl"),
            ],
        ),
        SourceType::AuditLog => join_fields(
            event,
            &[
                ("op", "Operation"),
                ("user", "UserId"),
                ("workload", "Workload"),
                ("ip", "ClientIP"),
                ("result", "ResultStatus"),
            ],
        ),
    };
    truncate_chars(&summary, RAW_SUMMARY_MAX_CHARS)
}

fn field(event: &Value, path: &str) -> Option<String> {
    accessor::lookup(event, path)
        .filter(|v| !v.is_null())
        .map(operator::stringify)
}

fn join_fields(event: &Value, specs: &[(&str, &str)]) -> String {
    specs
        .iter()
        .filter_map(|(label, path)| field(event, path).map(|value| format!("{label}={value}")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
