use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved tenant id used by the configuration store for placeholder rows.
/// Rows carrying this id are filtered out of the monitored tenant set.
pub const PLACEHOLDER_TENANT_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Which upstream feed an event came from. Selects the rules eligible for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    SignIn,
    SecurityAlert,
    AuditLog,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::SignIn => write!(f, "sign_in"),
            SourceType::SecurityAlert => write!(f, "security_alert"),
            SourceType::AuditLog => write!(f, "audit_log"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign_in" => Ok(SourceType::SignIn),
            "security_alert" => Ok(SourceType::SecurityAlert),
            "audit_log" => Ok(SourceType::AuditLog),
            _ => Err(format!("unknown source type: {s}")),
        }
    }
}

/// Terminal outcome of a tenant's most recent poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TenantStatus {
    Unknown,
    Success,
    AuditLogDisabled,
    AppNotConsented,
    PermissionDenied,
    TenantNotFound,
    Error,
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantStatus::Unknown => write!(f, "unknown"),
            TenantStatus::Success => write!(f, "success"),
            TenantStatus::AuditLogDisabled => write!(f, "auditLogDisabled"),
            TenantStatus::AppNotConsented => write!(f, "appNotConsented"),
            TenantStatus::PermissionDenied => write!(f, "permissionDenied"),
            TenantStatus::TenantNotFound => write!(f, "tenantNotFound"),
            TenantStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(TenantStatus::Unknown),
            "success" => Ok(TenantStatus::Success),
            "auditLogDisabled" => Ok(TenantStatus::AuditLogDisabled),
            "appNotConsented" => Ok(TenantStatus::AppNotConsented),
            "permissionDenied" => Ok(TenantStatus::PermissionDenied),
            "tenantNotFound" => Ok(TenantStatus::TenantNotFound),
            "error" => Ok(TenantStatus::Error),
            _ => Err(format!("unknown tenant status: {s}")),
        }
    }
}

/// A monitored customer directory.
///
/// `last_poll` is the upper bound of the last successfully processed window;
/// it is only advanced by the orchestrator on a successful run, so a failing
/// tenant retries the same window on the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub last_poll: Option<DateTime<Utc>>,
    pub status: TenantStatus,
    pub status_message: Option<String>,
}

/// An emitted detection. Immutable once produced; rows of this shape are
/// uploaded to the log-ingestion sink and rendered into notification cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Alert {
    /// Source event time.
    pub time_generated: DateTime<Utc>,
    /// Engine wall-clock at evaluation.
    pub time_processed: DateTime<Utc>,
    pub tenant_id: String,
    pub tenant_name: String,
    /// Acting user extracted per source; empty for sources without one.
    pub user: String,
    pub rule_name: String,
    pub severity: Severity,
    pub description: String,
    pub source: SourceType,
    pub event_id: String,
    /// Bounded single-line summary of the raw event, never the full payload.
    pub raw_event: String,
    /// Set by the notification throttle; the sink receives the alert either way.
    pub should_notify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "error" => Ok(RunStatus::Error),
            _ => Err(format!("unknown run status: {s}")),
        }
    }
}

/// Outcome of one scheduler tick, persisted newest-first in run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    /// Number of tenants attempted this run.
    pub clients_checked: u32,
    pub events_processed: u64,
    pub alerts_generated: u64,
    pub status: RunStatus,
    pub error_message: Option<String>,
}
