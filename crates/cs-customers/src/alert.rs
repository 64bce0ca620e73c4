//! Risk alerts raised by the autonomous workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of risk an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Health score dropped below the threshold
    LowHealth,
    /// Combined churn signals crossed the threshold
    ChurnRisk,
    /// Renewal is close and the account is not healthy
    RenewalRisk,
    /// No engagement for too long
    Disengaged,
    /// Too many open support tickets
    SupportEscalation,
    /// Onboarding is not progressing
    StalledOnboarding,
    /// Product usage is low
    LowUsage,
}

impl AlertKind {
    /// Every kind.
    pub const ALL: [AlertKind; 7] = [
        AlertKind::LowHealth,
        AlertKind::ChurnRisk,
        AlertKind::RenewalRisk,
        AlertKind::Disengaged,
        AlertKind::SupportEscalation,
        AlertKind::StalledOnboarding,
        AlertKind::LowUsage,
    ];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LowHealth => "low_health",
            AlertKind::ChurnRisk => "churn_risk",
            AlertKind::RenewalRisk => "renewal_risk",
            AlertKind::Disengaged => "disengaged",
            AlertKind::SupportEscalation => "support_escalation",
            AlertKind::StalledOnboarding => "stalled_onboarding",
            AlertKind::LowUsage => "low_usage",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational
    Low,
    /// Worth a look this week
    Medium,
    /// Act soon
    High,
    /// Act now
    Critical,
}

impl Severity {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// A risk alert about one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier
    pub id: Uuid,

    /// Customer the alert is about
    pub customer_id: Uuid,

    /// Risk kind
    pub kind: AlertKind,

    /// Severity
    pub severity: Severity,

    /// Human-readable summary
    pub message: String,

    /// Signal values that triggered the alert
    pub details: serde_json::Value,

    /// When the worker detected the condition
    pub detected_at: DateTime<Utc>,

    /// When someone acknowledged it
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Create an unacknowledged alert detected now.
    pub fn new(
        customer_id: Uuid,
        kind: AlertKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            customer_id,
            kind,
            severity,
            message: message.into(),
            details: serde_json::Value::Object(Default::default()),
            detected_at: Utc::now(),
            acknowledged_at: None,
        }
    }

    /// Attach signal values.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Routing topic, `alert.{kind}.{severity}`.
    pub fn topic(&self) -> String {
        format!("alert.{}.{}", self.kind.as_str(), self.severity.as_str())
    }

    /// Whether someone has acknowledged the alert.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}

/// Filters for listing alerts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertQuery {
    /// Only alerts for this customer
    #[serde(default)]
    pub customer_id: Option<Uuid>,

    /// Only this kind
    #[serde(default)]
    pub kind: Option<AlertKind>,

    /// Only this severity or worse
    #[serde(default)]
    pub min_severity: Option<Severity>,

    /// Skip acknowledged alerts
    #[serde(default)]
    pub unacknowledged_only: bool,

    /// Page size (default 50, max 500)
    #[serde(default)]
    pub limit: Option<u32>,
}

impl AlertQuery {
    /// Page size after defaults and clamping.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }
}
