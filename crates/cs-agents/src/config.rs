//! Scheduler and worker thresholds

use serde::Serialize;
use std::time::Duration;

/// Thresholds and timings for the autonomous workers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    /// How often the scheduler looks for due workers
    #[serde(with = "secs")]
    pub tick: Duration,

    /// Minimum gap between two alerts of one kind for one customer
    #[serde(with = "secs")]
    pub alert_cooldown: Duration,

    /// How often each worker runs
    #[serde(with = "secs")]
    pub worker_interval: Duration,

    /// Health score below which a customer is flagged
    pub health_threshold: u8,

    /// Health score below which the alert is critical
    pub critical_health_threshold: u8,

    /// Days ahead to look for renewals
    pub renewal_window_days: i64,

    /// Renewals closer than this are urgent
    pub renewal_urgent_days: i64,

    /// Renewing customers below this health score are at risk
    pub renewal_health_threshold: u8,

    /// Days without engagement before a customer counts as disengaged
    pub inactivity_days: i64,

    /// Open tickets that trigger an escalation
    pub ticket_escalation_threshold: u32,

    /// Usage score below which adoption is flagged
    pub usage_threshold: u8,

    /// Churn score (0.0-1.0) that triggers a churn alert
    pub churn_risk_threshold: f64,

    /// Onboarding progress below which onboarding is stalled
    pub onboarding_progress_threshold: u8,

    /// Days a customer may spend onboarding before progress is checked
    pub onboarding_grace_days: i64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            alert_cooldown: Duration::from_secs(24 * 60 * 60),
            worker_interval: Duration::from_secs(60 * 60),
            health_threshold: 40,
            critical_health_threshold: 20,
            renewal_window_days: 90,
            renewal_urgent_days: 30,
            renewal_health_threshold: 70,
            inactivity_days: 30,
            ticket_escalation_threshold: 5,
            usage_threshold: 30,
            churn_risk_threshold: 0.6,
            onboarding_progress_threshold: 50,
            onboarding_grace_days: 30,
        }
    }
}

impl AgentConfig {
    /// Load from environment variables.
    ///
    /// Environment variables:
    /// - `SCHEDULER_TICK_SECS` (default: 60)
    /// - `ALERT_COOLDOWN_SECS` (default: 86400)
    /// - `WORKER_INTERVAL_SECS` (default: 3600)
    /// - `HEALTH_ALERT_THRESHOLD` (default: 40)
    /// - `RENEWAL_WINDOW_DAYS` (default: 90)
    /// - `INACTIVITY_DAYS` (default: 30)
    /// - `TICKET_ESCALATION_THRESHOLD` (default: 5)
    /// - `USAGE_ALERT_THRESHOLD` (default: 30)
    /// - `CHURN_RISK_THRESHOLD` (default: 0.6)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let churn_risk_threshold: f64 =
            parse_or(&lookup, "CHURN_RISK_THRESHOLD", default.churn_risk_threshold);

        Self {
            tick: Duration::from_secs(
                parse_or(&lookup, "SCHEDULER_TICK_SECS", default.tick.as_secs()).max(1),
            ),
            alert_cooldown: Duration::from_secs(parse_or(
                &lookup,
                "ALERT_COOLDOWN_SECS",
                default.alert_cooldown.as_secs(),
            )),
            worker_interval: Duration::from_secs(
                parse_or(&lookup, "WORKER_INTERVAL_SECS", default.worker_interval.as_secs()).max(1),
            ),
            health_threshold: parse_or(&lookup, "HEALTH_ALERT_THRESHOLD", default.health_threshold),
            renewal_window_days: parse_or(&lookup, "RENEWAL_WINDOW_DAYS", default.renewal_window_days),
            inactivity_days: parse_or(&lookup, "INACTIVITY_DAYS", default.inactivity_days),
            ticket_escalation_threshold: parse_or(
                &lookup,
                "TICKET_ESCALATION_THRESHOLD",
                default.ticket_escalation_threshold,
            ),
            usage_threshold: parse_or(&lookup, "USAGE_ALERT_THRESHOLD", default.usage_threshold),
            churn_risk_threshold: if (0.0..=1.0).contains(&churn_risk_threshold) {
                churn_risk_threshold
            } else {
                default.churn_risk_threshold
            },
            ..default
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

mod secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}
