use super::{Worker, WorkerContext};
use crate::config::AgentConfig;
use crate::error::WorkerResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cs_customers::{Alert, AlertKind, Customer, Severity};
use serde_json::json;
use std::time::Duration;

const HEALTH_WEIGHT: f64 = 0.4;
const NPS_WEIGHT: f64 = 0.2;
const ENGAGEMENT_WEIGHT: f64 = 0.25;
const TICKET_WEIGHT: f64 = 0.15;

/// Weighted churn score in `0.0..=1.0`.
///
/// Health, NPS, engagement recency and open tickets each map onto a
/// 0-1 risk. Engagement saturates at twice the inactivity window and
/// tickets at twice the escalation threshold. A missing NPS counts as
/// neutral (0.5).
pub fn churn_score(customer: &Customer, config: &AgentConfig, now: DateTime<Utc>) -> f64 {
    let health_risk = f64::from(100 - customer.health_score.min(100)) / 100.0;

    let nps_risk = customer
        .nps_score
        .map(|nps| f64::from(100 - nps.clamp(-100, 100)) / 200.0)
        .unwrap_or(0.5);

    let inactive_days = customer.days_since_engagement(now).max(0) as f64;
    let engagement_risk = (inactive_days / (2 * config.inactivity_days.max(1)) as f64).min(1.0);

    let ticket_risk = (f64::from(customer.open_tickets)
        / f64::from(2 * config.ticket_escalation_threshold.max(1)))
    .min(1.0);

    HEALTH_WEIGHT * health_risk
        + NPS_WEIGHT * nps_risk
        + ENGAGEMENT_WEIGHT * engagement_risk
        + TICKET_WEIGHT * ticket_risk
}

/// Combines several signals into one churn score.
#[derive(Debug, Clone)]
pub struct ChurnRiskDetector {
    interval: Duration,
}

impl ChurnRiskDetector {
    /// Create a detector running every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Worker for ChurnRiskDetector {
    fn name(&self) -> &'static str {
        "churn_risk_detector"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &WorkerContext) -> WorkerResult<Vec<Alert>> {
        let threshold = ctx.config.churn_risk_threshold;
        let mut alerts = Vec::new();

        for customer in ctx.store.all_active().await? {
            let score = churn_score(&customer, &ctx.config, ctx.now);
            if score < threshold {
                continue;
            }

            let severity = if score >= 0.8 {
                Severity::Critical
            } else if score >= 0.7 {
                Severity::High
            } else {
                Severity::Medium
            };
            let rounded = (score * 100.0).round() / 100.0;

            alerts.push(
                Alert::new(
                    customer.id,
                    AlertKind::ChurnRisk,
                    severity,
                    format!("{} churn score is {:.2}", customer.name, rounded),
                )
                .with_details(json!({
                    "churn_score": rounded,
                    "threshold": threshold,
                    "health_score": customer.health_score,
                    "nps_score": customer.nps_score,
                    "days_since_engagement": customer.days_since_engagement(ctx.now),
                    "open_tickets": customer.open_tickets,
                })),
            );
        }

        Ok(alerts)
    }
}
