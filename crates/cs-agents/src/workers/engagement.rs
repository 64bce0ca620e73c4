use super::{Worker, WorkerContext};
use crate::error::WorkerResult;
use async_trait::async_trait;
use cs_customers::{Alert, AlertKind, Severity};
use serde_json::json;
use std::time::Duration;

/// Flags customers nobody has talked to in a while.
#[derive(Debug, Clone)]
pub struct EngagementMonitor {
    interval: Duration,
}

impl EngagementMonitor {
    /// Create a monitor running every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Worker for EngagementMonitor {
    fn name(&self) -> &'static str {
        "engagement_monitor"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &WorkerContext) -> WorkerResult<Vec<Alert>> {
        let window = ctx.config.inactivity_days;
        let cutoff = ctx.now - chrono::Duration::days(window);

        Ok(ctx
            .store
            .inactive_since(cutoff)
            .await?
            .into_iter()
            .map(|customer| {
                let days = customer.days_since_engagement(ctx.now);
                let severity = if days >= 2 * window {
                    Severity::High
                } else {
                    Severity::Medium
                };
                Alert::new(
                    customer.id,
                    AlertKind::Disengaged,
                    severity,
                    format!("No engagement with {} for {} days", customer.name, days),
                )
                .with_details(json!({
                    "days_since_engagement": days,
                    "last_engagement_at": customer.last_engagement_at,
                    "threshold_days": window,
                }))
            })
            .collect())
    }
}
