use super::{Worker, WorkerContext};
use crate::error::WorkerResult;
use async_trait::async_trait;
use cs_customers::{Alert, AlertKind, Severity};
use serde_json::json;
use std::time::Duration;

/// Usage score below which the alert is raised to high.
const VERY_LOW_USAGE: u8 = 10;

/// Flags customers with low product usage.
#[derive(Debug, Clone)]
pub struct UsageAdoptionMonitor {
    interval: Duration,
}

impl UsageAdoptionMonitor {
    /// Create a monitor running every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Worker for UsageAdoptionMonitor {
    fn name(&self) -> &'static str {
        "usage_adoption_monitor"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &WorkerContext) -> WorkerResult<Vec<Alert>> {
        let threshold = ctx.config.usage_threshold;

        Ok(ctx
            .store
            .low_usage(threshold)
            .await?
            .into_iter()
            .map(|customer| {
                let severity = if customer.usage_score < VERY_LOW_USAGE {
                    Severity::High
                } else {
                    Severity::Medium
                };
                Alert::new(
                    customer.id,
                    AlertKind::LowUsage,
                    severity,
                    format!("{} usage score is {}", customer.name, customer.usage_score),
                )
                .with_details(json!({
                    "usage_score": customer.usage_score,
                    "threshold": threshold,
                }))
            })
            .collect())
    }
}
