use super::{Worker, WorkerContext};
use crate::error::WorkerResult;
use async_trait::async_trait;
use cs_customers::{Alert, AlertKind, Severity};
use serde_json::json;
use std::time::Duration;

/// Flags unhealthy customers with a renewal coming up.
#[derive(Debug, Clone)]
pub struct RenewalTracker {
    interval: Duration,
}

impl RenewalTracker {
    /// Create a tracker running every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Worker for RenewalTracker {
    fn name(&self) -> &'static str {
        "renewal_tracker"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &WorkerContext) -> WorkerResult<Vec<Alert>> {
        let config = &ctx.config;
        let today = ctx.now.date_naive();
        let horizon = today + chrono::Duration::days(config.renewal_window_days);

        let renewing = ctx.store.renewing_between(today, horizon).await?;

        Ok(renewing
            .into_iter()
            .filter(|customer| customer.health_score < config.renewal_health_threshold)
            .filter_map(|customer| {
                let days = customer.days_until_renewal(today)?;
                let severity = if days <= config.renewal_urgent_days {
                    Severity::High
                } else {
                    Severity::Medium
                };
                Some(
                    Alert::new(
                        customer.id,
                        AlertKind::RenewalRisk,
                        severity,
                        format!(
                            "{} renews in {} days with health score {}",
                            customer.name, days, customer.health_score
                        ),
                    )
                    .with_details(json!({
                        "days_until_renewal": days,
                        "renewal_date": customer.renewal_date,
                        "health_score": customer.health_score,
                        "arr": customer.arr,
                    })),
                )
            })
            .collect())
    }
}
