use super::{Worker, WorkerContext};
use crate::error::WorkerResult;
use async_trait::async_trait;
use cs_customers::{Alert, AlertKind, Severity};
use serde_json::json;
use std::time::Duration;

/// Flags customers whose health score fell below the threshold.
#[derive(Debug, Clone)]
pub struct HealthScoreMonitor {
    interval: Duration,
}

impl HealthScoreMonitor {
    /// Create a monitor running every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Worker for HealthScoreMonitor {
    fn name(&self) -> &'static str {
        "health_score_monitor"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &WorkerContext) -> WorkerResult<Vec<Alert>> {
        let threshold = ctx.config.health_threshold;
        let customers = ctx.store.below_health(threshold).await?;

        Ok(customers
            .into_iter()
            .map(|customer| {
                let severity = if customer.health_score < ctx.config.critical_health_threshold {
                    Severity::Critical
                } else {
                    Severity::High
                };
                Alert::new(
                    customer.id,
                    AlertKind::LowHealth,
                    severity,
                    format!(
                        "{} health score is {} (threshold {})",
                        customer.name, customer.health_score, threshold
                    ),
                )
                .with_details(json!({
                    "health_score": customer.health_score,
                    "threshold": threshold,
                }))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::testing::{context, seed};
    use cs_customers::{LifecycleStage, NewCustomer};

    #[tokio::test]
    async fn test_flags_low_health() {
        let ctx = context().await;
        let critical = seed(&ctx, NewCustomer { health_score: 12, ..NewCustomer::new("Critical") }).await;
        let low = seed(&ctx, NewCustomer { health_score: 35, ..NewCustomer::new("Low") }).await;
        seed(&ctx, NewCustomer { health_score: 40, ..NewCustomer::new("Borderline") }).await;
        seed(
            &ctx,
            NewCustomer {
                health_score: 5,
                stage: LifecycleStage::Churned,
                ..NewCustomer::new("Gone")
            },
        )
        .await;

        let alerts = HealthScoreMonitor::new(Duration::from_secs(60)).run(&ctx).await.unwrap();

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].customer_id, critical.id);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[1].customer_id, low.id);
        assert_eq!(alerts[1].severity, Severity::High);
        assert_eq!(alerts[1].details["health_score"], 35);
    }
}
