use super::{Worker, WorkerContext};
use crate::error::WorkerResult;
use async_trait::async_trait;
use cs_customers::{Alert, AlertKind, Severity};
use serde_json::json;
use std::time::Duration;

/// Flags onboarding customers that stopped making progress.
#[derive(Debug, Clone)]
pub struct OnboardingTracker {
    interval: Duration,
}

impl OnboardingTracker {
    /// Create a tracker running every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Worker for OnboardingTracker {
    fn name(&self) -> &'static str {
        "onboarding_tracker"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &WorkerContext) -> WorkerResult<Vec<Alert>> {
        let config = &ctx.config;
        let grace = config.onboarding_grace_days;
        let created_before = ctx.now - chrono::Duration::days(grace);

        Ok(ctx
            .store
            .stalled_onboarding(config.onboarding_progress_threshold, created_before)
            .await?
            .into_iter()
            .map(|customer| {
                let age = (ctx.now - customer.created_at).num_days();
                let severity = if age >= 2 * grace {
                    Severity::High
                } else {
                    Severity::Medium
                };
                Alert::new(
                    customer.id,
                    AlertKind::StalledOnboarding,
                    severity,
                    format!(
                        "{} is {}% through onboarding after {} days",
                        customer.name, customer.onboarding_progress, age
                    ),
                )
                .with_details(json!({
                    "onboarding_progress": customer.onboarding_progress,
                    "days_onboarding": age,
                    "threshold": config.onboarding_progress_threshold,
                }))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::testing::{context, seed};
    use cs_customers::{Customer, LifecycleStage, NewCustomer};

    async fn insert_aged(ctx: &WorkerContext, name: &str, progress: u8, days: i64, stage: LifecycleStage) -> Customer {
        let mut customer = Customer::from_new(NewCustomer {
            onboarding_progress: progress,
            stage,
            ..NewCustomer::new(name)
        });
        customer.created_at = ctx.now - chrono::Duration::days(days);
        ctx.store.insert(&customer).await.unwrap();
        customer
    }

    #[tokio::test]
    async fn test_flags_stalled_onboarding() {
        let ctx = context().await;
        let stuck = insert_aged(&ctx, "Stuck", 10, 75, LifecycleStage::Onboarding).await;
        let slow = insert_aged(&ctx, "Slow", 40, 35, LifecycleStage::Onboarding).await;
        insert_aged(&ctx, "Nearly", 80, 75, LifecycleStage::Onboarding).await;
        insert_aged(&ctx, "Adopted", 10, 75, LifecycleStage::Adoption).await;
        seed(&ctx, NewCustomer::new("Just Signed")).await;

        let alerts = OnboardingTracker::new(Duration::from_secs(60)).run(&ctx).await.unwrap();

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].customer_id, stuck.id);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[1].customer_id, slow.id);
        assert_eq!(alerts[1].severity, Severity::Medium);
    }
}
