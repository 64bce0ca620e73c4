use super::{Worker, WorkerContext};
use crate::error::WorkerResult;
use async_trait::async_trait;
use cs_customers::{Alert, AlertKind, Severity};
use serde_json::json;
use std::time::Duration;

/// Flags customers with a pile of open support tickets.
#[derive(Debug, Clone)]
pub struct SupportEscalationMonitor {
    interval: Duration,
}

impl SupportEscalationMonitor {
    /// Create a monitor running every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Worker for SupportEscalationMonitor {
    fn name(&self) -> &'static str {
        "support_escalation_monitor"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &WorkerContext) -> WorkerResult<Vec<Alert>> {
        let threshold = ctx.config.ticket_escalation_threshold;

        Ok(ctx
            .store
            .with_open_tickets_at_least(threshold)
            .await?
            .into_iter()
            .map(|customer| {
                let severity = if customer.open_tickets >= threshold.saturating_mul(2) {
                    Severity::High
                } else {
                    Severity::Medium
                };
                Alert::new(
                    customer.id,
                    AlertKind::SupportEscalation,
                    severity,
                    format!("{} has {} open tickets", customer.name, customer.open_tickets),
                )
                .with_details(json!({
                    "open_tickets": customer.open_tickets,
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
    use cs_customers::NewCustomer;

    #[tokio::test]
    async fn test_flags_ticket_backlog() {
        let ctx = context().await;
        let flooded = seed(&ctx, NewCustomer { open_tickets: 12, ..NewCustomer::new("Flooded") }).await;
        let busy = seed(&ctx, NewCustomer { open_tickets: 5, ..NewCustomer::new("Busy") }).await;
        seed(&ctx, NewCustomer { open_tickets: 4, ..NewCustomer::new("Fine") }).await;

        let alerts = SupportEscalationMonitor::new(Duration::from_secs(60))
            .run(&ctx)
            .await
            .unwrap();

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].customer_id, flooded.id);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[1].customer_id, busy.id);
        assert_eq!(alerts[1].severity, Severity::Medium);
    }
}
