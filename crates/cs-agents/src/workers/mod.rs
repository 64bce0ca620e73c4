//! Risk workers
//!
//! Each worker reads one family of signals from the customer store and
//! returns the alerts it finds. Workers do not publish; the scheduler
//! applies the cooldown and publishes what remains.

mod churn;
mod engagement;
mod health;
mod onboarding;
mod renewal;
mod support;
mod usage;

pub use churn::{churn_score, ChurnRiskDetector};
pub use engagement::EngagementMonitor;
pub use health::HealthScoreMonitor;
pub use onboarding::OnboardingTracker;
pub use renewal::RenewalTracker;
pub use support::SupportEscalationMonitor;
pub use usage::UsageAdoptionMonitor;

use crate::config::AgentConfig;
use crate::error::WorkerResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cs_customers::{Alert, CustomerStore};
use std::sync::Arc;
use std::time::Duration;

/// What a worker gets to look at.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Customer store
    pub store: Arc<CustomerStore>,
    /// Thresholds
    pub config: Arc<AgentConfig>,
    /// Evaluation time
    pub now: DateTime<Utc>,
}

/// A periodic risk check.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Unique worker name.
    fn name(&self) -> &'static str;

    /// How often the worker should run.
    fn interval(&self) -> Duration;

    /// Evaluate the signals and return alerts.
    async fn run(&self, ctx: &WorkerContext) -> WorkerResult<Vec<Alert>>;
}

/// The seven standard workers, all on the configured interval.
pub fn default_workers(config: &AgentConfig) -> Vec<Arc<dyn Worker>> {
    let interval = config.worker_interval;
    vec![
        Arc::new(HealthScoreMonitor::new(interval)),
        Arc::new(ChurnRiskDetector::new(interval)),
        Arc::new(RenewalTracker::new(interval)),
        Arc::new(EngagementMonitor::new(interval)),
        Arc::new(SupportEscalationMonitor::new(interval)),
        Arc::new(OnboardingTracker::new(interval)),
        Arc::new(UsageAdoptionMonitor::new(interval)),
    ]
}
