//! # CS Agents
//!
//! Autonomous customer-risk monitoring: seven workers that read signals
//! from the customer store, an alert bus that routes what they find, and
//! the scheduler that runs them.
//!
//! ## Overview
//!
//! - **Workers** ([`workers`]): health score, churn risk, renewals,
//!   engagement, support load, onboarding and usage. Each returns alerts
//!   and never publishes itself.
//! - **Alert bus** ([`bus`]): topic-based publish/subscribe on
//!   `alert.{kind}.{severity}` with `*` and `#` wildcards.
//!   [`StoreAlertHandler`] persists alerts.
//! - **Scheduler** ([`AutonomousScheduler`]): a fixed-tick loop that
//!   launches due workers on their own tasks, never overlaps a worker with
//!   itself, and applies a per-(customer, kind) cooldown before publishing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cs_agents::{AgentConfig, AlertBus, AutonomousScheduler, MemoryAlertBus, StoreAlertHandler};
//! use cs_customers::CustomerStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(CustomerStore::in_memory().await?);
//! let bus = Arc::new(MemoryAlertBus::new());
//! bus.register_handler(Arc::new(StoreAlertHandler::new(store.clone()))).await?;
//!
//! let scheduler = AutonomousScheduler::new(store, bus, AgentConfig::from_env());
//! let cancel = CancellationToken::new();
//! let handle = scheduler.spawn(cancel.clone());
//!
//! // ... later
//! cancel.cancel();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod workers;

pub use bus::{
    topic_matches, AlertBus, AlertBusError, AlertBusResult, AlertBusStats, AlertHandler,
    MemoryAlertBus, StoreAlertHandler, Subscription,
};
pub use config::AgentConfig;
pub use error::{WorkerError, WorkerResult};
pub use scheduler::{AutonomousScheduler, LaunchedRun, WorkerRunReport, WorkerStatus};
pub use workers::{default_workers, Worker, WorkerContext};
