//! Health checks for the server and its dependencies.
//!
//! - **Liveness**: is the process running?
//! - **Readiness**: can the database answer, and is every integration's
//!   circuit closed?
//! - **Full report**: database ping plus a live `test_connection` against
//!   every registered integration, with latency.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cs_customers::CustomerStore;
//! use cs_integrations::IntegrationRegistry;
//! use cs_mcp::health::{HealthCheckConfig, HealthChecker};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(CustomerStore::in_memory().await?);
//! let registry = Arc::new(IntegrationRegistry::from_env());
//! let checker = HealthChecker::new(store, registry, HealthCheckConfig::default());
//!
//! let report = checker.check_all().await;
//! for service in &report.services {
//!     println!("{}: {:?} ({}ms)", service.name, service.status, service.latency_ms);
//! }
//! # Ok(())
//! # }
//! ```

use cs_customers::CustomerStore;
use cs_integrations::{CircuitState, Integration, IntegrationRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Name used for the database entry in reports.
pub const DATABASE_SERVICE: &str = "database";

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything healthy.
    Healthy,
    /// Some integrations slow or unreachable, core functional.
    Degraded,
    /// The database is unreachable.
    Unhealthy,
}

/// Individual service health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Service is healthy.
    Up,
    /// Service is degraded (slow responses).
    Degraded,
    /// Service is down.
    Down,
}

/// Health check result for a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Dependency name (`database` or the integration name).
    pub name: String,

    /// Dependency status.
    pub status: ServiceStatus,

    /// Check latency in milliseconds.
    pub latency_ms: u64,

    /// Error message if unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,

    /// Timestamp of the check (RFC 3339).
    pub timestamp: String,

    /// Individual dependency health.
    pub services: Vec<ServiceHealth>,

    /// Total check duration in milliseconds.
    pub check_duration_ms: u64,

    /// Server version.
    pub version: String,

    /// Summary message.
    pub message: String,
}

/// Liveness check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResult {
    /// Is the service alive?
    pub alive: bool,

    /// Timestamp.
    pub timestamp: String,

    /// Uptime in seconds.
    pub uptime_secs: u64,
}

/// Readiness check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResult {
    /// Is the service ready?
    pub ready: bool,

    /// Timestamp.
    pub timestamp: String,

    /// Reason if not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Whether the database answered.
    pub database: bool,

    /// Integrations whose circuit is open.
    pub open_circuits: Vec<String>,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Timeout for individual health checks.
    pub check_timeout: Duration,

    /// Latency threshold for degraded status (ms).
    pub degraded_threshold_ms: u64,

    /// Whether to run integration checks in parallel.
    pub parallel_checks: bool,

    /// Include detailed error messages.
    pub include_details: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(5),
            degraded_threshold_ms: 1000,
            parallel_checks: true,
            include_details: true,
        }
    }
}

/// Health checker for the store and the vendor integrations.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    store: Arc<CustomerStore>,
    registry: Arc<IntegrationRegistry>,
    config: HealthCheckConfig,

    /// Start time for uptime calculation.
    start_time: Instant,
}

impl HealthChecker {
    /// Create a new health checker.
    pub fn new(
        store: Arc<CustomerStore>,
        registry: Arc<IntegrationRegistry>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            start_time: Instant::now(),
        }
    }

    /// Quick liveness check.
    pub fn check_liveness(&self) -> LivenessResult {
        LivenessResult {
            alive: true,
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Readiness check: database ping and no open circuits.
    ///
    /// Circuits are read from local state; no vendor is called.
    #[instrument(skip(self))]
    pub async fn check_readiness(&self) -> ReadinessResult {
        debug!("Performing readiness check");

        let database = match tokio::time::timeout(self.config.check_timeout, self.store.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "Database ping failed");
                false
            }
            Err(_) => false,
        };

        let open_circuits: Vec<String> = self
            .registry
            .statuses()
            .into_iter()
            .filter(|s| s.circuit.state == CircuitState::Open)
            .map(|s| s.name)
            .collect();

        let mut reasons = Vec::new();
        if !database {
            reasons.push("database unavailable".to_string());
        }
        if !open_circuits.is_empty() {
            reasons.push(format!("circuits open: {}", open_circuits.join(", ")));
        }

        ReadinessResult {
            ready: reasons.is_empty(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            reason: (!reasons.is_empty()).then(|| reasons.join("; ")),
            database,
            open_circuits,
        }
    }

    /// Full health check of the database and every integration.
    #[instrument(skip(self))]
    pub async fn check_all(&self) -> HealthReport {
        info!(integrations = self.registry.len(), "Performing full health check");
        let start = Instant::now();

        let mut services = vec![self.check_database().await];
        services.extend(self.check_integrations().await);

        let status = Self::aggregate_status(&services);
        let duration = start.elapsed();

        let message = match status {
            HealthStatus::Healthy => "All services operational".to_string(),
            HealthStatus::Degraded => {
                let degraded: Vec<_> = services
                    .iter()
                    .filter(|s| s.status != ServiceStatus::Up)
                    .map(|s| s.name.as_str())
                    .collect();
                format!("Degraded services: {}", degraded.join(", "))
            }
            HealthStatus::Unhealthy => "Database unavailable".to_string(),
        };

        info!(
            status = ?status,
            duration_ms = duration.as_millis() as u64,
            "Health check complete"
        );

        HealthReport {
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            services,
            check_duration_ms: duration.as_millis() as u64,
            version: env!("CARGO_PKG_VERSION").to_string(),
            message,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.config.check_timeout, self.store.ping()).await;
        let latency = start.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "timed out after {}ms",
                self.config.check_timeout.as_millis()
            )),
        };

        if let Some(ref message) = error {
            error!(error = %message, "Database health check failed");
        }

        self.service_health(DATABASE_SERVICE, latency, error)
    }

    async fn check_integrations(&self) -> Vec<ServiceHealth> {
        let clients: Vec<Arc<dyn Integration>> = self
            .registry
            .names()
            .iter()
            .filter_map(|name| self.registry.get(name))
            .collect();

        let mut results = Vec::with_capacity(clients.len());

        if self.config.parallel_checks {
            let mut set = JoinSet::new();
            for client in clients {
                let checker = self.clone();
                set.spawn(async move { checker.check_integration(client).await });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(health) => results.push(health),
                    Err(e) => warn!(error = %e, "Integration health check task failed"),
                }
            }
            results.sort_by(|a, b| a.name.cmp(&b.name));
        } else {
            for client in clients {
                results.push(self.check_integration(client).await);
            }
        }

        results
    }

    #[instrument(skip(self, client), fields(integration = client.name()))]
    async fn check_integration(&self, client: Arc<dyn Integration>) -> ServiceHealth {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.config.check_timeout, client.test_connection()).await;
        let latency = start.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "timed out after {}ms",
                self.config.check_timeout.as_millis()
            )),
        };

        if let Some(ref message) = error {
            warn!(error = %message, "Integration health check failed");
        }

        self.service_health(client.name(), latency, error)
    }

    fn service_health(&self, name: &str, latency_ms: u64, error: Option<String>) -> ServiceHealth {
        let status = match error {
            Some(_) => ServiceStatus::Down,
            None if latency_ms > self.config.degraded_threshold_ms => {
                warn!(
                    service = name,
                    latency_ms,
                    "Service response time exceeds threshold"
                );
                ServiceStatus::Degraded
            }
            None => ServiceStatus::Up,
        };

        ServiceHealth {
            name: name.to_string(),
            status,
            latency_ms,
            error: error.map(|e| {
                if self.config.include_details {
                    e
                } else {
                    "Check failed".to_string()
                }
            }),
        }
    }

    /// Aggregate individual statuses: a down database is unhealthy, any
    /// other problem is degraded.
    pub fn aggregate_status(services: &[ServiceHealth]) -> HealthStatus {
        let database_down = services
            .iter()
            .any(|s| s.name == DATABASE_SERVICE && s.status == ServiceStatus::Down);

        if database_down {
            HealthStatus::Unhealthy
        } else if services.iter().any(|s| s.status != ServiceStatus::Up) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
