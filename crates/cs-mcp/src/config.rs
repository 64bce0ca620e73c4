//! Server configuration

use crate::health::HealthCheckConfig;
use crate::server::ToolContext;
use std::time::Duration;

/// Default SQLite database, created on first use.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://customer_success.db?mode=rwc";

/// Default server name announced in `initialize`.
pub const DEFAULT_SERVER_NAME: &str = "customer-success-mcp";

/// Configuration for the MCP server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server name reported to clients
    pub server_name: String,

    /// Permissions granted to the connected client
    pub permissions: Vec<String>,

    /// Whether the autonomous scheduler runs alongside the server
    pub scheduler_enabled: bool,

    /// Health check tuning
    pub health: HealthCheckConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            permissions: vec!["*".to_string()],
            scheduler_enabled: true,
            health: HealthCheckConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from environment variables.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` (default: `sqlite://customer_success.db?mode=rwc`)
    /// - `MCP_SERVER_NAME` (default: `customer-success-mcp`)
    /// - `MCP_PERMISSIONS` comma-separated (default: `*`)
    /// - `SCHEDULER_ENABLED` (default: true)
    /// - `HEALTH_CHECK_TIMEOUT_SECS` (default: 5)
    /// - `HEALTH_DEGRADED_THRESHOLD_MS` (default: 1000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let permissions = non_empty("MCP_PERMISSIONS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or(default.permissions);

        let scheduler_enabled = non_empty("SCHEDULER_ENABLED")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(default.scheduler_enabled);

        let health = HealthCheckConfig {
            check_timeout: non_empty("HEALTH_CHECK_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.health.check_timeout),
            degraded_threshold_ms: non_empty("HEALTH_DEGRADED_THRESHOLD_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.health.degraded_threshold_ms),
            ..default.health
        };

        Self {
            database_url: non_empty("DATABASE_URL").unwrap_or(default.database_url),
            server_name: non_empty("MCP_SERVER_NAME").unwrap_or(default.server_name),
            permissions,
            scheduler_enabled,
            health,
        }
    }

    /// Tool context carrying the configured permissions.
    pub fn tool_context(&self) -> ToolContext {
        ToolContext::with_permissions(self.permissions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(|_| None);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.server_name, DEFAULT_SERVER_NAME);
        assert_eq!(config.permissions, vec!["*"]);
        assert!(config.scheduler_enabled);
        assert_eq!(config.health.check_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("MCP_PERMISSIONS", " customers:read, alerts:* ,"),
            ("SCHEDULER_ENABLED", "false"),
            ("HEALTH_CHECK_TIMEOUT_SECS", "2"),
            ("HEALTH_DEGRADED_THRESHOLD_MS", "250"),
        ]));

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.permissions, vec!["customers:read", "alerts:*"]);
        assert!(!config.scheduler_enabled);
        assert_eq!(config.health.check_timeout, Duration::from_secs(2));
        assert_eq!(config.health.degraded_threshold_ms, 250);

        let ctx = config.tool_context();
        assert!(ctx.has_permission("alerts:write"));
        assert!(!ctx.has_permission("customers:write"));
    }

    #[test]
    fn test_blank_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[("MCP_SERVER_NAME", "  "), ("MCP_PERMISSIONS", "")]));
        assert_eq!(config.server_name, DEFAULT_SERVER_NAME);
        assert_eq!(config.permissions, vec!["*"]);
    }
}
