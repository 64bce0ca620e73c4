//! Registry of configured integrations.

use crate::base::BaseIntegration;
use crate::config::{IntegrationConfig, IntegrationDefaults};
use crate::error::IntegrationResult;
use crate::integration::{Integration, IntegrationStatus};
use crate::oauth::OAuth2Integration;
use crate::pagination::Paginator;
use crate::vendors::Vendor;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A registered integration and how to page it.
#[derive(Clone)]
pub struct RegisteredIntegration {
    /// Vendor, when the integration came from the catalog.
    pub vendor: Option<Vendor>,

    /// Client.
    pub client: Arc<dyn Integration>,

    /// Paginator for list endpoints.
    pub paginator: Paginator,
}

impl std::fmt::Debug for RegisteredIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredIntegration")
            .field("name", &self.client.name())
            .field("vendor", &self.vendor)
            .field("paginator", &self.paginator)
            .finish()
    }
}

/// Build the right client for a configuration.
pub fn build_integration(config: IntegrationConfig) -> IntegrationResult<Arc<dyn Integration>> {
    if config.oauth2.is_some() {
        Ok(Arc::new(OAuth2Integration::new(config)?))
    } else {
        Ok(Arc::new(BaseIntegration::new(config)?))
    }
}

/// Integrations by name.
#[derive(Debug, Clone, Default)]
pub struct IntegrationRegistry {
    integrations: BTreeMap<String, RegisteredIntegration>,
}

impl IntegrationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every vendor that has credentials in the process environment.
    pub fn from_env() -> Self {
        let defaults = IntegrationDefaults::from_env();
        Self::from_lookup(|key| std::env::var(key).ok(), &defaults)
    }

    /// Build every vendor that has credentials in `lookup`.
    ///
    /// Misconfigured vendors are logged and skipped.
    pub fn from_lookup<F>(lookup: F, defaults: &IntegrationDefaults) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::new();

        for vendor in Vendor::ALL {
            let config = match vendor.config_from_lookup(&lookup, defaults) {
                None => continue,
                Some(Ok(config)) => config,
                Some(Err(e)) => {
                    warn!(vendor = %vendor, error = %e, "Skipping misconfigured integration");
                    continue;
                }
            };

            match build_integration(config) {
                Ok(client) => registry.register_vendor(*vendor, client),
                Err(e) => warn!(vendor = %vendor, error = %e, "Failed to build integration"),
            }
        }

        info!(count = registry.len(), "Integrations configured");
        registry
    }

    /// Register a catalog vendor.
    pub fn register_vendor(&mut self, vendor: Vendor, client: Arc<dyn Integration>) {
        self.register(client, Some(vendor), vendor.paginator());
    }

    /// Register any integration.
    pub fn register(&mut self, client: Arc<dyn Integration>, vendor: Option<Vendor>, paginator: Paginator) {
        let name = client.name().to_string();
        self.integrations.insert(
            name,
            RegisteredIntegration {
                vendor,
                client,
                paginator,
            },
        );
    }

    /// Look up a client by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(name).map(|entry| entry.client.clone())
    }

    /// Look up a full registration by name.
    pub fn entry(&self, name: &str) -> Option<&RegisteredIntegration> {
        self.integrations.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.integrations.keys().cloned().collect()
    }

    /// Status of every registered integration.
    pub fn statuses(&self) -> Vec<IntegrationStatus> {
        self.integrations
            .values()
            .map(|entry| entry.client.status())
            .collect()
    }

    /// Number of registered integrations.
    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::AuthKind;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup_builds_configured_vendors() {
        let env: HashMap<&str, &str> = [
            ("STRIPE_API_KEY", "sk_test"),
            ("HUBSPOT_CLIENT_ID", "id"),
            ("HUBSPOT_CLIENT_SECRET", "secret"),
            // Missing base URL, skipped
            ("ZENDESK_USERNAME", "agent@acme.test/token"),
            ("ZENDESK_PASSWORD", "pw"),
        ]
        .into_iter()
        .collect();

        let registry = IntegrationRegistry::from_lookup(
            |k| env.get(k).map(|v| v.to_string()),
            &IntegrationDefaults::default(),
        );

        assert_eq!(registry.names(), vec!["hubspot", "stripe"]);
        assert!(registry.get("zendesk").is_none());

        let hubspot = registry.get("hubspot").unwrap();
        assert_eq!(hubspot.status().auth, AuthKind::OAuth2);
        assert_eq!(registry.entry("stripe").unwrap().vendor, Some(Vendor::Stripe));
    }
}
