//! # CS Integrations
//!
//! Authenticated clients for the SaaS vendors a customer success team works
//! with: billing, support desks, CRMs, product analytics, communication and
//! survey tools.
//!
//! ## Overview
//!
//! Vendors are not individual client types. Each is a [`VendorProfile`] in
//! the [`Vendor`] catalog (base URL, auth style, pagination scheme) and every
//! request goes through one of two generic clients:
//!
//! - [`BaseIntegration`]: static credentials (bearer, API key header, basic,
//!   query parameter)
//! - [`OAuth2Integration`]: access tokens from the vendor's token endpoint,
//!   refreshed ahead of expiry and once more on a 401
//!
//! Both share the same request pipeline:
//!
//! 1. [`CircuitBreaker`] admission (open circuits fail fast)
//! 2. [`RateLimiter`] budget (local window plus vendor headers)
//! 3. Send, classify the response, record the outcome
//! 4. Exponential backoff via [`retry::with_retry_policy`]
//!
//! ## Configuration
//!
//! [`IntegrationRegistry::from_env`] builds a client for every vendor with
//! credentials in the environment (`{VENDOR}_API_KEY`,
//! `{VENDOR}_CLIENT_ID`/`{VENDOR}_CLIENT_SECRET`, `{VENDOR}_BASE_URL`, ...).
//! Shared tuning comes from [`IntegrationDefaults`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cs_integrations::{Integration, IntegrationRegistry};
//!
//! # async fn example() -> cs_integrations::IntegrationResult<()> {
//! let registry = IntegrationRegistry::from_env();
//! if let Some(stripe) = registry.get("stripe") {
//!     let customers = stripe.get("/customers", &[]).await?;
//!     println!("{}", customers);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod base;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod integration;
pub mod oauth;
pub mod pagination;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod vendors;

pub use base::BaseIntegration;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitSnapshot, CircuitState,
};
pub use config::{ConfigError, Credentials, IntegrationConfig, IntegrationDefaults, OAuth2Settings};
pub use error::{IntegrationError, IntegrationResult};
pub use integration::{AuthKind, Integration, IntegrationStatus, RequestStatsSnapshot};
pub use oauth::{AccessToken, OAuth2Integration, TokenResponse};
pub use pagination::{FetchedPages, Pagination, Paginator};
pub use rate_limit::{RateLimitConfig, RateLimiter, RateLimitSnapshot, MAX_VENDOR_DELAY};
pub use registry::{build_integration, IntegrationRegistry, RegisteredIntegration};
pub use retry::{with_retry, with_retry_if, with_retry_policy, RetryConfig};
pub use vendors::{AuthStyle, Vendor, VendorCategory, VendorProfile};

pub use reqwest::Method;
