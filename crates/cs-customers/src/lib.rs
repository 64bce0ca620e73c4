//! # CS Customers
//!
//! Customer records and risk alerts for the customer success server,
//! persisted in SQLite through `sqlx`.
//!
//! ## Overview
//!
//! - [`Customer`]: account identity, commercial data and the signals the
//!   risk workers watch (health, NPS, engagement, tickets, usage,
//!   onboarding)
//! - [`Alert`]: a risk finding about one customer, routed on the topic
//!   `alert.{kind}.{severity}`
//! - [`CustomerStore`]: CRUD, filtered listing, the worker signal queries
//!   and alert persistence
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cs_customers::{CustomerQuery, CustomerStore, NewCustomer};
//!
//! # async fn example() -> cs_customers::StoreResult<()> {
//! let store = CustomerStore::connect("sqlite://customer_success.db?mode=rwc").await?;
//! let acme = store.create(NewCustomer::new("Acme Corp")).await?;
//!
//! let at_risk = store.below_health(40).await?;
//! let page = store.list(&CustomerQuery::default()).await?;
//! # let _ = (acme, at_risk, page);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alert;
pub mod customer;
pub mod error;
pub mod store;

pub use alert::{Alert, AlertKind, AlertQuery, Severity};
pub use customer::{
    Customer, CustomerQuery, CustomerTier, CustomerUpdate, LifecycleStage, NewCustomer,
};
pub use error::{StoreError, StoreResult};
pub use store::CustomerStore;
