//! Customer domain models
//!
//! A [`Customer`] is an account the customer success team manages. Beside
//! identity and commercial data it carries the signals the risk workers
//! watch: health score, NPS, engagement recency, open tickets, product usage
//! and onboarding progress.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Maximum length of a customer name.
pub const MAX_NAME_LEN: usize = 200;

/// Commercial tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerTier {
    /// Self-serve plans
    #[default]
    Starter,
    /// Small teams
    Growth,
    /// Mid-market
    Business,
    /// Enterprise contracts
    Enterprise,
}

impl CustomerTier {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerTier::Starter => "starter",
            CustomerTier::Growth => "growth",
            CustomerTier::Business => "business",
            CustomerTier::Enterprise => "enterprise",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "starter" => Some(CustomerTier::Starter),
            "growth" => Some(CustomerTier::Growth),
            "business" => Some(CustomerTier::Business),
            "enterprise" => Some(CustomerTier::Enterprise),
            _ => None,
        }
    }
}

/// Where the customer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// Getting set up
    #[default]
    Onboarding,
    /// Rolling out to users
    Adoption,
    /// Growing the account
    Expansion,
    /// Renewal in progress
    Renewal,
    /// Flagged as a churn risk
    AtRisk,
    /// Gone
    Churned,
}

impl LifecycleStage {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Onboarding => "onboarding",
            LifecycleStage::Adoption => "adoption",
            LifecycleStage::Expansion => "expansion",
            LifecycleStage::Renewal => "renewal",
            LifecycleStage::AtRisk => "at_risk",
            LifecycleStage::Churned => "churned",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "onboarding" => Some(LifecycleStage::Onboarding),
            "adoption" => Some(LifecycleStage::Adoption),
            "expansion" => Some(LifecycleStage::Expansion),
            "renewal" => Some(LifecycleStage::Renewal),
            "at_risk" => Some(LifecycleStage::AtRisk),
            "churned" => Some(LifecycleStage::Churned),
            _ => None,
        }
    }

    /// Whether the customer is still a live account.
    pub fn is_active(&self) -> bool {
        !matches!(self, LifecycleStage::Churned)
    }
}

/// A managed customer account.
///
/// # Examples
///
/// ```
/// use cs_customers::{Customer, NewCustomer};
///
/// let customer = Customer::from_new(NewCustomer::new("Acme Corp"));
/// assert_eq!(customer.name, "Acme Corp");
/// assert_eq!(customer.health_score, 70);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Unique identifier
    pub id: Uuid,

    /// Account name
    pub name: String,

    /// Primary web domain
    pub domain: Option<String>,

    /// Main point of contact
    pub contact_email: Option<String>,

    /// Commercial tier
    pub tier: CustomerTier,

    /// Lifecycle stage
    pub stage: LifecycleStage,

    /// Health score (0-100)
    pub health_score: u8,

    /// Annual recurring revenue
    pub arr: f64,

    /// Next contract renewal
    pub renewal_date: Option<NaiveDate>,

    /// Last meaningful touchpoint (call, meeting, reply)
    pub last_engagement_at: Option<DateTime<Utc>>,

    /// Latest NPS response (-100 to 100)
    pub nps_score: Option<i16>,

    /// Support tickets currently open
    pub open_tickets: u32,

    /// Product usage score (0-100)
    pub usage_score: u8,

    /// Onboarding completion percentage (0-100)
    pub onboarding_progress: u8,

    /// Free-form metadata
    pub metadata: serde_json::Value,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Build a new record from create input.
    pub fn from_new(input: NewCustomer) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: input.name.trim().to_string(),
            domain: input.domain,
            contact_email: input.contact_email,
            tier: input.tier,
            stage: input.stage,
            health_score: input.health_score,
            arr: input.arr,
            renewal_date: input.renewal_date,
            last_engagement_at: input.last_engagement_at,
            nps_score: input.nps_score,
            open_tickets: input.open_tickets,
            usage_score: input.usage_score,
            onboarding_progress: input.onboarding_progress,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: CustomerUpdate) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(domain) = update.domain {
            self.domain = domain;
        }
        if let Some(email) = update.contact_email {
            self.contact_email = email;
        }
        if let Some(tier) = update.tier {
            self.tier = tier;
        }
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        if let Some(score) = update.health_score {
            self.health_score = score;
        }
        if let Some(arr) = update.arr {
            self.arr = arr;
        }
        if let Some(date) = update.renewal_date {
            self.renewal_date = date;
        }
        if let Some(at) = update.last_engagement_at {
            self.last_engagement_at = at;
        }
        if let Some(nps) = update.nps_score {
            self.nps_score = nps;
        }
        if let Some(tickets) = update.open_tickets {
            self.open_tickets = tickets;
        }
        if let Some(usage) = update.usage_score {
            self.usage_score = usage;
        }
        if let Some(progress) = update.onboarding_progress {
            self.onboarding_progress = progress;
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        self.updated_at = Utc::now();
    }

    /// Check every field constraint.
    pub fn validate(&self) -> StoreResult<()> {
        let mut problems = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            problems.push("name must not be empty".to_string());
        } else if name.chars().count() > MAX_NAME_LEN {
            problems.push(format!("name must be at most {} characters", MAX_NAME_LEN));
        }
        if let Some(email) = &self.contact_email {
            if !is_valid_email(email) {
                problems.push(format!("'{}' is not a valid email address", email));
            }
        }
        check_score(&mut problems, "health_score", self.health_score);
        check_score(&mut problems, "usage_score", self.usage_score);
        check_score(&mut problems, "onboarding_progress", self.onboarding_progress);
        if let Some(nps) = self.nps_score {
            if !(-100..=100).contains(&nps) {
                problems.push("nps_score must be between -100 and 100".to_string());
            }
        }
        if !self.arr.is_finite() || self.arr < 0.0 {
            problems.push("arr must be a non-negative number".to_string());
        }
        if !self.metadata.is_object() {
            problems.push("metadata must be a JSON object".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(problems.join("; ")))
        }
    }

    /// Days until renewal (negative when overdue).
    pub fn days_until_renewal(&self, today: NaiveDate) -> Option<i64> {
        self.renewal_date.map(|date| (date - today).num_days())
    }

    /// Days since the last engagement, falling back to creation time.
    pub fn days_since_engagement(&self, now: DateTime<Utc>) -> i64 {
        let last = self.last_engagement_at.unwrap_or(self.created_at);
        (now - last).num_days()
    }
}

fn check_score(problems: &mut Vec<String>, field: &str, value: u8) {
    if value > 100 {
        problems.push(format!("{} must be between 0 and 100", field));
    }
}

/// Loose `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

fn default_health() -> u8 {
    70
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Input for creating a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCustomer {
    /// Account name
    pub name: String,

    /// Primary web domain
    #[serde(default)]
    pub domain: Option<String>,

    /// Main point of contact
    #[serde(default)]
    pub contact_email: Option<String>,

    /// Commercial tier
    #[serde(default)]
    pub tier: CustomerTier,

    /// Lifecycle stage
    #[serde(default)]
    pub stage: LifecycleStage,

    /// Health score (defaults to 70)
    #[serde(default = "default_health")]
    pub health_score: u8,

    /// Annual recurring revenue
    #[serde(default)]
    pub arr: f64,

    /// Next contract renewal
    #[serde(default)]
    pub renewal_date: Option<NaiveDate>,

    /// Last meaningful touchpoint
    #[serde(default)]
    pub last_engagement_at: Option<DateTime<Utc>>,

    /// Latest NPS response
    #[serde(default)]
    pub nps_score: Option<i16>,

    /// Open support tickets
    #[serde(default)]
    pub open_tickets: u32,

    /// Product usage score
    #[serde(default)]
    pub usage_score: u8,

    /// Onboarding completion percentage
    #[serde(default)]
    pub onboarding_progress: u8,

    /// Free-form metadata
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

impl NewCustomer {
    /// Minimal input with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: None,
            contact_email: None,
            tier: CustomerTier::default(),
            stage: LifecycleStage::default(),
            health_score: default_health(),
            arr: 0.0,
            renewal_date: None,
            last_engagement_at: None,
            nps_score: None,
            open_tickets: 0,
            usage_score: 0,
            onboarding_progress: 0,
            metadata: default_metadata(),
        }
    }
}

/// Partial update. `None` leaves a field unchanged; for nullable fields
/// `Some(None)` (JSON `null`) clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomerUpdate {
    /// Account name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Primary web domain
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub domain: Option<Option<String>>,

    /// Main point of contact
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<Option<String>>,

    /// Commercial tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<CustomerTier>,

    /// Lifecycle stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<LifecycleStage>,

    /// Health score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_score: Option<u8>,

    /// Annual recurring revenue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arr: Option<f64>,

    /// Next contract renewal
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<Option<NaiveDate>>,

    /// Last meaningful touchpoint
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub last_engagement_at: Option<Option<DateTime<Utc>>>,

    /// Latest NPS response
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub nps_score: Option<Option<i16>>,

    /// Open support tickets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_tickets: Option<u32>,

    /// Product usage score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_score: Option<u8>,

    /// Onboarding completion percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_progress: Option<u8>,

    /// Free-form metadata (replaces the stored object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl CustomerUpdate {
    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == CustomerUpdate::default()
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Filters for listing customers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerQuery {
    /// Only this tier
    #[serde(default)]
    pub tier: Option<CustomerTier>,

    /// Only this stage
    #[serde(default)]
    pub stage: Option<LifecycleStage>,

    /// Health score at least
    #[serde(default)]
    pub min_health: Option<u8>,

    /// Health score at most
    #[serde(default)]
    pub max_health: Option<u8>,

    /// Case-insensitive substring of the name
    #[serde(default)]
    pub search: Option<String>,

    /// Page size (default 50, max 500)
    #[serde(default)]
    pub limit: Option<u32>,

    /// Rows to skip
    #[serde(default)]
    pub offset: Option<u32>,
}

impl CustomerQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 50;

    /// Largest page size accepted.
    pub const MAX_LIMIT: u32 = 500;

    /// Page size after defaults and clamping.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}
