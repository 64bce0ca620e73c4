//! Catalog of supported vendor APIs.
//!
//! Each vendor is described by a [`VendorProfile`]: its default base URL,
//! authentication style, pagination scheme and environment variable prefix.
//! A profile plus the environment is enough to build an
//! [`IntegrationConfig`]; there is no vendor-specific client code.

use crate::config::{ConfigError, Credentials, IntegrationConfig, IntegrationDefaults, OAuth2Settings};
use crate::pagination::{Pagination, Paginator};
use crate::rate_limit::RateLimitConfig;
use serde::{Deserialize, Serialize};

/// How a vendor expects to be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthStyle {
    /// `{P}_API_KEY` as a bearer token.
    Bearer,

    /// `{P}_API_KEY` in a named header.
    ApiKeyHeader {
        /// Header name.
        header: &'static str,
    },

    /// `{P}_API_KEY` as the basic-auth username with a fixed password.
    BasicKeyAsUser {
        /// Password sent alongside the key.
        password: &'static str,
    },

    /// `{P}_API_KEY` as the basic-auth password with a fixed username.
    BasicKeyAsPassword {
        /// Username sent alongside the key.
        username: &'static str,
    },

    /// `{P}_USERNAME` and `{P}_PASSWORD`.
    BasicUserPassword,

    /// `{P}_API_KEY` as a query parameter.
    QueryParam {
        /// Parameter name.
        name: &'static str,
    },

    /// OAuth2 with `{P}_CLIENT_ID`, `{P}_CLIENT_SECRET` and optionally
    /// `{P}_REFRESH_TOKEN`. A static `{P}_ACCESS_TOKEN` is used as a bearer
    /// token when no client credentials are set.
    OAuth2 {
        /// Default token endpoint.
        token_url: Option<&'static str>,
    },
}

/// Business category, used for grouping in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorCategory {
    /// Customer success platforms.
    CustomerSuccess,
    /// Subscription billing and payments.
    Billing,
    /// Support desks.
    Support,
    /// CRM.
    Crm,
    /// Product analytics.
    Analytics,
    /// Chat, meetings and email.
    Communication,
    /// Surveys and feedback.
    Feedback,
    /// Project tracking and productivity.
    Productivity,
    /// Accounting.
    Accounting,
}

/// Static description of a vendor API.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VendorProfile {
    /// Human-readable name.
    pub display_name: &'static str,

    /// Category.
    pub category: VendorCategory,

    /// Environment variable prefix.
    pub env_prefix: &'static str,

    /// Base URL; `None` when it is account specific and must come from
    /// `{P}_BASE_URL`.
    pub default_base_url: Option<&'static str>,

    /// Authentication style.
    pub auth: AuthStyle,

    /// Pagination scheme for list endpoints.
    pub pagination: Pagination,

    /// JSON pointer to items in list responses.
    pub items_pointer: &'static str,

    /// Cheap authenticated endpoint for connection tests.
    pub health_path: &'static str,

    /// Documented request budget per minute, if any.
    pub requests_per_minute: Option<u32>,
}

macro_rules! vendors {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Supported vendors.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Vendor {
            $(
                #[allow(missing_docs)]
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl Vendor {
            /// Every supported vendor.
            pub const ALL: &'static [Vendor] = &[$(Vendor::$variant),+];

            /// Get the string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Vendor::$variant => $name,)+
                }
            }

            /// Parse from string.
            pub fn parse(s: &str) -> Option<Self> {
                let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    $($name => Some(Vendor::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

vendors! {
    Gainsight => "gainsight",
    ChurnZero => "churnzero",
    Totango => "totango",
    Vitally => "vitally",
    Planhat => "planhat",
    Chargebee => "chargebee",
    Recurly => "recurly",
    Stripe => "stripe",
    Zendesk => "zendesk",
    Freshdesk => "freshdesk",
    Intercom => "intercom",
    HelpScout => "helpscout",
    HubSpot => "hubspot",
    Salesforce => "salesforce",
    Pipedrive => "pipedrive",
    Mixpanel => "mixpanel",
    Amplitude => "amplitude",
    Pendo => "pendo",
    ProductBoard => "productboard",
    Slack => "slack",
    Zoom => "zoom",
    Gong => "gong",
    Calendly => "calendly",
    Mailchimp => "mailchimp",
    SendGrid => "sendgrid",
    Typeform => "typeform",
    SurveyMonkey => "surveymonkey",
    Delighted => "delighted",
    Jira => "jira",
    Asana => "asana",
    QuickBooks => "quickbooks",
    Xero => "xero",
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Vendor {
    /// Static profile for this vendor.
    pub fn profile(&self) -> VendorProfile {
        use AuthStyle::*;
        use VendorCategory::*;

        match self {
            Vendor::Gainsight => VendorProfile {
                display_name: "Gainsight",
                category: CustomerSuccess,
                env_prefix: "GAINSIGHT",
                default_base_url: None,
                auth: ApiKeyHeader { header: "accesskey" },
                pagination: Pagination::PageNumber {
                    page_param: "pageNumber",
                    size_param: Some("pageSize"),
                    page_size: 100,
                    first_page: 1,
                },
                items_pointer: "/data/records",
                health_path: "/v1/users/services/list",
                requests_per_minute: Some(100),
            },
            Vendor::ChurnZero => VendorProfile {
                display_name: "ChurnZero",
                category: CustomerSuccess,
                env_prefix: "CHURNZERO",
                default_base_url: None,
                auth: BasicUserPassword,
                pagination: Pagination::Offset {
                    offset_param: "$skip",
                    limit_param: "$top",
                    limit: 100,
                    next_offset_pointer: None,
                },
                items_pointer: "/value",
                health_path: "/public/v1/Account?$top=1",
                requests_per_minute: None,
            },
            Vendor::Totango => VendorProfile {
                display_name: "Totango",
                category: CustomerSuccess,
                env_prefix: "TOTANGO",
                default_base_url: Some("https://api.totango.com/api/v1"),
                auth: ApiKeyHeader { header: "app-token" },
                pagination: Pagination::None,
                items_pointer: "",
                health_path: "/users",
                requests_per_minute: Some(60),
            },
            Vendor::Vitally => VendorProfile {
                display_name: "Vitally",
                category: CustomerSuccess,
                env_prefix: "VITALLY",
                default_base_url: Some("https://rest.vitally.io"),
                auth: BasicKeyAsUser { password: "" },
                pagination: Pagination::Cursor {
                    cursor_param: "from",
                    limit_param: Some("limit"),
                    limit: 100,
                    next_cursor_pointer: "/next",
                },
                items_pointer: "/results",
                health_path: "/resources/accounts?limit=1",
                requests_per_minute: Some(1000),
            },
            Vendor::Planhat => VendorProfile {
                display_name: "Planhat",
                category: CustomerSuccess,
                env_prefix: "PLANHAT",
                default_base_url: Some("https://api.planhat.com"),
                auth: Bearer,
                pagination: Pagination::Offset {
                    offset_param: "offset",
                    limit_param: "limit",
                    limit: 100,
                    next_offset_pointer: None,
                },
                items_pointer: "",
                health_path: "/companies?limit=1",
                requests_per_minute: Some(150),
            },
            Vendor::Chargebee => VendorProfile {
                display_name: "Chargebee",
                category: Billing,
                env_prefix: "CHARGEBEE",
                default_base_url: None,
                auth: BasicKeyAsUser { password: "" },
                pagination: Pagination::Cursor {
                    cursor_param: "offset",
                    limit_param: Some("limit"),
                    limit: 100,
                    next_cursor_pointer: "/next_offset",
                },
                items_pointer: "/list",
                health_path: "/customers?limit=1",
                requests_per_minute: Some(150),
            },
            Vendor::Recurly => VendorProfile {
                display_name: "Recurly",
                category: Billing,
                env_prefix: "RECURLY",
                default_base_url: Some("https://v3.recurly.com"),
                auth: BasicKeyAsUser { password: "" },
                pagination: Pagination::NextLink {
                    next_link_pointer: "/next",
                },
                items_pointer: "/data",
                health_path: "/accounts?limit=1",
                requests_per_minute: Some(400),
            },
            Vendor::Stripe => VendorProfile {
                display_name: "Stripe",
                category: Billing,
                env_prefix: "STRIPE",
                default_base_url: Some("https://api.stripe.com/v1"),
                auth: Bearer,
                pagination: Pagination::LastItemCursor {
                    cursor_param: "starting_after",
                    limit_param: "limit",
                    limit: 100,
                    id_field: "id",
                    has_more_pointer: "/has_more",
                },
                items_pointer: "/data",
                health_path: "/balance",
                requests_per_minute: Some(6000),
            },
            Vendor::Zendesk => VendorProfile {
                display_name: "Zendesk",
                category: Support,
                env_prefix: "ZENDESK",
                default_base_url: None,
                auth: BasicUserPassword,
                pagination: Pagination::NextLink {
                    next_link_pointer: "/next_page",
                },
                items_pointer: "",
                health_path: "/api/v2/users/me.json",
                requests_per_minute: Some(400),
            },
            Vendor::Freshdesk => VendorProfile {
                display_name: "Freshdesk",
                category: Support,
                env_prefix: "FRESHDESK",
                default_base_url: None,
                auth: BasicKeyAsUser { password: "X" },
                pagination: Pagination::PageNumber {
                    page_param: "page",
                    size_param: Some("per_page"),
                    page_size: 100,
                    first_page: 1,
                },
                items_pointer: "",
                health_path: "/api/v2/agents/me",
                requests_per_minute: Some(200),
            },
            Vendor::Intercom => VendorProfile {
                display_name: "Intercom",
                category: Support,
                env_prefix: "INTERCOM",
                default_base_url: Some("https://api.intercom.io"),
                auth: Bearer,
                pagination: Pagination::Cursor {
                    cursor_param: "starting_after",
                    limit_param: Some("per_page"),
                    limit: 50,
                    next_cursor_pointer: "/pages/next/starting_after",
                },
                items_pointer: "/data",
                health_path: "/me",
                requests_per_minute: Some(1000),
            },
            Vendor::HelpScout => VendorProfile {
                display_name: "Help Scout",
                category: Support,
                env_prefix: "HELPSCOUT",
                default_base_url: Some("https://api.helpscout.net/v2"),
                auth: OAuth2 {
                    token_url: Some("https://api.helpscout.net/v2/oauth2/token"),
                },
                pagination: Pagination::NextLink {
                    next_link_pointer: "/_links/next/href",
                },
                items_pointer: "",
                health_path: "/users/me",
                requests_per_minute: Some(400),
            },
            Vendor::HubSpot => VendorProfile {
                display_name: "HubSpot",
                category: Crm,
                env_prefix: "HUBSPOT",
                default_base_url: Some("https://api.hubapi.com"),
                auth: OAuth2 {
                    token_url: Some("https://api.hubapi.com/oauth/v1/token"),
                },
                pagination: Pagination::Cursor {
                    cursor_param: "after",
                    limit_param: Some("limit"),
                    limit: 100,
                    next_cursor_pointer: "/paging/next/after",
                },
                items_pointer: "/results",
                health_path: "/crm/v3/objects/companies?limit=1",
                requests_per_minute: Some(600),
            },
            Vendor::Salesforce => VendorProfile {
                display_name: "Salesforce",
                category: Crm,
                env_prefix: "SALESFORCE",
                default_base_url: None,
                auth: OAuth2 {
                    token_url: Some("https://login.salesforce.com/services/oauth2/token"),
                },
                pagination: Pagination::NextLink {
                    next_link_pointer: "/nextRecordsUrl",
                },
                items_pointer: "/records",
                health_path: "/services/data/v59.0/limits",
                requests_per_minute: None,
            },
            Vendor::Pipedrive => VendorProfile {
                display_name: "Pipedrive",
                category: Crm,
                env_prefix: "PIPEDRIVE",
                default_base_url: Some("https://api.pipedrive.com/v1"),
                auth: QueryParam { name: "api_token" },
                pagination: Pagination::Offset {
                    offset_param: "start",
                    limit_param: "limit",
                    limit: 100,
                    next_offset_pointer: Some("/additional_data/pagination/next_start"),
                },
                items_pointer: "/data",
                health_path: "/users/me",
                requests_per_minute: Some(480),
            },
            Vendor::Mixpanel => VendorProfile {
                display_name: "Mixpanel",
                category: Analytics,
                env_prefix: "MIXPANEL",
                default_base_url: Some("https://mixpanel.com/api"),
                auth: BasicUserPassword,
                pagination: Pagination::None,
                items_pointer: "",
                health_path: "/app/me",
                requests_per_minute: Some(60),
            },
            Vendor::Amplitude => VendorProfile {
                display_name: "Amplitude",
                category: Analytics,
                env_prefix: "AMPLITUDE",
                default_base_url: Some("https://amplitude.com/api/2"),
                auth: BasicUserPassword,
                pagination: Pagination::None,
                items_pointer: "/data",
                health_path: "/taxonomy/category",
                requests_per_minute: Some(60),
            },
            Vendor::Pendo => VendorProfile {
                display_name: "Pendo",
                category: Analytics,
                env_prefix: "PENDO",
                default_base_url: Some("https://app.pendo.io/api/v1"),
                auth: ApiKeyHeader {
                    header: "x-pendo-integration-key",
                },
                pagination: Pagination::None,
                items_pointer: "",
                health_path: "/page",
                requests_per_minute: None,
            },
            Vendor::ProductBoard => VendorProfile {
                display_name: "Productboard",
                category: Feedback,
                env_prefix: "PRODUCTBOARD",
                default_base_url: Some("https://api.productboard.com"),
                auth: Bearer,
                pagination: Pagination::NextLink {
                    next_link_pointer: "/links/next",
                },
                items_pointer: "/data",
                health_path: "/features?pageLimit=1",
                requests_per_minute: Some(3000),
            },
            Vendor::Slack => VendorProfile {
                display_name: "Slack",
                category: Communication,
                env_prefix: "SLACK",
                default_base_url: Some("https://slack.com/api"),
                auth: Bearer,
                pagination: Pagination::Cursor {
                    cursor_param: "cursor",
                    limit_param: Some("limit"),
                    limit: 200,
                    next_cursor_pointer: "/response_metadata/next_cursor",
                },
                items_pointer: "",
                health_path: "/auth.test",
                requests_per_minute: Some(50),
            },
            Vendor::Zoom => VendorProfile {
                display_name: "Zoom",
                category: Communication,
                env_prefix: "ZOOM",
                default_base_url: Some("https://api.zoom.us/v2"),
                auth: OAuth2 {
                    token_url: Some("https://zoom.us/oauth/token"),
                },
                pagination: Pagination::Cursor {
                    cursor_param: "next_page_token",
                    limit_param: Some("page_size"),
                    limit: 300,
                    next_cursor_pointer: "/next_page_token",
                },
                items_pointer: "",
                health_path: "/users/me",
                requests_per_minute: Some(600),
            },
            Vendor::Gong => VendorProfile {
                display_name: "Gong",
                category: Communication,
                env_prefix: "GONG",
                default_base_url: Some("https://api.gong.io/v2"),
                auth: BasicUserPassword,
                pagination: Pagination::Cursor {
                    cursor_param: "cursor",
                    limit_param: None,
                    limit: 100,
                    next_cursor_pointer: "/records/cursor",
                },
                items_pointer: "",
                health_path: "/users",
                requests_per_minute: Some(180),
            },
            Vendor::Calendly => VendorProfile {
                display_name: "Calendly",
                category: Communication,
                env_prefix: "CALENDLY",
                default_base_url: Some("https://api.calendly.com"),
                auth: Bearer,
                pagination: Pagination::NextLink {
                    next_link_pointer: "/pagination/next_page",
                },
                items_pointer: "/collection",
                health_path: "/users/me",
                requests_per_minute: None,
            },
            Vendor::Mailchimp => VendorProfile {
                display_name: "Mailchimp",
                category: Communication,
                env_prefix: "MAILCHIMP",
                default_base_url: None,
                auth: BasicKeyAsPassword {
                    username: "anystring",
                },
                pagination: Pagination::Offset {
                    offset_param: "offset",
                    limit_param: "count",
                    limit: 100,
                    next_offset_pointer: None,
                },
                items_pointer: "",
                health_path: "/ping",
                requests_per_minute: None,
            },
            Vendor::SendGrid => VendorProfile {
                display_name: "SendGrid",
                category: Communication,
                env_prefix: "SENDGRID",
                default_base_url: Some("https://api.sendgrid.com/v3"),
                auth: Bearer,
                pagination: Pagination::Offset {
                    offset_param: "offset",
                    limit_param: "limit",
                    limit: 100,
                    next_offset_pointer: None,
                },
                items_pointer: "/result",
                health_path: "/scopes",
                requests_per_minute: Some(600),
            },
            Vendor::Typeform => VendorProfile {
                display_name: "Typeform",
                category: Feedback,
                env_prefix: "TYPEFORM",
                default_base_url: Some("https://api.typeform.com"),
                auth: Bearer,
                pagination: Pagination::PageNumber {
                    page_param: "page",
                    size_param: Some("page_size"),
                    page_size: 200,
                    first_page: 1,
                },
                items_pointer: "/items",
                health_path: "/me",
                requests_per_minute: Some(120),
            },
            Vendor::SurveyMonkey => VendorProfile {
                display_name: "SurveyMonkey",
                category: Feedback,
                env_prefix: "SURVEYMONKEY",
                default_base_url: Some("https://api.surveymonkey.com/v3"),
                auth: Bearer,
                pagination: Pagination::NextLink {
                    next_link_pointer: "/links/next",
                },
                items_pointer: "/data",
                health_path: "/users/me",
                requests_per_minute: Some(120),
            },
            Vendor::Delighted => VendorProfile {
                display_name: "Delighted",
                category: Feedback,
                env_prefix: "DELIGHTED",
                default_base_url: Some("https://api.delighted.com/v1"),
                auth: BasicKeyAsUser { password: "" },
                pagination: Pagination::PageNumber {
                    page_param: "page",
                    size_param: Some("per_page"),
                    page_size: 100,
                    first_page: 1,
                },
                items_pointer: "",
                health_path: "/metrics.json",
                requests_per_minute: None,
            },
            Vendor::Jira => VendorProfile {
                display_name: "Jira",
                category: Productivity,
                env_prefix: "JIRA",
                default_base_url: None,
                auth: BasicUserPassword,
                pagination: Pagination::Offset {
                    offset_param: "startAt",
                    limit_param: "maxResults",
                    limit: 50,
                    next_offset_pointer: None,
                },
                items_pointer: "/values",
                health_path: "/rest/api/3/myself",
                requests_per_minute: None,
            },
            Vendor::Asana => VendorProfile {
                display_name: "Asana",
                category: Productivity,
                env_prefix: "ASANA",
                default_base_url: Some("https://app.asana.com/api/1.0"),
                auth: Bearer,
                pagination: Pagination::Cursor {
                    cursor_param: "offset",
                    limit_param: Some("limit"),
                    limit: 100,
                    next_cursor_pointer: "/next_page/offset",
                },
                items_pointer: "/data",
                health_path: "/users/me",
                requests_per_minute: Some(150),
            },
            Vendor::QuickBooks => VendorProfile {
                display_name: "QuickBooks Online",
                category: Accounting,
                env_prefix: "QUICKBOOKS",
                default_base_url: None,
                auth: OAuth2 {
                    token_url: Some("https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer"),
                },
                pagination: Pagination::None,
                items_pointer: "",
                health_path: "/companyinfo",
                requests_per_minute: Some(500),
            },
            Vendor::Xero => VendorProfile {
                display_name: "Xero",
                category: Accounting,
                env_prefix: "XERO",
                default_base_url: Some("https://api.xero.com/api.xro/2.0"),
                auth: OAuth2 {
                    token_url: Some("https://identity.xero.com/connect/token"),
                },
                pagination: Pagination::PageNumber {
                    page_param: "page",
                    size_param: None,
                    page_size: 100,
                    first_page: 1,
                },
                items_pointer: "",
                health_path: "/Organisation",
                requests_per_minute: Some(60),
            },
        }
    }

    /// Paginator for this vendor's list endpoints.
    pub fn paginator(&self) -> Paginator {
        let profile = self.profile();
        Paginator::new(profile.pagination, profile.items_pointer)
    }

    /// Build a configuration from the process environment.
    pub fn config_from_env(
        &self,
        defaults: &IntegrationDefaults,
    ) -> Option<Result<IntegrationConfig, ConfigError>> {
        self.config_from_lookup(|key| std::env::var(key).ok(), defaults)
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Returns `None` when no credentials are set for this vendor, so
    /// unconfigured vendors are simply skipped.
    pub fn config_from_lookup<F>(
        &self,
        lookup: F,
        defaults: &IntegrationDefaults,
    ) -> Option<Result<IntegrationConfig, ConfigError>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = self.profile();
        let var = |suffix: &str| -> Option<String> {
            lookup(&format!("{}_{}", profile.env_prefix, suffix))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var("API_KEY");
        let auth = match profile.auth {
            AuthStyle::Bearer => api_key.map(|token| Auth::Static(Credentials::Bearer { token })),
            AuthStyle::ApiKeyHeader { header } => api_key.map(|key| {
                Auth::Static(Credentials::ApiKeyHeader {
                    header: header.to_string(),
                    key,
                })
            }),
            AuthStyle::BasicKeyAsUser { password } => api_key.map(|username| {
                Auth::Static(Credentials::Basic {
                    username,
                    password: password.to_string(),
                })
            }),
            AuthStyle::BasicKeyAsPassword { username } => api_key.map(|password| {
                Auth::Static(Credentials::Basic {
                    username: username.to_string(),
                    password,
                })
            }),
            AuthStyle::BasicUserPassword => match (var("USERNAME"), var("PASSWORD").or(api_key)) {
                (Some(username), Some(password)) => {
                    Some(Auth::Static(Credentials::Basic { username, password }))
                }
                _ => None,
            },
            AuthStyle::QueryParam { name } => api_key.map(|key| {
                Auth::Static(Credentials::QueryParam {
                    name: name.to_string(),
                    key,
                })
            }),
            AuthStyle::OAuth2 { token_url } => {
                match (var("CLIENT_ID"), var("CLIENT_SECRET")) {
                    (Some(client_id), Some(client_secret)) => {
                        let token_url = match var("TOKEN_URL").or(token_url.map(str::to_string)) {
                            Some(url) => url,
                            None => {
                                return Some(Err(ConfigError::MissingEnvVar(format!(
                                    "{}_TOKEN_URL",
                                    profile.env_prefix
                                ))))
                            }
                        };
                        let mut settings = OAuth2Settings::new(client_id, client_secret, token_url);
                        if let Some(refresh_token) = var("REFRESH_TOKEN") {
                            settings = settings.with_refresh_token(refresh_token);
                        }
                        if let Some(scopes) = var("SCOPES") {
                            settings = settings.with_scopes(
                                scopes
                                    .split([' ', ','])
                                    .filter(|s| !s.is_empty())
                                    .map(str::to_string)
                                    .collect(),
                            );
                        }
                        Some(Auth::OAuth2(settings))
                    }
                    _ => var("ACCESS_TOKEN")
                        .or(api_key)
                        .map(|token| Auth::Static(Credentials::Bearer { token })),
                }
            }
        }?;

        let base_url = match var("BASE_URL").or(profile.default_base_url.map(str::to_string)) {
            Some(url) => url,
            None => {
                return Some(Err(ConfigError::MissingEnvVar(format!(
                    "{}_BASE_URL",
                    profile.env_prefix
                ))))
            }
        };

        let mut config = IntegrationConfig::new(self.as_str(), base_url)
            .with_defaults(defaults)
            .with_health_path(profile.health_path);
        config = match auth {
            Auth::Static(credentials) => config.with_credentials(credentials),
            Auth::OAuth2(settings) => config.with_oauth2(settings),
        };

        let rpm = match var("RATE_LIMIT_PER_MINUTE") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(rpm) => Some(rpm),
                Err(e) => {
                    return Some(Err(ConfigError::InvalidValue {
                        key: format!("{}_RATE_LIMIT_PER_MINUTE", profile.env_prefix),
                        message: e.to_string(),
                    }))
                }
            },
            None => profile.requests_per_minute,
        };
        if let Some(rpm) = rpm.filter(|r| *r > 0) {
            config = config.with_rate_limit(RateLimitConfig::per_minute(rpm));
        }

        Some(config.validate().map(|_| config))
    }
}

enum Auth {
    Static(Credentials),
    OAuth2(OAuth2Settings),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_catalog_is_consistent() {
        assert!(Vendor::ALL.len() >= 30);

        let mut prefixes = HashSet::new();
        for vendor in Vendor::ALL {
            let profile = vendor.profile();
            assert!(prefixes.insert(profile.env_prefix), "duplicate prefix");
            assert_eq!(Vendor::parse(vendor.as_str()), Some(*vendor));
            if let Some(url) = profile.default_base_url {
                assert!(url.starts_with("https://"), "{} base url", vendor);
            }
        }
    }

    #[test]
    fn test_parse_normalizes() {
        assert_eq!(Vendor::parse("HubSpot"), Some(Vendor::HubSpot));
        assert_eq!(Vendor::parse(" stripe "), Some(Vendor::Stripe));
        assert_eq!(Vendor::parse("unknown"), None);
    }

    #[test]
    fn test_unconfigured_vendor_is_skipped() {
        let defaults = IntegrationDefaults::default();
        assert!(Vendor::Stripe.config_from_lookup(lookup(&[]), &defaults).is_none());
    }

    #[test]
    fn test_basic_key_as_user() {
        let config = Vendor::Freshdesk
            .config_from_lookup(
                lookup(&[
                    ("FRESHDESK_API_KEY", "fd-key"),
                    ("FRESHDESK_BASE_URL", "https://acme.freshdesk.com"),
                ]),
                &IntegrationDefaults::default(),
            )
            .unwrap()
            .unwrap();

        assert_eq!(
            config.credentials,
            Credentials::Basic {
                username: "fd-key".into(),
                password: "X".into()
            }
        );
        assert_eq!(config.rate_limit.unwrap().max_requests, 200);
    }

    #[test]
    fn test_account_specific_base_url_required() {
        let result = Vendor::Chargebee
            .config_from_lookup(
                lookup(&[("CHARGEBEE_API_KEY", "cb")]),
                &IntegrationDefaults::default(),
            )
            .unwrap();
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "CHARGEBEE_BASE_URL"));
    }

    #[test]
    fn test_oauth_vendor_settings() {
        let config = Vendor::HubSpot
            .config_from_lookup(
                lookup(&[
                    ("HUBSPOT_CLIENT_ID", "id"),
                    ("HUBSPOT_CLIENT_SECRET", "secret"),
                    ("HUBSPOT_REFRESH_TOKEN", "refresh"),
                    ("HUBSPOT_SCOPES", "crm.objects.companies.read, oauth"),
                ]),
                &IntegrationDefaults::default(),
            )
            .unwrap()
            .unwrap();

        let oauth = config.oauth2.unwrap();
        assert_eq!(oauth.token_url, "https://api.hubapi.com/oauth/v1/token");
        assert_eq!(oauth.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(oauth.scopes, vec!["crm.objects.companies.read", "oauth"]);
    }

    #[test]
    fn test_oauth_vendor_falls_back_to_access_token() {
        let config = Vendor::Zoom
            .config_from_lookup(
                lookup(&[("ZOOM_ACCESS_TOKEN", "static")]),
                &IntegrationDefaults::default(),
            )
            .unwrap()
            .unwrap();

        assert!(config.oauth2.is_none());
        assert_eq!(config.credentials.kind(), "bearer");
    }

    #[test]
    fn test_invalid_rate_limit_override() {
        let result = Vendor::Slack
            .config_from_lookup(
                lookup(&[("SLACK_API_KEY", "xoxb"), ("SLACK_RATE_LIMIT_PER_MINUTE", "lots")]),
                &IntegrationDefaults::default(),
            )
            .unwrap();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
