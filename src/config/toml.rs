//! TOML configuration file parsing.
//!
//! Defines the structure of the configuration file with serde.

use std::path::Path;

use serde::Deserialize;

use super::ConfigError;

/// Root configuration structure from TOML file.
///
/// Every section is optional. A backend section that is present
/// configures that backend.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Transport settings shared by every backend
    #[serde(default)]
    pub http: HttpSection,

    /// Confirmation polling used by `validate`
    #[serde(default)]
    pub confirmation: ConfirmationSection,

    /// Google Analytics (Measurement Protocol)
    pub google_analytics: Option<GoogleAnalyticsSection>,

    /// Plausible
    pub plausible: Option<PlausibleSection>,

    /// Mixpanel
    pub mixpanel: Option<MixpanelSection>,

    /// HubSpot
    pub hubspot: Option<HubSpotSection>,

    /// ActiveCampaign
    pub active_campaign: Option<ActiveCampaignSection>,

    /// Orbit
    pub orbit: Option<OrbitSection>,

    /// Reo.Dev
    pub reodev: Option<ReoDevSection>,

    /// ClickHouse
    pub clickhouse: Option<ClickHouseSection>,
}

/// Transport configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSection {
    /// Total request timeout in seconds
    pub timeout: Option<u64>,

    /// Connect timeout in seconds
    pub connect_timeout: Option<u64>,
}

/// Confirmation polling section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmationSection {
    /// Maximum number of checks
    pub attempts: Option<u32>,

    /// Seconds between checks
    pub delay: Option<u64>,
}

/// Google Analytics section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleAnalyticsSection {
    /// Property tracking ID
    pub tracking_id: Option<String>,
    /// Anonymous client ID
    pub client_id: Option<String>,
    /// Collector base URL
    pub endpoint: Option<String>,
    /// Client IP to forward
    pub client_ip: Option<String>,
    /// User agent to forward
    pub user_agent: Option<String>,
    /// Set to false to configure the backend disabled
    pub enabled: Option<bool>,
}

/// Plausible section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlausibleSection {
    /// Site domain
    pub domain: Option<String>,
    /// Stats API key
    pub api_key: Option<String>,
    /// API base URL
    pub endpoint: Option<String>,
    /// Client IP to forward
    pub client_ip: Option<String>,
    /// User agent to forward
    pub user_agent: Option<String>,
    /// Set to false to configure the backend disabled
    pub enabled: Option<bool>,
}

/// Mixpanel section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MixpanelSection {
    /// Project token
    pub token: Option<String>,
    /// API base URL
    pub endpoint: Option<String>,
    /// Set to false to configure the backend disabled
    pub enabled: Option<bool>,
}

/// HubSpot section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubSpotSection {
    /// Private app token
    pub token: Option<String>,
    /// API base URL
    pub endpoint: Option<String>,
    /// Set to false to configure the backend disabled
    pub enabled: Option<bool>,
}

/// ActiveCampaign section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActiveCampaignSection {
    /// Event tracking key
    pub key: Option<String>,
    /// Account ID used by event tracking
    pub actid: Option<String>,
    /// REST API key
    pub api_key: Option<String>,
    /// Account subdomain
    pub account: Option<String>,
    /// Event tracking URL
    pub tracking_endpoint: Option<String>,
    /// REST API base URL
    pub api_endpoint: Option<String>,
    /// Set to false to configure the backend disabled
    pub enabled: Option<bool>,
}

/// Orbit section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrbitSection {
    /// Workspace slug
    pub workspace_id: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// Identity source recorded with each activity
    pub data_origin: Option<String>,
    /// API base URL
    pub endpoint: Option<String>,
    /// Set to false to configure the backend disabled
    pub enabled: Option<bool>,
}

/// Reo.Dev section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReoDevSection {
    /// Account owner email
    pub email: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// Target list
    pub list_id: Option<String>,
    /// API base URL
    pub endpoint: Option<String>,
    /// Set to false to configure the backend disabled
    pub enabled: Option<bool>,
}

/// ClickHouse section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClickHouseSection {
    /// HTTP interface URL (required)
    pub endpoint: Option<String>,
    /// Database name
    pub database: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// User name
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Client IP written to `clientIp`
    pub client_ip: Option<String>,
    /// User agent written to `userAgent`
    pub user_agent: Option<String>,
    /// Set to false to configure the backend disabled
    pub enabled: Option<bool>,
}

impl TomlConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::from)
    }
}

/// Generates a default configuration file with comments.
#[must_use]
pub fn default_config_template() -> String {
    r#"# analytics-dispatch configuration file
#
# Every backend section is optional. Uncomment a section to configure that
# backend; set `enabled = false` to keep it configured but silent.

[http]
# Total request timeout in seconds (default: 10)
# timeout = 10

# Connect timeout in seconds (default: 5)
# connect_timeout = 5

[confirmation]
# Checks made by `validate` on eventually consistent backends (default: 3)
# attempts = 3

# Seconds between checks (default: 2)
# delay = 2

# [google_analytics]
# tracking_id = "UA-XXXX-Y"
# client_id = "555"
# endpoint = "https://www.google-analytics.com"
# client_ip = "203.0.113.9"
# user_agent = "Mozilla/5.0"

# [plausible]
# domain = "example.com"
# api_key = "your-stats-api-key"
# endpoint = "https://plausible.io/api"

# [mixpanel]
# token = "your-project-token"
# endpoint = "https://api.mixpanel.com"

# [hubspot]
# token = "your-private-app-token"
# endpoint = "https://api.hubapi.com"

# [active_campaign]
# key = "your-event-key"
# actid = "123456"
# api_key = "your-api-key"
# account = "yourcompany"

# [orbit]
# workspace_id = "your-workspace"
# api_key = "your-api-key"
# data_origin = "website"

# [reodev]
# email = "you@example.com"
# api_key = "your-api-key"
# list_id = "your-list-id"

# [clickhouse]
# endpoint = "http://localhost:8123"
# database = "analytics"
# table = "events"
# username = "default"
# password = ""
"#
    .to_string()
}
