//! Validated configuration built from the TOML file.
//!
//! This module contains the final, validated configuration handed to the
//! dispatcher. All validation is performed during construction.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::adapter::{
    ActiveCampaignConfig, ClickHouseConfig, Confirmation, GoogleAnalyticsConfig, HubSpotConfig,
    Identifier, MixpanelConfig, OrbitConfig, PlausibleConfig, ReoDevConfig,
};
use crate::invoker::Timeouts;

use super::defaults;
use super::error::ConfigError;
use super::toml::{
    ActiveCampaignSection, ClickHouseSection, ConfirmationSection, GoogleAnalyticsSection,
    HttpSection, HubSpotSection, MixpanelSection, OrbitSection, PlausibleSection, ReoDevSection,
    TomlConfig,
};

/// A configured backend and whether it starts enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<T> {
    /// Typed backend settings
    pub settings: T,
    /// False when the section sets `enabled = false`
    pub enabled: bool,
}

impl<T> Section<T> {
    const fn new(settings: T, enabled: Option<bool>) -> Self {
        Self {
            settings,
            enabled: match enabled {
                Some(enabled) => enabled,
                None => true,
            },
        }
    }
}

/// Fully validated configuration ready for use by the dispatcher.
///
/// A backend field is `Some` exactly when its section is present in the file.
///
/// # Construction
///
/// Use [`ValidatedConfig::load`] for a file or [`ValidatedConfig::from_toml`]
/// for an already parsed [`TomlConfig`].
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    /// Transport timeouts shared by every backend
    pub timeouts: Timeouts,

    /// Confirmation polling for eventually consistent backends
    pub confirmation: Confirmation,

    /// Google Analytics settings
    pub google_analytics: Option<Section<GoogleAnalyticsConfig>>,

    /// Plausible settings
    pub plausible: Option<Section<PlausibleConfig>>,

    /// Mixpanel settings
    pub mixpanel: Option<Section<MixpanelConfig>>,

    /// HubSpot settings
    pub hubspot: Option<Section<HubSpotConfig>>,

    /// ActiveCampaign settings
    pub active_campaign: Option<Section<ActiveCampaignConfig>>,

    /// Orbit settings
    pub orbit: Option<Section<OrbitConfig>>,

    /// Reo.Dev settings
    pub reodev: Option<Section<ReoDevConfig>>,

    /// ClickHouse settings
    pub clickhouse: Option<Section<ClickHouseConfig>>,
}

impl fmt::Display for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backends: Vec<String> = self
            .backends()
            .into_iter()
            .map(|(name, enabled)| {
                if enabled {
                    name.to_string()
                } else {
                    format!("{name} (disabled)")
                }
            })
            .collect();

        write!(
            f,
            "Config {{ timeout: {}s, connect_timeout: {}s, confirmation: {}x/{}s, backends: [{}] }}",
            self.timeouts.total.as_secs(),
            self.timeouts.connect.as_secs(),
            self.confirmation.attempts,
            self.confirmation.delay.as_secs(),
            backends.join(", "),
        )
    }
}

impl ValidatedConfig {
    /// Validates a parsed configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A present section lacks a required field
    /// - An endpoint is not an absolute http(s) URL
    /// - A ClickHouse database or table name is not a plain identifier
    /// - A timeout is zero
    /// - `confirmation.attempts` is zero
    pub fn from_toml(toml: &TomlConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            timeouts: Self::resolve_timeouts(&toml.http)?,
            confirmation: Self::resolve_confirmation(&toml.confirmation)?,
            google_analytics: toml
                .google_analytics
                .as_ref()
                .map(Self::resolve_google_analytics)
                .transpose()?,
            plausible: toml.plausible.as_ref().map(Self::resolve_plausible).transpose()?,
            mixpanel: toml.mixpanel.as_ref().map(Self::resolve_mixpanel).transpose()?,
            hubspot: toml.hubspot.as_ref().map(Self::resolve_hubspot).transpose()?,
            active_campaign: toml
                .active_campaign
                .as_ref()
                .map(Self::resolve_active_campaign)
                .transpose()?,
            orbit: toml.orbit.as_ref().map(Self::resolve_orbit).transpose()?,
            reodev: toml.reodev.as_ref().map(Self::resolve_reodev).transpose()?,
            clickhouse: toml.clickhouse.as_ref().map(Self::resolve_clickhouse).transpose()?,
        })
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::from_toml(&TomlConfig::parse(content)?)
    }

    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&TomlConfig::load(path)?)
    }

    /// Names of the configured backends, in dispatch order, with their
    /// initial enabled flag.
    #[must_use]
    pub fn backends(&self) -> Vec<(&'static str, bool)> {
        [
            ("GoogleAnalytics", self.google_analytics.as_ref().map(|s| s.enabled)),
            ("Plausible", self.plausible.as_ref().map(|s| s.enabled)),
            ("Mixpanel", self.mixpanel.as_ref().map(|s| s.enabled)),
            ("HubSpot", self.hubspot.as_ref().map(|s| s.enabled)),
            ("ActiveCampaign", self.active_campaign.as_ref().map(|s| s.enabled)),
            ("Orbit", self.orbit.as_ref().map(|s| s.enabled)),
            ("ReoDev", self.reodev.as_ref().map(|s| s.enabled)),
            ("ClickHouse", self.clickhouse.as_ref().map(|s| s.enabled)),
        ]
        .into_iter()
        .filter_map(|(name, enabled)| enabled.map(|enabled| (name, enabled)))
        .collect()
    }

    fn resolve_timeouts(http: &HttpSection) -> Result<Timeouts, ConfigError> {
        Ok(Timeouts {
            connect: positive_secs(
                "http.connect_timeout",
                http.connect_timeout.unwrap_or(defaults::HTTP_CONNECT_TIMEOUT_SECS),
            )?,
            total: positive_secs(
                "http.timeout",
                http.timeout.unwrap_or(defaults::HTTP_TIMEOUT_SECS),
            )?,
        })
    }

    fn resolve_confirmation(section: &ConfirmationSection) -> Result<Confirmation, ConfigError> {
        let mut confirmation = Confirmation::new();

        if let Some(attempts) = section.attempts {
            if attempts == 0 {
                return Err(ConfigError::InvalidConfirmation(
                    "attempts must be greater than 0".to_string(),
                ));
            }
            confirmation = confirmation.with_attempts(attempts);
        }
        if let Some(delay) = section.delay {
            confirmation = confirmation.with_delay(Duration::from_secs(delay));
        }

        Ok(confirmation)
    }

    fn resolve_google_analytics(
        s: &GoogleAnalyticsSection,
    ) -> Result<Section<GoogleAnalyticsConfig>, ConfigError> {
        const SECTION: &str = "google_analytics";

        let mut config = GoogleAnalyticsConfig::new(
            required(SECTION, "tracking_id", s.tracking_id.as_deref())?,
            required(SECTION, "client_id", s.client_id.as_deref())?,
        )
        .with_endpoint(endpoint(s.endpoint.as_deref(), GoogleAnalyticsConfig::DEFAULT_ENDPOINT)?);
        config.client_ip = non_empty(s.client_ip.as_deref());
        config.user_agent = non_empty(s.user_agent.as_deref());

        Ok(Section::new(config, s.enabled))
    }

    fn resolve_plausible(s: &PlausibleSection) -> Result<Section<PlausibleConfig>, ConfigError> {
        const SECTION: &str = "plausible";

        let mut config = PlausibleConfig::new(
            required(SECTION, "domain", s.domain.as_deref())?,
            required(SECTION, "api_key", s.api_key.as_deref())?,
        )
        .with_endpoint(endpoint(s.endpoint.as_deref(), PlausibleConfig::DEFAULT_ENDPOINT)?);
        config.client_ip = non_empty(s.client_ip.as_deref());
        config.user_agent = non_empty(s.user_agent.as_deref());

        Ok(Section::new(config, s.enabled))
    }

    fn resolve_mixpanel(s: &MixpanelSection) -> Result<Section<MixpanelConfig>, ConfigError> {
        let config = MixpanelConfig::new(required("mixpanel", "token", s.token.as_deref())?)
            .with_endpoint(endpoint(s.endpoint.as_deref(), MixpanelConfig::DEFAULT_ENDPOINT)?);

        Ok(Section::new(config, s.enabled))
    }

    fn resolve_hubspot(s: &HubSpotSection) -> Result<Section<HubSpotConfig>, ConfigError> {
        let config = HubSpotConfig::new(required("hubspot", "token", s.token.as_deref())?)
            .with_endpoint(endpoint(s.endpoint.as_deref(), HubSpotConfig::DEFAULT_ENDPOINT)?);

        Ok(Section::new(config, s.enabled))
    }

    fn resolve_active_campaign(
        s: &ActiveCampaignSection,
    ) -> Result<Section<ActiveCampaignConfig>, ConfigError> {
        const SECTION: &str = "active_campaign";

        let account = required(SECTION, "account", s.account.as_deref())?;
        let tracking = endpoint(
            s.tracking_endpoint.as_deref(),
            ActiveCampaignConfig::DEFAULT_TRACKING_ENDPOINT,
        )?;
        let api = endpoint(
            s.api_endpoint.as_deref(),
            &ActiveCampaignConfig::default_api_endpoint(&account),
        )?;

        let config = ActiveCampaignConfig::new(
            required(SECTION, "key", s.key.as_deref())?,
            required(SECTION, "actid", s.actid.as_deref())?,
            required(SECTION, "api_key", s.api_key.as_deref())?,
            account,
        )
        .with_endpoints(tracking, api);

        Ok(Section::new(config, s.enabled))
    }

    fn resolve_orbit(s: &OrbitSection) -> Result<Section<OrbitConfig>, ConfigError> {
        const SECTION: &str = "orbit";

        let config = OrbitConfig::new(
            required(SECTION, "workspace_id", s.workspace_id.as_deref())?,
            required(SECTION, "api_key", s.api_key.as_deref())?,
            required(SECTION, "data_origin", s.data_origin.as_deref())?,
        )
        .with_endpoint(endpoint(s.endpoint.as_deref(), OrbitConfig::DEFAULT_ENDPOINT)?);

        Ok(Section::new(config, s.enabled))
    }

    fn resolve_reodev(s: &ReoDevSection) -> Result<Section<ReoDevConfig>, ConfigError> {
        const SECTION: &str = "reodev";

        let config = ReoDevConfig::new(
            required(SECTION, "email", s.email.as_deref())?,
            required(SECTION, "api_key", s.api_key.as_deref())?,
            required(SECTION, "list_id", s.list_id.as_deref())?,
        )
        .with_endpoint(endpoint(s.endpoint.as_deref(), ReoDevConfig::DEFAULT_ENDPOINT)?);

        Ok(Section::new(config, s.enabled))
    }

    fn resolve_clickhouse(s: &ClickHouseSection) -> Result<Section<ClickHouseConfig>, ConfigError> {
        let url = required("clickhouse", "endpoint", s.endpoint.as_deref())?;
        validate_url(&url)?;

        let mut config = ClickHouseConfig::new(url);
        if let Some(database) = non_empty(s.database.as_deref()) {
            config = config.with_database(Identifier::new(database)?);
        }
        if let Some(table) = non_empty(s.table.as_deref()) {
            config = config.with_table(Identifier::new(table)?);
        }
        config = config.with_credentials(
            non_empty(s.username.as_deref())
                .unwrap_or_else(|| ClickHouseConfig::DEFAULT_USERNAME.to_string()),
            s.password.clone().unwrap_or_default(),
        );
        config.client_ip = non_empty(s.client_ip.as_deref());
        config.user_agent = non_empty(s.user_agent.as_deref());

        Ok(Section::new(config, s.enabled))
    }
}

/// Writes the default configuration template to a file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let template = super::toml::default_config_template();
    std::fs::write(path, template).map_err(|e| ConfigError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

// Helper functions

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn required(
    section: &'static str,
    field: &'static str,
    value: Option<&str>,
) -> Result<String, ConfigError> {
    non_empty(value).ok_or_else(|| ConfigError::missing(section, field))
}

fn endpoint(value: Option<&str>, default: &str) -> Result<String, ConfigError> {
    let url = non_empty(value).unwrap_or_else(|| default.to_string());
    validate_url(&url)?;
    Ok(url)
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{scheme}', expected http or https"),
        }),
    }
}

fn positive_secs(field: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidDuration {
            field,
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
