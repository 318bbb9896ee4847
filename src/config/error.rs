//! Error types for configuration parsing and validation.

use std::path::PathBuf;

use thiserror::Error;

use crate::adapter::InvalidIdentifier;

/// Error type for configuration operations.
///
/// Covers errors from parsing, validation, and file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file '{}': {source}", path.display())]
    FileRead {
        /// Path to the config file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to write the configuration template.
    #[error("Failed to write config file '{}': {source}", path.display())]
    FileWrite {
        /// Path to the config file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A backend section is present but lacks a required field.
    #[error("Missing required field: {section}.{field}")]
    MissingRequired {
        /// Name of the TOML section
        section: &'static str,
        /// Name of the missing field
        field: &'static str,
    },

    /// Invalid URL provided.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The invalid URL string
        url: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A ClickHouse database or table name is unsafe.
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    /// Invalid duration value (zero).
    #[error("Invalid duration for {field}: {reason}")]
    InvalidDuration {
        /// Name of the field
        field: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Invalid confirmation policy.
    #[error("Invalid confirmation configuration: {0}")]
    InvalidConfirmation(String),
}

impl ConfigError {
    /// Creates a `MissingRequired` error.
    #[must_use]
    pub const fn missing(section: &'static str, field: &'static str) -> Self {
        Self::MissingRequired { section, field }
    }
}
