//! Configuration layer.
//!
//! This module provides:
//! - TOML configuration file parsing ([`TomlConfig`])
//! - Validated configuration ([`ValidatedConfig`])
//! - Configuration file generation ([`write_default_config`])
//! - Default values ([`defaults`])
//!
//! # Sections
//!
//! `[http]` and `[confirmation]` tune behavior shared by every backend and
//! fall back to built-in defaults. Each backend has its own section
//! (`[plausible]`, `[clickhouse]`, ...). A backend is configured exactly
//! when its section is present; `enabled = false` keeps it configured but
//! starts it disabled.
//!
//! Empty strings count as absent, so a required field set to `""` is
//! reported as missing and an empty endpoint falls back to the backend's
//! default.

pub mod defaults;
mod error;
mod toml;
mod validated;


pub use error::ConfigError;
pub use toml::{TomlConfig, default_config_template};
pub use validated::{Section, ValidatedConfig, write_default_config};
