mod auth;
mod basic;
mod github;
mod mailer;

pub use auth::AuthPolicyConfig;
pub use basic::BasicConfig;
pub use github::GithubConfig;
pub use mailer::MailerConfig;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Session / verification policy knobs (see `auth` table in config.toml).
    #[serde(default)]
    pub auth: AuthPolicyConfig,

    /// GitHub OAuth application settings (see `github` table in config.toml).
    #[serde(default)]
    pub github: GithubConfig,

    /// Outbound email settings (see `mailer` table in config.toml).
    #[serde(default)]
    pub mailer: MailerConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Builds a Figment that merges defaults and a config TOML file.
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    /// Loads configuration by merging defaults and `config.toml` if present.
    ///
    /// Note: this does **not** validate the GitHub OAuth app settings; the
    /// OAuth routes reject at request time when they are missing. Binaries
    /// that require a working provider should call `Config::from_toml()`.
    pub fn from_optional_toml() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml): {err}")
        })
    }

    /// Loads configuration from the TOML file (with defaults) and validates
    /// required fields.
    pub fn from_toml() -> Self {
        if !PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            panic!("config file not found: {DEFAULT_CONFIG_FILE}");
        }
        let cfg: Self = Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration from {DEFAULT_CONFIG_FILE}: {err}")
        });
        if cfg.github.client_id.trim().is_empty() || cfg.github.client_secret.trim().is_empty() {
            panic!("github.client_id and github.client_secret must be set and non-empty");
        }
        cfg
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_optional_toml);
