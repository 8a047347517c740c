//! Application settings
//!
//! Settings come from `<config_dir>/config.json` (every field optional) and
//! are then overridden by `FWPOLICY_*` environment variables:
//!
//! | Variable                 | Field          |
//! |--------------------------|----------------|
//! | `FWPOLICY_ENVIRONMENT`   | `environment`  |
//! | `FWPOLICY_APP_NAME`      | `app_name`     |
//! | `FWPOLICY_DATA_DIR`      | `data_dir`     |
//! | `FWPOLICY_MAX_PER_PAGE`  | `max_per_page` |
//! | `FWPOLICY_JWT_SECRET`    | `jwt_secret`   |
//!
//! `jwt_secret` has no default; loading fails without it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::query::DEFAULT_MAX_PER_PAGE;
use crate::utils::{get_config_dir, get_data_dir};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const ENV_PREFIX: &str = "FWPOLICY_";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

#[derive(Clone, Serialize)]
pub struct Settings {
    pub environment: Environment,
    pub app_name: String,
    pub data_dir: PathBuf,
    pub max_per_page: u64,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("environment", &self.environment)
            .field("app_name", &self.app_name)
            .field("data_dir", &self.data_dir)
            .field("max_per_page", &self.max_per_page)
            .finish_non_exhaustive()
    }
}

/// `config.json` contents before environment overrides
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    environment: Option<Environment>,
    app_name: Option<String>,
    data_dir: Option<PathBuf>,
    max_per_page: Option<u64>,
    jwt_secret: Option<String>,
}

fn default_app_name() -> String {
    "fwpolicy".to_string()
}

fn default_data_dir() -> PathBuf {
    get_data_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl Settings {
    /// Loads settings from the default config directory and the process
    /// environment.
    pub fn load() -> Result<Self> {
        let file = match get_config_dir() {
            Some(dir) => read_settings_file(&dir.join(CONFIG_FILE_NAME))?,
            None => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Builds settings from raw `config.json` text and an environment lookup.
    pub fn from_sources(
        file: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut raw: SettingsFile = match file {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| Error::Config(format!("invalid {CONFIG_FILE_NAME}: {e}")))?,
            None => SettingsFile::default(),
        };

        let var = |name: &str| env(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(value) = var("ENVIRONMENT") {
            raw.environment = Some(value.parse().map_err(|_| {
                Error::Config(format!("{value} is not a valid environment"))
            })?);
        }
        if let Some(value) = var("APP_NAME") {
            raw.app_name = Some(value);
        }
        if let Some(value) = var("DATA_DIR") {
            raw.data_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = var("MAX_PER_PAGE") {
            raw.max_per_page = Some(value.parse().map_err(|_| {
                Error::Config(format!("{value} is not a valid max_per_page"))
            })?);
        }
        if let Some(value) = var("JWT_SECRET") {
            raw.jwt_secret = Some(value);
        }

        let jwt_secret = raw
            .jwt_secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config(format!("{ENV_PREFIX}JWT_SECRET is not set")))?;

        Ok(Self {
            environment: raw.environment.unwrap_or_default(),
            app_name: raw.app_name.unwrap_or_else(default_app_name),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            max_per_page: raw.max_per_page.unwrap_or(DEFAULT_MAX_PER_PAGE).max(1),
            jwt_secret,
        })
    }
}

fn read_settings_file(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(json) => Ok(Some(json)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
