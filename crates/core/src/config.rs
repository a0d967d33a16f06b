//! Configuration loading
//!
//! Settings live in `prepdeck.toml` under the platform config directory.
//! Every field has a default, so a missing file or a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// File name looked up in the config directory
pub const CONFIG_FILE_NAME: &str = "prepdeck.toml";

/// Upper bound for every configured duration (ten years)
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Session lifetime constants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum lifetime measured from login or the latest extension
    #[serde(rename = "absolute_timeout_secs", with = "duration_secs")]
    pub absolute_timeout: Duration,
    /// Maximum idle gap before forced logout
    #[serde(rename = "inactivity_timeout_secs", with = "duration_secs")]
    pub inactivity_timeout: Duration,
    /// Trailing part of the absolute timeout in which the user is warned
    #[serde(rename = "warning_window_secs", with = "duration_secs")]
    pub warning_window: Duration,
    /// Period of the coarse validity re-check
    #[serde(rename = "revalidate_interval_secs", with = "duration_secs")]
    pub revalidate_interval: Duration,
    /// Minimum gap between two activity writes
    #[serde(rename = "activity_throttle_ms", with = "duration_millis")]
    pub activity_throttle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            absolute_timeout: Duration::from_secs(7 * 24 * 60 * 60),
            inactivity_timeout: Duration::from_secs(2 * 60 * 60),
            warning_window: Duration::from_secs(60 * 60),
            revalidate_interval: Duration::from_secs(5 * 60),
            activity_throttle: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("absolute_timeout_secs", self.absolute_timeout),
            ("inactivity_timeout_secs", self.inactivity_timeout),
            ("revalidate_interval_secs", self.revalidate_interval),
        ];
        for (name, value) in required {
            if value.is_zero() {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }

        let bounded = [
            ("absolute_timeout_secs", self.absolute_timeout),
            ("inactivity_timeout_secs", self.inactivity_timeout),
            ("warning_window_secs", self.warning_window),
            ("revalidate_interval_secs", self.revalidate_interval),
            ("activity_throttle_ms", self.activity_throttle),
        ];
        for (name, value) in bounded {
            if value > MAX_DURATION {
                return Err(Error::InvalidConfig(format!(
                    "{} exceeds the maximum of {} seconds",
                    name,
                    MAX_DURATION.as_secs()
                )));
            }
        }

        if self.warning_window >= self.absolute_timeout {
            return Err(Error::InvalidConfig(
                "warning_window_secs must be shorter than absolute_timeout_secs".to_string(),
            ));
        }

        Ok(())
    }
}

/// Auth API endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            request_timeout_secs: 15,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepdeckConfig {
    pub session: SessionConfig,
    pub api: ApiConfig,
}

impl PrepdeckConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.session.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or from the default location if present.
    ///
    /// An explicit path must exist. The default location falls back to
    /// built-in defaults when the file is absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "prepdeck", "prepdeck")
}

/// `<config_dir>/prepdeck.toml`
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join(CONFIG_FILE_NAME))
}

/// Directory holding the session database
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = project_dirs().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine data directory",
        ))
    })?;
    Ok(dirs.data_dir().to_path_buf())
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
