use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::middleware::{DEFAULT_COOKIE_MAX_AGE, DEFAULT_COOKIE_NAME};

/// Session cookie policy.
///
/// The cookie domain is not configurable; it is always the host of
/// `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CookieSettings {
    /// Cookie name. Default: `token`.
    #[serde(default = "default_cookie_name")]
    pub name: String,

    /// Cookie lifetime in seconds. Default: 3600. Zero falls back to the
    /// default.
    #[serde(default = "default_cookie_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            max_age_secs: default_cookie_max_age_secs(),
        }
    }
}

impl CookieSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "cookie.name must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_cookie_max_age_secs() -> u64 {
    DEFAULT_COOKIE_MAX_AGE.as_secs()
}
