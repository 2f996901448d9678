use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;
use crate::middleware::{DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY};

/// Where the trusted IdP metadata comes from and how hard to try.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdpSettings {
    /// Remote metadata document, fetched at startup.
    /// If omitted, the SP starts with no trusted IdP.
    #[serde(default)]
    pub metadata_url: Option<String>,

    /// Retries after the first failed fetch. Default: 10.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Seconds to wait between fetch attempts. Default: 5.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for IdpSettings {
    fn default() -> Self {
        Self {
            metadata_url: None,
            retry_count: default_retry_count(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl IdpSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.metadata_url()?;
        Ok(())
    }

    pub fn metadata_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = self.metadata_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw).map_err(|e| {
            ConfigError::Validation(format!("idp.metadata_url '{raw}' is not a valid URL: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "idp.metadata_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(Some(url))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}
