//! File-based settings for the SAML service provider.
//!
//! Settings are read from TOML and turned into [`Options`] by loading the PEM
//! key material they point at.
//!
//! # Example
//!
//! ```toml
//! base_url = "https://sp.example.com"
//! private_key_file = "/etc/samlsp/sp.key"
//! certificate_file = "/etc/samlsp/sp.crt"
//!
//! [idp]
//! metadata_url = "https://idp.example.com/metadata"
//! retry_count = 3
//!
//! [cookie]
//! name = "saml_session"
//! ```

mod cookie;
mod idp;

use std::path::{Path, PathBuf};

pub use cookie::*;
pub use idp::*;
use openssl::{pkey::PKey, x509::X509};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::middleware::Options;

/// Root settings for one service provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpSettings {
    /// Public root URL of the SP. The metadata and ACS endpoints are
    /// derived from it.
    pub base_url: String,

    /// PEM-encoded SP private key.
    pub private_key_file: PathBuf,

    /// PEM-encoded SP certificate.
    pub certificate_file: PathBuf,

    /// Accept assertions the SP did not request.
    #[serde(default)]
    pub allow_idp_initiated: bool,

    /// Ask the IdP to re-authenticate the user on every request.
    #[serde(default)]
    pub force_authn: bool,

    #[serde(default)]
    pub idp: IdpSettings,

    #[serde(default)]
    pub cookie: CookieSettings,
}

impl SpSettings {
    /// Load settings from a TOML file.
    #[cfg(feature = "config-file")]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse settings from a TOML string.
    #[cfg(feature = "config-file")]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let settings: SpSettings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings for consistency. Key files are only read by
    /// [`into_options`](Self::into_options).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        self.idp.validate()?;
        self.cookie.validate()?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ConfigError::Validation(format!(
                "base_url '{}' is not a valid URL: {e}",
                self.base_url
            ))
        })?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(ConfigError::Validation(format!(
                "base_url '{}' must be an absolute URL with a host",
                self.base_url
            )));
        }
        Ok(url)
    }

    /// Load the key material and build middleware options.
    ///
    /// The logger and HTTP client are left unset; callers that need custom
    /// ones set them on the returned [`Options`].
    pub fn into_options(self) -> Result<Options, ConfigError> {
        self.validate()?;

        let key = PKey::private_key_from_pem(&read_file(&self.private_key_file)?).map_err(
            |source| ConfigError::Key {
                path: self.private_key_file.clone(),
                source,
            },
        )?;
        let certificate = X509::from_pem(&read_file(&self.certificate_file)?).map_err(
            |source| ConfigError::Key {
                path: self.certificate_file.clone(),
                source,
            },
        )?;

        let mut opts = Options::new(self.base_url()?, key, certificate);
        opts.idp_metadata_url = self.idp.metadata_url()?;
        opts.retry_count = Some(self.idp.retry_count);
        opts.retry_delay = Some(self.idp.retry_delay());
        opts.cookie_name = Some(self.cookie.name.clone());
        opts.cookie_max_age = Some(self.cookie.max_age());
        opts.allow_idp_initiated = self.allow_idp_initiated;
        opts.force_authn = self.force_authn;
        Ok(opts)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|e| ConfigError::Io(e, path.to_path_buf()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {1}: {0}")]
    Io(std::io::Error, PathBuf),

    #[cfg(feature = "config-file")]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to load key material from {path}: {source}")]
    Key {
        path: PathBuf,
        #[source]
        source: openssl::error::ErrorStack,
    },

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
