//! SAML 2.0 service provider bootstrap.
//!
//! Builds the SP identity (key, certificate, endpoints, cookie policy) from
//! [`Options`] and resolves the trusted IdPs from metadata documents, either
//! supplied directly or fetched over HTTP with bounded retries.
//!
//! ```no_run
//! # use openssl::{pkey::{PKey, Private}, x509::X509};
//! # async fn run(key: PKey<Private>, certificate: X509) -> Result<(), Box<dyn std::error::Error>> {
//! let mut options = samlsp::Options::new(url::Url::parse("https://sp.example.com")?, key, certificate);
//! options.idp_metadata_url = Some(url::Url::parse("https://idp.example.com/metadata")?);
//!
//! let middleware = samlsp::Middleware::new(options).await?;
//! let sp = middleware.service_provider();
//! println!("ACS endpoint: {}", sp.acs_url());
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod fetch;
pub mod logger;
pub mod metadata;
mod middleware;
pub mod registry;
mod service_provider;
#[cfg(test)]
mod tests;

pub use config::{ConfigError, SpSettings};
pub use error::SamlSpError;
pub use fetch::{FetchError, MetadataClient, SharedMetadataClient};
pub use logger::{Logger, NoopLogger, SharedLogger, TracingLogger};
pub use metadata::{MetadataError, RootElement, parse_idp_metadata};
pub use middleware::{
    ACS_PATH, DEFAULT_COOKIE_MAX_AGE, DEFAULT_COOKIE_NAME, DEFAULT_RETRY_COUNT,
    DEFAULT_RETRY_DELAY, METADATA_PATH, Middleware, Options,
};
pub use registry::IdpRegistry;
pub use samael::metadata::EntityDescriptor;
pub use service_provider::{ForceAuthn, ServiceProvider};
