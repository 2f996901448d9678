//! SP bootstrap: resolves [`Options`] into a ready [`Middleware`].
//!
//! Construction fills in defaults, derives the SP endpoints from the base URL
//! and, when a remote metadata URL is configured, fetches the IdP metadata
//! before returning. A `Middleware` only exists once its metadata is in
//! place; a failed fetch fails construction.

use std::{fmt, time::Duration};

use openssl::{
    pkey::{PKey, Private},
    x509::X509,
};
use samael::metadata::EntityDescriptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::{
    config::ConfigError,
    error::SamlSpError,
    fetch::{RetryPolicy, SharedMetadataClient, default_client, fetch_with_retry, metadata_request},
    logger::{SharedLogger, default_logger},
    metadata::{self, MetadataError},
    registry::IdpRegistry,
    service_provider::{ForceAuthn, ServiceProvider},
};

/// Path appended to the base URL for the SP metadata endpoint.
pub const METADATA_PATH: &str = "/saml/metadata";
/// Path appended to the base URL for the assertion consumer service.
pub const ACS_PATH: &str = "/saml/acs";

pub const DEFAULT_RETRY_COUNT: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_COOKIE_NAME: &str = "token";

/// Declarative SP options. Unset fields take the defaults above.
pub struct Options {
    /// Public root URL of the SP. Endpoint paths are appended to its path.
    pub base_url: Url,
    pub key: PKey<Private>,
    pub certificate: X509,
    /// Defaults to [`TracingLogger`](crate::TracingLogger).
    pub logger: Option<SharedLogger>,
    /// Initial primary IdP. Not added to the registry.
    pub idp_metadata: Option<EntityDescriptor>,
    /// Remote IdP metadata, fetched during construction when set.
    pub idp_metadata_url: Option<Url>,
    /// Client for the metadata fetch. Defaults to a plain `reqwest::Client`.
    pub http_client: Option<SharedMetadataClient>,
    /// Session cookie lifetime. Zero counts as unset.
    pub cookie_max_age: Option<Duration>,
    pub cookie_name: Option<String>,
    /// Retries after the first failed fetch attempt.
    pub retry_count: Option<u32>,
    /// Fixed wait between fetch attempts.
    pub retry_delay: Option<Duration>,
    pub allow_idp_initiated: bool,
    pub force_authn: bool,
}

impl Options {
    /// Options with the required fields set and everything else defaulted.
    pub fn new(base_url: Url, key: PKey<Private>, certificate: X509) -> Self {
        Self {
            base_url,
            key,
            certificate,
            logger: None,
            idp_metadata: None,
            idp_metadata_url: None,
            http_client: None,
            cookie_max_age: None,
            cookie_name: None,
            retry_count: None,
            retry_delay: None,
            allow_idp_initiated: false,
            force_authn: false,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("base_url", &self.base_url.as_str())
            .field("key", &"****")
            .field("certificate", &self.certificate.subject_name())
            .field(
                "idp_metadata",
                &self.idp_metadata.as_ref().and_then(metadata::entity_id),
            )
            .field(
                "idp_metadata_url",
                &self.idp_metadata_url.as_ref().map(Url::as_str),
            )
            .field("http_client", &self.http_client.as_ref().map(|_| "custom"))
            .field("cookie_max_age", &self.cookie_max_age)
            .field("cookie_name", &self.cookie_name)
            .field("retry_count", &self.retry_count)
            .field("retry_delay", &self.retry_delay)
            .field("allow_idp_initiated", &self.allow_idp_initiated)
            .field("force_authn", &self.force_authn)
            .finish()
    }
}

/// A configured SAML SP with its trusted IdPs.
#[derive(Debug)]
pub struct Middleware {
    service_provider: ServiceProvider,
    allow_idp_initiated: bool,
    cookie_name: String,
    cookie_domain: String,
    cookie_max_age: Duration,
    retry_count: u32,
    retry_delay: Duration,
}

impl Middleware {
    /// Resolve `opts` and, if `idp_metadata_url` is set, fetch and register
    /// the IdP metadata.
    pub async fn new(opts: Options) -> Result<Self, SamlSpError> {
        let Options {
            base_url,
            key,
            certificate,
            logger,
            idp_metadata,
            idp_metadata_url,
            http_client,
            cookie_max_age,
            cookie_name,
            retry_count,
            retry_delay,
            allow_idp_initiated,
            force_authn,
        } = opts;

        let cookie_domain = base_url
            .host_str()
            .ok_or_else(|| ConfigError::Validation(format!("base URL {base_url} has no host")))?
            .to_owned();
        let metadata_url = endpoint_url(&base_url, METADATA_PATH)?;
        let acs_url = endpoint_url(&base_url, ACS_PATH)?;

        let cookie_name = match cookie_name {
            None => DEFAULT_COOKIE_NAME.to_owned(),
            Some(name) if name.trim().is_empty() => {
                return Err(ConfigError::Validation("cookie name must not be empty".into()).into());
            }
            Some(name) => name,
        };

        let service_provider = ServiceProvider::new(
            key,
            certificate,
            logger.unwrap_or_else(default_logger),
            metadata_url,
            acs_url,
            IdpRegistry::with_primary(idp_metadata),
            ForceAuthn::from(force_authn),
        );

        let mut middleware = Self {
            service_provider,
            allow_idp_initiated,
            cookie_name,
            cookie_domain,
            cookie_max_age: cookie_max_age
                .filter(|age| !age.is_zero())
                .unwrap_or(DEFAULT_COOKIE_MAX_AGE),
            retry_count: retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
            retry_delay: retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        };

        debug!(
            metadata_url = %middleware.service_provider.metadata_url(),
            acs_url = %middleware.service_provider.acs_url(),
            cookie_domain = %middleware.cookie_domain,
            "SAML service provider configured"
        );

        if let Some(url) = idp_metadata_url {
            middleware.fetch_idp_metadata(http_client, &url).await?;
        }

        Ok(middleware)
    }

    pub fn service_provider(&self) -> &ServiceProvider {
        &self.service_provider
    }

    pub fn allow_idp_initiated(&self) -> bool {
        self.allow_idp_initiated
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Host of the base URL, without port.
    pub fn cookie_domain(&self) -> &str {
        &self.cookie_domain
    }

    pub fn cookie_max_age(&self) -> Duration {
        self.cookie_max_age
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Parse a metadata document and trust the IdP it describes.
    ///
    /// The IdP becomes the primary descriptor. On error the registry is left
    /// untouched.
    pub fn add_idp_metadata(&mut self, metadata: &[u8]) -> Result<(), MetadataError> {
        let entity = metadata::parse_idp_metadata(metadata)?;
        let entity_id = metadata::entity_id(&entity)
            .unwrap_or_default()
            .to_owned();
        let replaced = self.service_provider.idps_mut().insert(entity)?;

        info!(
            entity_id = %entity_id,
            replaced = replaced.is_some(),
            "Registered IdP metadata"
        );
        Ok(())
    }

    /// Fetch remote IdP metadata with retries and register it.
    ///
    /// Uses `client` if given, otherwise a default HTTP client. Network
    /// failures are retried [`retry_count`](Self::retry_count) times; a
    /// document that fails to parse is not re-fetched.
    pub async fn fetch_idp_metadata(
        &mut self,
        client: Option<SharedMetadataClient>,
        url: &Url,
    ) -> Result<(), SamlSpError> {
        self.fetch_and_add(client, url, None).await
    }

    /// Like [`fetch_idp_metadata`](Self::fetch_idp_metadata), returning
    /// [`FetchError::Cancelled`](crate::FetchError::Cancelled) as soon as
    /// `cancel` fires, including during a retry delay.
    pub async fn fetch_idp_metadata_with_cancel(
        &mut self,
        client: Option<SharedMetadataClient>,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<(), SamlSpError> {
        self.fetch_and_add(client, url, Some(cancel)).await
    }

    async fn fetch_and_add(
        &mut self,
        client: Option<SharedMetadataClient>,
        url: &Url,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), SamlSpError> {
        let client = client.unwrap_or_else(default_client);
        let request = metadata_request(url)?;
        let policy = RetryPolicy {
            retry_count: self.retry_count,
            delay: self.retry_delay,
        };

        let body = fetch_with_retry(
            client.as_ref(),
            &request,
            policy,
            self.service_provider.logger().as_ref(),
            cancel,
        )
        .await?;

        debug!(url = %url, bytes = body.len(), "Fetched IdP metadata");
        self.add_idp_metadata(&body)?;
        Ok(())
    }
}

/// Append `suffix` to the path of `base`, dropping a trailing `/` first.
fn endpoint_url(base: &Url, suffix: &str) -> Result<Url, ConfigError> {
    if base.cannot_be_a_base() {
        return Err(ConfigError::Validation(format!(
            "base URL {base} cannot carry a path"
        )));
    }

    let mut url = base.clone();
    url.set_path(&format!("{}{suffix}", base.path().trim_end_matches('/')));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};

    use rstest::rstest;
    use tracing::Level;

    use super::*;
    use crate::{
        fetch::{
            FetchError,
            test_support::{Scripted, ScriptedClient},
        },
        logger::test_support::RecordingLogger,
        metadata::fixtures::{entities, idp_entity, idp_entity_element, sp_entity_element},
        service_provider::test_support::generate_test_credentials,
    };

    fn credentials() -> (PKey<Private>, X509) {
        static CREDENTIALS: OnceLock<(PKey<Private>, X509)> = OnceLock::new();
        CREDENTIALS.get_or_init(generate_test_credentials).clone()
    }

    fn options(base_url: &str) -> Options {
        let (key, certificate) = credentials();
        let mut opts = Options::new(Url::parse(base_url).unwrap(), key, certificate);
        opts.retry_delay = Some(Duration::ZERO);
        opts
    }

    fn options_with_fetch(client: &Arc<ScriptedClient>, retry_count: u32) -> Options {
        let mut opts = options("https://sp.example.com");
        opts.idp_metadata_url = Some(Url::parse("https://idp.example.com/metadata").unwrap());
        opts.http_client = Some(client.clone());
        opts.retry_count = Some(retry_count);
        opts
    }

    #[rstest]
    #[case::bare_host(
        "https://sp.example.com",
        "https://sp.example.com/saml/metadata",
        "https://sp.example.com/saml/acs"
    )]
    #[case::trailing_slash(
        "https://sp.example.com/",
        "https://sp.example.com/saml/metadata",
        "https://sp.example.com/saml/acs"
    )]
    #[case::sub_path(
        "https://example.com/app",
        "https://example.com/app/saml/metadata",
        "https://example.com/app/saml/acs"
    )]
    #[case::sub_path_trailing_slash(
        "https://example.com/app/",
        "https://example.com/app/saml/metadata",
        "https://example.com/app/saml/acs"
    )]
    #[case::port_and_query(
        "http://localhost:8000/sp?tenant=acme",
        "http://localhost:8000/sp/saml/metadata?tenant=acme",
        "http://localhost:8000/sp/saml/acs?tenant=acme"
    )]
    #[tokio::test]
    async fn test_endpoint_derivation(
        #[case] base_url: &str,
        #[case] metadata_url: &str,
        #[case] acs_url: &str,
    ) {
        let mut opts = options(base_url);
        opts.cookie_name = Some("session".into());
        opts.retry_count = Some(1);
        opts.allow_idp_initiated = true;

        let middleware = Middleware::new(opts).await.unwrap();

        let sp = middleware.service_provider();
        assert_eq!(sp.metadata_url().as_str(), metadata_url);
        assert_eq!(sp.acs_url().as_str(), acs_url);
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let (key, certificate) = credentials();
        let opts = Options::new(
            Url::parse("https://sp.example.com:8443/").unwrap(),
            key,
            certificate,
        );

        let middleware = Middleware::new(opts).await.unwrap();

        assert_eq!(middleware.retry_count(), DEFAULT_RETRY_COUNT);
        assert_eq!(middleware.retry_delay(), DEFAULT_RETRY_DELAY);
        assert_eq!(middleware.cookie_max_age(), DEFAULT_COOKIE_MAX_AGE);
        assert_eq!(middleware.cookie_name(), DEFAULT_COOKIE_NAME);
        assert_eq!(middleware.cookie_domain(), "sp.example.com");
        assert!(!middleware.allow_idp_initiated());
        assert_eq!(
            middleware.service_provider().force_authn(),
            ForceAuthn::Disabled
        );
    }

    #[tokio::test]
    async fn test_overrides_kept() {
        let mut opts = options("https://sp.example.com");
        opts.cookie_max_age = Some(Duration::from_secs(600));
        opts.cookie_name = Some("saml_session".into());
        opts.retry_count = Some(2);
        opts.allow_idp_initiated = true;
        opts.force_authn = true;

        let middleware = Middleware::new(opts).await.unwrap();

        assert_eq!(middleware.cookie_max_age(), Duration::from_secs(600));
        assert_eq!(middleware.cookie_name(), "saml_session");
        assert_eq!(middleware.retry_count(), 2);
        assert!(middleware.allow_idp_initiated());
        assert_eq!(
            middleware.service_provider().force_authn(),
            ForceAuthn::Enabled
        );
    }

    #[tokio::test]
    async fn test_zero_cookie_max_age_uses_default() {
        let mut opts = options("https://sp.example.com");
        opts.cookie_max_age = Some(Duration::ZERO);

        let middleware = Middleware::new(opts).await.unwrap();

        assert_eq!(middleware.cookie_max_age(), DEFAULT_COOKIE_MAX_AGE);
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    #[case::tab("\t")]
    #[tokio::test]
    async fn test_empty_cookie_name_rejected(#[case] name: &str) {
        let mut opts = options("https://sp.example.com");
        opts.cookie_name = Some(name.to_owned());

        let err = Middleware::new(opts).await.unwrap_err();

        assert!(matches!(err, SamlSpError::Config(ConfigError::Validation(_))));
    }

    #[rstest]
    #[case::no_host("unix:/run/sp.sock")]
    #[case::cannot_be_a_base("mailto:sso@example.com")]
    #[tokio::test]
    async fn test_unusable_base_url_rejected(#[case] base_url: &str) {
        let err = Middleware::new(options(base_url)).await.unwrap_err();

        assert!(matches!(err, SamlSpError::Config(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_no_metadata_url_means_no_fetch() {
        let client = ScriptedClient::new([Scripted::Body(idp_entity("https://idp.example.com"))]);
        let mut opts = options("https://sp.example.com");
        opts.http_client = Some(client.clone());

        let middleware = Middleware::new(opts).await.unwrap();

        assert_eq!(client.calls(), 0);
        assert!(middleware.service_provider().idp_metadatas().is_empty());
        assert!(middleware.service_provider().idp_metadata().is_none());
    }

    #[tokio::test]
    async fn test_initial_idp_seeds_primary_only() {
        let mut opts = options("https://sp.example.com");
        opts.idp_metadata = Some(
            metadata::parse_idp_metadata(idp_entity("https://seed.example.com").as_bytes())
                .unwrap(),
        );

        let middleware = Middleware::new(opts).await.unwrap();

        let sp = middleware.service_provider();
        assert!(sp.idp_metadatas().is_empty());
        assert_eq!(
            sp.idp_metadata().and_then(metadata::entity_id),
            Some("https://seed.example.com")
        );
    }

    #[tokio::test]
    async fn test_fetch_during_construction_registers_entity() {
        let client = ScriptedClient::new([Scripted::Body(idp_entity("https://idp.example.com"))]);

        let middleware = Middleware::new(options_with_fetch(&client, 3)).await.unwrap();

        assert_eq!(client.calls(), 1);
        let idps = middleware.service_provider().idp_metadatas();
        assert_eq!(idps.len(), 1);
        assert!(idps.contains("https://idp.example.com"));
    }

    #[tokio::test]
    async fn test_fetch_recovers_after_transient_failures() {
        let client = ScriptedClient::failing_then(3, idp_entity("https://idp.example.com"));
        let logger = Arc::new(RecordingLogger::default());
        let mut opts = options_with_fetch(&client, 3);
        opts.logger = Some(logger.clone());

        let middleware = Middleware::new(opts).await.unwrap();

        assert_eq!(client.calls(), 4);
        assert!(
            middleware
                .service_provider()
                .idp_metadatas()
                .contains("https://idp.example.com")
        );

        let warnings = logger.messages();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().all(|(level, _)| *level == Level::WARN));
    }

    #[tokio::test]
    async fn test_fetch_exhaustion_fails_construction() {
        let client = ScriptedClient::always_failing();

        let err = Middleware::new(options_with_fetch(&client, 2))
            .await
            .unwrap_err();

        assert_eq!(client.calls(), 3);
        match err {
            SamlSpError::Fetch(FetchError::Transport(e)) => {
                assert!(e.to_string().contains("attempt 3"))
            }
            e => panic!("Expected Fetch(Transport), got: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_parse_failure_is_not_refetched() {
        let client = ScriptedClient::new([
            Scripted::Body("<html><body>Sign in</body></html>".into()),
            Scripted::Body(idp_entity("https://idp.example.com")),
        ]);

        let err = Middleware::new(options_with_fetch(&client, 5))
            .await
            .unwrap_err();

        assert_eq!(client.calls(), 1);
        assert!(matches!(
            err,
            SamlSpError::Metadata(MetadataError::UnexpectedRoot { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_selects_idp_from_collection() {
        let client = ScriptedClient::new([Scripted::Body(entities(&[
            sp_entity_element("https://sp.partner.example.com"),
            idp_entity_element("https://idp.example.com"),
        ]))]);

        let middleware = Middleware::new(options_with_fetch(&client, 0)).await.unwrap();

        let idps = middleware.service_provider().idp_metadatas();
        assert_eq!(idps.entity_ids(), vec!["https://idp.example.com"]);
    }

    #[tokio::test]
    async fn test_second_entity_moves_primary() {
        let mut middleware = Middleware::new(options("https://sp.example.com"))
            .await
            .unwrap();

        middleware
            .add_idp_metadata(idp_entity("https://idp-a.example.com").as_bytes())
            .unwrap();
        middleware
            .add_idp_metadata(idp_entity("https://idp-b.example.com").as_bytes())
            .unwrap();

        let sp = middleware.service_provider();
        assert_eq!(sp.idp_metadatas().len(), 2);
        assert!(sp.idp_metadatas().contains("https://idp-a.example.com"));
        assert_eq!(
            sp.idp_metadata().and_then(metadata::entity_id),
            Some("https://idp-b.example.com")
        );
    }

    #[tokio::test]
    async fn test_collection_without_idp_leaves_registry_unchanged() {
        let mut middleware = Middleware::new(options("https://sp.example.com"))
            .await
            .unwrap();
        middleware
            .add_idp_metadata(idp_entity("https://idp-a.example.com").as_bytes())
            .unwrap();

        let err = middleware
            .add_idp_metadata(
                entities(&[sp_entity_element("https://sp.partner.example.com")]).as_bytes(),
            )
            .unwrap_err();

        assert!(matches!(err, MetadataError::NoIdpEntity));
        let sp = middleware.service_provider();
        assert_eq!(sp.idp_metadatas().entity_ids(), vec!["https://idp-a.example.com"]);
        assert_eq!(
            sp.idp_metadata().and_then(metadata::entity_id),
            Some("https://idp-a.example.com")
        );
    }

    #[tokio::test]
    async fn test_fetch_after_construction() {
        let mut middleware = Middleware::new(options("https://sp.example.com"))
            .await
            .unwrap();
        let client = ScriptedClient::new([Scripted::Body(idp_entity("https://idp.example.com"))]);

        middleware
            .fetch_idp_metadata(
                Some(client.clone()),
                &Url::parse("https://idp.example.com/metadata").unwrap(),
            )
            .await
            .unwrap();

        assert!(
            middleware
                .service_provider()
                .idp_metadatas()
                .contains("https://idp.example.com")
        );
    }

    #[tokio::test]
    async fn test_fetch_with_cancel_returns_cancelled() {
        let mut middleware = Middleware::new(options("https://sp.example.com"))
            .await
            .unwrap();
        let client = ScriptedClient::always_failing();
        let token = CancellationToken::new();
        token.cancel();

        let err = middleware
            .fetch_idp_metadata_with_cancel(
                Some(client.clone()),
                &Url::parse("https://idp.example.com/metadata").unwrap(),
                &token,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SamlSpError::Fetch(FetchError::Cancelled)));
        assert_eq!(client.calls(), 0);
        assert!(middleware.service_provider().idp_metadatas().is_empty());
    }

    #[test]
    fn test_options_debug_redacts_key() {
        let debug = format!("{:?}", options("https://sp.example.com"));

        assert!(debug.contains("key: \"****\""));
        assert!(debug.contains("https://sp.example.com/"));
    }
}
