//! Remote IdP metadata retrieval.
//!
//! The HTTP side is abstracted behind [`MetadataClient`] so callers can
//! supply their own client (timeouts, proxies, TLS roots). A plain
//! `reqwest::Client` is used when none is given.

mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode, header};
pub(crate) use retry::{RetryPolicy, fetch_with_retry};
use url::Url;

/// User-Agent sent with every metadata request.
///
/// Some IdPs (OneLogin among them) answer 403 to requests without a
/// recognizable client identity.
pub const USER_AGENT: &str = "samlsp-rs; SAML 2.0 metadata client";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors retrieving a metadata document.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid metadata request: {0}")]
    Request(#[from] http::Error),

    #[error("metadata request failed: {0}")]
    Transport(#[source] BoxError),

    #[error("metadata endpoint returned {status}")]
    Status { status: StatusCode },

    #[error("failed to read metadata response: {0}")]
    Body(#[source] BoxError),

    #[error("metadata fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn transport(error: impl Into<BoxError>) -> Self {
        Self::Transport(error.into())
    }

    pub fn body(error: impl Into<BoxError>) -> Self {
        Self::Body(error.into())
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::Body(_)
        )
    }
}

/// An HTTP client able to perform a metadata GET.
///
/// Implementations must not alter the request; the same request is passed
/// to every attempt.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Send the request and return the status and the full body.
    async fn fetch(&self, request: &Request<()>) -> Result<Response<Bytes>, FetchError>;
}

/// Shared client handle; read-only, so it can back several middlewares.
pub type SharedMetadataClient = Arc<dyn MetadataClient>;

#[async_trait]
impl MetadataClient for reqwest::Client {
    async fn fetch(&self, request: &Request<()>) -> Result<Response<Bytes>, FetchError> {
        let response = self
            .request(request.method().clone(), request.uri().to_string())
            .headers(request.headers().clone())
            .send()
            .await
            .map_err(FetchError::transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(FetchError::body)?;

        let mut out = Response::new(body);
        *out.status_mut() = status;
        Ok(out)
    }
}

/// The client used when the caller does not provide one.
pub fn default_client() -> SharedMetadataClient {
    Arc::new(reqwest::Client::new())
}

/// Build the GET request for a metadata URL.
pub fn metadata_request(url: &Url) -> Result<Request<()>, FetchError> {
    Ok(Request::get(url.as_str())
        .header(header::USER_AGENT, USER_AGENT)
        .body(())?)
}
