//! Bounded retry loop for metadata fetches.
//!
//! Unlike provider calls this runs once at startup, so a fixed delay between
//! attempts is used: no backoff, no jitter.

use std::time::Duration;

use bytes::Bytes;
use http::{Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug};

use super::{FetchError, MetadataClient};
use crate::logger::Logger;

/// Retry settings for a metadata fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Additional attempts after the first one.
    pub retry_count: u32,
    /// Wait between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1) // +1 for initial attempt
    }
}

/// Fetch a metadata document, retrying failed attempts.
///
/// Transport errors, non-200 responses and body read errors are retried up
/// to `policy.retry_count` times; every intermediate failure is reported to
/// `logger` at warning level. Returns the body of the first 200 response, or
/// the last error once attempts are exhausted.
pub(crate) async fn fetch_with_retry(
    client: &dyn MetadataClient,
    request: &Request<()>,
    policy: RetryPolicy,
    logger: &dyn Logger,
    cancel: Option<&CancellationToken>,
) -> Result<Bytes, FetchError> {
    let max_attempts = policy.max_attempts();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(FetchError::Cancelled),
                result = fetch_once(client, request) => result,
            },
            None => fetch_once(client, request).await,
        };

        let error = match result {
            Ok(body) => {
                if attempt > 1 {
                    debug!(
                        url = %request.uri(),
                        attempt = attempt,
                        "Metadata fetch succeeded after retry"
                    );
                }
                return Ok(body);
            }
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= max_attempts {
            debug!(
                url = %request.uri(),
                error = %error,
                attempts = attempt,
                "Metadata fetch failed, giving up"
            );
            return Err(error);
        }

        logger.log(
            Level::WARN,
            format_args!(
                "{}: {} (attempt {}/{}, will retry in {:?})",
                request.uri(),
                error,
                attempt,
                max_attempts,
                policy.delay
            ),
        );

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(policy.delay) => {}
            },
            None => tokio::time::sleep(policy.delay).await,
        }
    }
}

async fn fetch_once(
    client: &dyn MetadataClient,
    request: &Request<()>,
) -> Result<Bytes, FetchError> {
    let response = client.fetch(request).await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(FetchError::Status { status });
    }
    Ok(response.into_body())
}
