use crate::{config::ConfigError, fetch::FetchError, metadata::MetadataError};

/// Errors building a [`Middleware`](crate::Middleware) or adding IdP metadata.
#[derive(Debug, thiserror::Error)]
pub enum SamlSpError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl SamlSpError {
    /// Whether the failure came from the network side and a later attempt
    /// might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_retryable())
    }
}
