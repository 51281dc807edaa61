use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid provider base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Failure of one submitted fetch request, covering all of its constituent
/// daily calls. The first failing call aborts the rest of the fan-out.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("inventory sync failed: {reason}")]
    Sync { reason: String },

    #[error("fetcher shut down before the request completed")]
    Shutdown,
}
