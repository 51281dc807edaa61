pub mod client;
pub mod error;
pub mod rate_limit;

pub use client::ProviderClient;
pub use error::{FetchError, ProviderError};
pub use rate_limit::{FetchReport, InventorySink, RateLimitedFetcher};
