//! HTTP client for the external inventory provider.
//!
//! Wraps `reqwest` with the provider's authentication header, the per-call
//! timeout, and typed response deserialization.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Url};
use slotsync_core::SlotPayload;

use crate::error::ProviderError;

/// Client for the provider's inventory REST API.
///
/// The base URL is validated at construction and can point at a mock server
/// in tests.
pub struct ProviderClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ProviderClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidBaseUrl`] if `base_url` does not
    /// parse, or [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let normalised = base_url.trim_end_matches('/').to_owned();
        Url::parse(&normalised).map_err(|e| ProviderError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("slotsync/0.1 (inventory-sync)")
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url: normalised,
        })
    }

    /// Fetches the slot array for one `(product, date)` pair.
    ///
    /// Issues `GET {base}/inventory/{product_id}?date=YYYY-MM-DD` with the
    /// `x-api-key` header.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Http`] on network failure, timeout, or a non-2xx
    ///   HTTP status.
    /// - [`ProviderError::Deserialize`] if the response body does not match
    ///   the expected slot-array shape.
    pub async fn fetch_inventory(
        &self,
        product_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<SlotPayload>, ProviderError> {
        let url = self.inventory_url(product_id, date);
        tracing::debug!(product_id, %date, "requesting provider inventory");

        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
            context: url,
            source: e,
        })
    }

    fn inventory_url(&self, product_id: i64, date: NaiveDate) -> String {
        format!(
            "{}/inventory/{}?date={}",
            self.base_url,
            product_id,
            date.format("%Y-%m-%d")
        )
    }
}
