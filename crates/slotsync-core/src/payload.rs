//! Provider payload types.
//!
//! The inventory endpoint returns a JSON array of slot descriptors in
//! camelCase. These structs are the wire contract between the provider
//! client, the rate-limited fetcher, and the inventory sink.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One bookable time window for a product on a given date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPayload {
    pub provider_slot_id: i64,
    pub start_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub remaining: i32,
    #[serde(default)]
    pub variant_id: Option<i32>,
    pub currency_code: String,
    #[serde(default)]
    pub pax_availability: Vec<PaxAvailabilityPayload>,
}

/// Per-category availability and pricing within a slot.
///
/// `r#type` is the provider's category code (e.g. `ADULT`); it keys the
/// shared pax-category dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaxAvailabilityPayload {
    #[serde(rename = "type")]
    pub category: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max: Option<i32>,
    #[serde(default)]
    pub min: Option<i32>,
    pub remaining: i32,
    #[serde(default)]
    pub is_primary: Option<bool>,
    pub price: PricePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePayload {
    pub final_price: Decimal,
    #[serde(default)]
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    pub currency_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_payload_parses_provider_shape() {
        let json = serde_json::json!([{
            "providerSlotId": 9911,
            "startDate": "2026-03-14",
            "startTime": "09:00",
            "endTime": "11:00",
            "remaining": 12,
            "variantId": 2,
            "currencyCode": "SGD",
            "paxAvailability": [{
                "type": "ADULT",
                "name": "Adult",
                "description": "13 years and above",
                "min": 1,
                "max": 10,
                "remaining": 12,
                "isPrimary": true,
                "price": {
                    "finalPrice": "35.50",
                    "originalPrice": "40.00",
                    "discount": "11.25",
                    "currencyCode": "SGD"
                }
            }]
        }]);

        let slots: Vec<SlotPayload> = serde_json::from_value(json).expect("parse payload");
        assert_eq!(slots.len(), 1);
        let slot = &slots[0];
        assert_eq!(slot.provider_slot_id, 9911);
        assert_eq!(slot.start_date.to_string(), "2026-03-14");
        assert_eq!(slot.pax_availability.len(), 1);
        let pax = &slot.pax_availability[0];
        assert_eq!(pax.category, "ADULT");
        assert_eq!(pax.is_primary, Some(true));
        assert_eq!(pax.price.final_price.to_string(), "35.50");
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let json = serde_json::json!({
            "providerSlotId": 5,
            "startDate": "2026-03-14",
            "startTime": "10:00",
            "endTime": "10:30",
            "remaining": 4,
            "currencyCode": "USD"
        });

        let slot: SlotPayload = serde_json::from_value(json).expect("parse slot");
        assert_eq!(slot.variant_id, None);
        assert!(slot.pax_availability.is_empty());
    }
}
