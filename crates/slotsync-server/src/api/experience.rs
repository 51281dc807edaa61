//! Read projections over stored inventory snapshots.
//!
//! Both endpoints only ever read; job and inventory state are mutated by the
//! sync pipeline alone.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use slotsync_db::SlotPaxRow;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

/// How far ahead the available-dates projection looks.
const DATES_HORIZON_DAYS: u64 = 60;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SlotItem {
    pub(super) start_date: NaiveDate,
    pub(super) start_time: String,
    pub(super) end_time: String,
    pub(super) remaining: i32,
    pub(super) pax_availability: Vec<PaxItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PaxItem {
    #[serde(rename = "type")]
    pub(super) category_type: String,
    pub(super) category: Option<String>,
    pub(super) description: Option<String>,
    pub(super) max: Option<i32>,
    pub(super) min: Option<i32>,
    pub(super) remaining: i32,
    pub(super) price: Option<PriceItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PriceItem {
    pub(super) final_price: Decimal,
    pub(super) original_price: Option<Decimal>,
    pub(super) discount: Decimal,
    pub(super) currency_code: String,
}

#[derive(Debug, Serialize)]
pub(super) struct DateItem {
    pub(super) date: NaiveDate,
    pub(super) price: Option<PriceItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SlotsQuery {
    pub date: Option<String>,
}

/// `GET /api/v1/experience/{id}/slots?date=YYYY-MM-DD`
pub(super) async fn get_slots(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<ApiResponse<Vec<SlotItem>>>, ApiError> {
    let Some(raw_date) = query.date else {
        return Err(ApiError::new(
            req_id.0,
            "bad_request",
            "missing date parameter",
        ));
    };
    let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").map_err(|_| {
        ApiError::new(
            req_id.0.clone(),
            "bad_request",
            "invalid date parameter; expected YYYY-MM-DD",
        )
    })?;

    let rows = slotsync_db::list_slots_with_pax(&state.pool, product_id, date)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if rows.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            "no slots available for the given product and date",
        ));
    }

    Ok(Json(ApiResponse {
        data: group_slots(rows),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// `GET /api/v1/experience/{id}/dates`
pub(super) async fn get_available_dates(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<DateItem>>>, ApiError> {
    let today = Utc::now().date_naive();
    let until = today
        .checked_add_days(Days::new(DATES_HORIZON_DAYS))
        .unwrap_or(today);

    let rows = slotsync_db::list_available_dates(&state.pool, product_id, today, until)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if rows.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            "no available dates found",
        ));
    }

    let data = rows
        .into_iter()
        .map(|row| DateItem {
            date: row.start_date,
            price: row.final_price.map(|final_price| PriceItem {
                final_price,
                original_price: row.original_price,
                discount: row.discount.unwrap_or_default(),
                currency_code: row.price_currency.unwrap_or_default(),
            }),
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Folds the flat slot/pax join back into nested slot items. Rows arrive
/// ordered by slot id, pax rows directly after their slot.
fn group_slots(rows: Vec<SlotPaxRow>) -> Vec<SlotItem> {
    let mut items: Vec<SlotItem> = Vec::new();
    let mut current_slot: Option<i64> = None;

    for row in rows {
        if current_slot != Some(row.slot_id) {
            current_slot = Some(row.slot_id);
            items.push(SlotItem {
                start_date: row.start_date,
                start_time: row.start_time.clone(),
                end_time: row.end_time.clone(),
                remaining: row.slot_remaining,
                pax_availability: Vec::new(),
            });
        }

        let Some(category_type) = row.category_id else {
            // Slot with no pax rows; the LEFT JOIN produced a bare slot row.
            continue;
        };
        let pax = PaxItem {
            category_type,
            category: row.category_name,
            description: row.category_description,
            max: row.pax_max,
            min: row.pax_min,
            remaining: row.pax_remaining.unwrap_or(0),
            price: row.final_price.map(|final_price| PriceItem {
                final_price,
                original_price: row.original_price,
                discount: row.discount.unwrap_or_default(),
                currency_code: row.price_currency.unwrap_or_default(),
            }),
        };
        if let Some(item) = items.last_mut() {
            item.pax_availability.push(pax);
        }
    }

    items
}
