mod experience;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{request_id, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &slotsync_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/experience/{id}/slots",
            get(experience::get_slots),
        )
        .route(
            "/api/v1/experience/{id}/dates",
            get(experience::get_available_dates),
        )
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match slotsync_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::experience::{DateItem, PaxItem, PriceItem, SlotItem};
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use slotsync_core::{PaxAvailabilityPayload, PricePayload, SlotPayload};
    use tower::ServiceExt;

    fn make_slot_payload(date: NaiveDate) -> SlotPayload {
        SlotPayload {
            provider_slot_id: 9911,
            start_date: date,
            start_time: "09:00".to_string(),
            end_time: "11:00".to_string(),
            remaining: 12,
            variant_id: Some(2),
            currency_code: "SGD".to_string(),
            pax_availability: vec![PaxAvailabilityPayload {
                category: "ADULT".to_string(),
                name: Some("Adult".to_string()),
                description: Some("13 years and above".to_string()),
                max: Some(10),
                min: Some(1),
                remaining: 12,
                is_primary: Some(true),
                price: PricePayload {
                    final_price: Decimal::new(3550, 2),
                    original_price: Some(Decimal::new(4000, 2)),
                    discount: Some(Decimal::new(1125, 2)),
                    currency_code: "SGD".to_string(),
                },
            }],
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&body).expect("json parse");
        (status, json)
    }

    #[test]
    fn slot_item_serializes_camel_case() {
        let item = SlotItem {
            start_date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("date"),
            start_time: "09:00".to_string(),
            end_time: "11:00".to_string(),
            remaining: 12,
            pax_availability: vec![PaxItem {
                category_type: "ADULT".to_string(),
                category: Some("Adult".to_string()),
                description: None,
                max: Some(10),
                min: Some(1),
                remaining: 12,
                price: Some(PriceItem {
                    final_price: Decimal::new(3550, 2),
                    original_price: None,
                    discount: Decimal::ZERO,
                    currency_code: "SGD".to_string(),
                }),
            }],
        };
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["startDate"], "2026-03-14");
        assert_eq!(json["paxAvailability"][0]["type"], "ADULT");
        assert_eq!(json["paxAvailability"][0]["price"]["finalPrice"], "35.50");
    }

    #[test]
    fn date_item_with_no_price_serializes_null() {
        let item = DateItem {
            date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("date"),
            price: None,
        };
        let json = serde_json::to_value(&item).expect("serialize");
        assert!(json["price"].is_null());
    }

    #[test]
    fn api_error_not_found_maps_to_404() {
        let response = ApiError::new("req-1", "not_found", "nothing here").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn api_error_bad_request_maps_to_400() {
        let response = ApiError::new("req-1", "bad_request", "bad date").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_returns_ok(pool: sqlx::PgPool) {
        let app = build_app(AppState { pool });
        let (status, json) = get_json(app, "/api/v1/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
        assert!(json["meta"]["requestId"].is_string());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn slots_without_date_param_is_a_bad_request(pool: sqlx::PgPool) {
        let app = build_app(AppState { pool });
        let (status, json) = get_json(app, "/api/v1/experience/14/slots").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn slots_with_malformed_date_is_a_bad_request(pool: sqlx::PgPool) {
        let app = build_app(AppState { pool });
        let (status, _) = get_json(app, "/api/v1/experience/14/slots?date=14-03-2026").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn slots_for_unknown_product_returns_404(pool: sqlx::PgPool) {
        let app = build_app(AppState { pool });
        let (status, json) = get_json(app, "/api/v1/experience/999/slots?date=2026-03-14").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn slots_returns_stored_snapshot_with_pax_breakdown(pool: sqlx::PgPool) {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).expect("date");
        slotsync_db::insert_slot_graph(&pool, 14, &make_slot_payload(date))
            .await
            .expect("seed slot");

        let app = build_app(AppState { pool });
        let (status, json) = get_json(app, "/api/v1/experience/14/slots?date=2026-03-14").await;

        assert_eq!(status, StatusCode::OK);
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        let slot = &data[0];
        assert_eq!(slot["startDate"], "2026-03-14");
        assert_eq!(slot["remaining"], 12);
        let pax = &slot["paxAvailability"][0];
        assert_eq!(pax["type"], "ADULT");
        assert_eq!(pax["category"], "Adult");
        assert_eq!(pax["price"]["finalPrice"], "35.50");
        assert_eq!(pax["price"]["currencyCode"], "SGD");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn dates_for_unknown_product_returns_404(pool: sqlx::PgPool) {
        let app = build_app(AppState { pool });
        let (status, json) = get_json(app, "/api/v1/experience/999/dates").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn dates_lists_upcoming_dates_with_prices(pool: sqlx::PgPool) {
        let today = Utc::now().date_naive();
        let soon = today + chrono::Days::new(5);
        let later = today + chrono::Days::new(12);
        // Outside the 60-day horizon; must not appear.
        let far = today + chrono::Days::new(90);

        for (date, slot_id) in [(soon, 1), (later, 2), (far, 3)] {
            let mut payload = make_slot_payload(date);
            payload.provider_slot_id = slot_id;
            slotsync_db::insert_slot_graph(&pool, 14, &payload)
                .await
                .expect("seed slot");
        }

        let app = build_app(AppState { pool });
        let (status, json) = get_json(app, "/api/v1/experience/14/dates").await;

        assert_eq!(status, StatusCode::OK);
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["date"], soon.to_string());
        assert_eq!(data[1]["date"], later.to_string());
        assert_eq!(data[0]["price"]["finalPrice"], "35.50");
    }
}
