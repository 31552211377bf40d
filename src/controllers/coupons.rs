use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiResult, AppError};
use crate::models::DiscountType;
use crate::services::coupons::{self, NewCoupon, Validation};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/coupons", post(create_coupon))
        .route("/coupons/validate", post(validate_coupon))
}

// POST /api/coupons/validate
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ValidateCouponRequest {
    #[validate(length(min = 1, message = "code is required"))]
    code: String,
    #[validate(range(min = 0, message = "amount must not be negative"))]
    amount: i64,
}

async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateCouponRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let body = match coupons::validate(&state.db.pool, &req.code, req.amount).await? {
        Validation::Valid { coupon, discount } => json!({
            "valid": true,
            "code": coupon.code,
            "discount": discount,
        }),
        Validation::Rejected(reason) => json!({
            "valid": false,
            "reason": reason,
        }),
    };

    Ok(Json(body))
}

// POST /api/coupons
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateCouponRequest {
    #[validate(length(min = 2, max = 40, message = "code must be 2-40 characters"))]
    code: String,
    discount_type: DiscountType,
    #[validate(range(min = 1, message = "discount value must be positive"))]
    discount_value: i64,
    #[serde(default = "default_max_uses")]
    #[validate(range(min = 1, message = "maxUses must be at least 1"))]
    max_uses: i32,
    valid_until: DateTime<Utc>,
}

fn default_max_uses() -> i32 {
    1
}

async fn create_coupon(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCouponRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if req.discount_type == DiscountType::Percent && req.discount_value > 100 {
        return Err(AppError::Validation(
            "Percent discount cannot exceed 100".to_string(),
        ));
    }

    let coupon = coupons::create(
        &state.db.pool,
        NewCoupon {
            code: req.code,
            discount_type: req.discount_type,
            discount_value: req.discount_value,
            max_uses: req.max_uses,
            valid_until: req.valid_until,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "coupon": coupon })),
    ))
}
