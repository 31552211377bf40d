use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiResult, AppError};
use crate::models::{AbandonReason, TicketType};
use crate::services::feedback::{self, ExitInput};
use crate::services::notify::EventType;
use crate::services::reconcile::{self, PaymentSignal};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/checkout/abandon", post(abandon_checkout))
}

// POST /api/checkout/abandon
//
// Fired on the bare widget dismiss (no reason yet) and again when the exit
// survey is submitted; both calls land on the same feedback row.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct AbandonRequest {
    order_id: Option<String>,
    #[validate(email(message = "email must be valid"))]
    email: Option<String>,
    ticket_type: Option<TicketType>,
    reason: Option<AbandonReason>,
    note: Option<String>,
    #[serde(default)]
    accept_coupon: bool,
}

async fn abandon_checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AbandonRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    // Settle the order first: PENDING moves to ABANDONED, anything terminal
    // is acknowledged untouched.
    if let Some(order_id) = req.order_id.as_deref() {
        reconcile::settle(
            &state.db.pool,
            &state.verifier,
            order_id,
            PaymentSignal::Dismissed,
        )
        .await?;
    }

    let (feedback, offered) = feedback::record_exit(
        &state.db.pool,
        &state.config.retention,
        ExitInput {
            order_id: req.order_id,
            email: req.email,
            ticket_type: req.ticket_type,
            reason: req.reason.unwrap_or(AbandonReason::Unknown),
            notes: req.note,
            accepted_coupon: req.accept_coupon,
        },
    )
    .await?;

    state.notifier.emit(
        EventType::FeedbackReceived,
        json!({
            "feedbackId": feedback.id,
            "orderId": feedback.order_id,
            "email": feedback.email,
            "reason": feedback.abandon_reason,
            "wasOfferedCoupon": feedback.was_offered_coupon,
            "acceptedCoupon": feedback.accepted_coupon,
        }),
    );

    let mut body = json!({ "feedbackRecorded": true });
    if let Some(code) = offered {
        body["offeredCoupon"] = json!(code);
    }

    Ok(Json(body))
}
