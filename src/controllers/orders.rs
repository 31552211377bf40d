use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use validator::Validate;

use crate::error::{ApiResult, AppError};
use crate::models::PaymentOrder;
use crate::services::notify::EventType;
use crate::services::reconcile::{self, PaymentSignal, SignalResult};
use crate::services::{orders, registration};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payment-orders", post(create_order))
        .route("/payment-orders/callback", post(payment_callback))
        .route("/payment-orders/webhook", post(payment_webhook))
}

// POST /api/payment-orders
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    #[validate(range(min = 1, message = "attendeeId must be positive"))]
    attendee_id: i64,
    #[validate(range(min = 1, message = "amount must be positive"))]
    amount: i64,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    orders::SUPPORTED_CURRENCY.to_string()
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let order = orders::get_or_create(
        &state.db.pool,
        &state.gateway,
        req.attendee_id,
        req.amount,
        &req.currency,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "orderId": order.order_id,
        "amount": order.amount,
        "currency": order.currency,
        "receipt": order.receipt,
        "status": order.status,
    })))
}

// Shared by the callback and webhook routes; both carry the same signed
// triple.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentSignalRequest {
    order_id: String,
    payment_id: String,
    signature: String,
}

// POST /api/payment-orders/callback
async fn payment_callback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PaymentSignalRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = reconcile::settle(
        &state.db.pool,
        &state.verifier,
        &req.order_id,
        PaymentSignal::Callback {
            payment_id: req.payment_id,
            signature: req.signature,
        },
    )
    .await?;

    match outcome.result {
        SignalResult::Failed | SignalResult::Rejected => Err(AppError::SignatureVerification),
        SignalResult::Completed => {
            emit_completion(&state, &outcome.order).await;
            Ok(Json(
                json!({ "success": true, "status": outcome.order.status }),
            ))
        }
        // Late duplicate of a settled order: acknowledged, nothing changed.
        _ => Ok(Json(
            json!({ "success": true, "status": outcome.order.status }),
        )),
    }
}

// POST /api/payment-orders/webhook
//
// The gateway delivers at least once and retries on non-2xx, so this route
// answers 200 for every processed delivery, including signature mismatches
// and orders we have no record of. Only an internal failure (e.g. the
// database) propagates, which makes the gateway retry later.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PaymentSignalRequest>,
) -> ApiResult<impl IntoResponse> {
    let settled = reconcile::settle(
        &state.db.pool,
        &state.verifier,
        &req.order_id,
        PaymentSignal::Webhook {
            payment_id: req.payment_id,
            signature: req.signature,
        },
    )
    .await;

    match settled {
        Ok(outcome) => {
            if outcome.result == SignalResult::Completed {
                emit_completion(&state, &outcome.order).await;
            }
        }
        Err(AppError::NotFound(_)) => {
            warn!("Webhook for unknown order {}", req.order_id);
        }
        Err(e) => return Err(e),
    }

    Ok(Json(json!({ "received": true })))
}

/// Payment settled; tell the notification sink. Failures here are logged by
/// the notifier and never surface to the payer.
async fn emit_completion(state: &AppState, order: &PaymentOrder) {
    let attendee = match registration::find_by_id(&state.db.pool, order.attendee_id).await {
        Ok(Some(a)) => a,
        Ok(None) => {
            warn!(
                "Attendee {} missing for completed order {}",
                order.attendee_id, order.order_id
            );
            return;
        }
        Err(e) => {
            warn!(
                "Could not load attendee {} for notification: {}",
                order.attendee_id, e
            );
            return;
        }
    };

    state.notifier.emit(
        EventType::RegistrationCompleted,
        json!({
            "attendeeId": attendee.id,
            "email": attendee.email,
            "firstName": attendee.first_name,
            "ticketType": attendee.ticket_type,
            "orderId": order.order_id,
            "paymentId": order.payment_id,
            "amount": order.amount,
            "currency": order.currency,
        }),
    );
}
