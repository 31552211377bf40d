//! Payment order orchestrator.
//!
//! `get_or_create` is the double-charge guard: an attendee with an open order
//! gets that order back instead of a second gateway charge. The partial
//! unique index on `payment_orders` backs the same rule at the storage level,
//! so even two fully interleaved calls produce at most one open row.

use chrono::Utc;
use sqlx::{Pool, Postgres};
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{amount_due, NewPaymentOrder, PaymentOrder, PaymentStatus};
use crate::services::gateway::GatewayClient;
use crate::services::registration;

pub(crate) const ORDER_COLUMNS: &str =
    "order_id, attendee_id, amount, currency, status, payment_id, receipt, created_at, updated_at";

/// Single currency the gateway account is configured for.
pub const SUPPORTED_CURRENCY: &str = "INR";

/// Returns the attendee's open order, creating one with the gateway if none
/// exists. The amount is always recomputed server-side from the registered
/// ticket and discount; `claimed_amount` is what the browser displayed and
/// only serves to catch a stale checkout page.
pub async fn get_or_create(
    pool: &Pool<Postgres>,
    gateway: &GatewayClient,
    attendee_id: i64,
    claimed_amount: i64,
    currency: &str,
) -> Result<PaymentOrder, AppError> {
    if currency != SUPPORTED_CURRENCY {
        return Err(AppError::Validation(format!(
            "Only {SUPPORTED_CURRENCY} payments are supported"
        )));
    }

    let attendee = registration::find_by_id(pool, attendee_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attendee not found".to_string()))?;

    match attendee.payment_status {
        PaymentStatus::Pending => {}
        PaymentStatus::Completed => {
            return Err(AppError::Conflict(
                "Registration is already paid".to_string(),
            ));
        }
        PaymentStatus::Abandoned | PaymentStatus::Failed => {
            return Err(AppError::Conflict(
                "Registration is not awaiting payment, register again first".to_string(),
            ));
        }
    }

    // Idempotent path: hand back the open order untouched.
    if let Some(existing) = find_open_for_attendee(pool, attendee_id).await? {
        info!(
            "Returning existing open order {} for attendee {}",
            existing.order_id, attendee_id
        );
        return Ok(existing);
    }

    let amount = amount_due(attendee.ticket_type.price_minor(), attendee.discount_amount);
    if claimed_amount != amount {
        warn!(
            "Client amount {} disagrees with server amount {} for attendee {}",
            claimed_amount, amount, attendee_id
        );
        return Err(AppError::Validation(
            "Payable amount does not match the registered ticket, refresh and retry".to_string(),
        ));
    }

    let receipt = format!("reg_{}_{}", attendee_id, Utc::now().timestamp());
    let gateway_order = gateway.create_order(amount, currency, &receipt).await?;

    let new_order = NewPaymentOrder {
        order_id: gateway_order.id,
        attendee_id,
        amount,
        currency: currency.to_string(),
        receipt,
    };

    // A racing call may have landed its row between the lookup above and
    // this insert; the partial index lets only one through.
    let inserted: Option<PaymentOrder> = sqlx::query_as(&format!(
        "INSERT INTO payment_orders (order_id, attendee_id, amount, currency, receipt)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (attendee_id) WHERE status = 'PENDING' DO NOTHING
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(&new_order.order_id)
    .bind(new_order.attendee_id)
    .bind(new_order.amount)
    .bind(&new_order.currency)
    .bind(&new_order.receipt)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(order) => {
            info!(
                "Payment order {} opened: attendee={}, amount={} {}",
                order.order_id, order.attendee_id, order.amount, order.currency
            );
            Ok(order)
        }
        None => {
            warn!(
                "Concurrent order creation for attendee {}, returning the winner",
                attendee_id
            );
            find_open_for_attendee(pool, attendee_id)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict("Order state changed during creation, retry".to_string())
                })
        }
    }
}

pub async fn find_open_for_attendee(
    pool: &Pool<Postgres>,
    attendee_id: i64,
) -> Result<Option<PaymentOrder>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM payment_orders
         WHERE attendee_id = $1 AND status = 'PENDING'"
    ))
    .bind(attendee_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_order_id(
    pool: &Pool<Postgres>,
    order_id: &str,
) -> Result<Option<PaymentOrder>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM payment_orders WHERE order_id = $1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await
}
