//! Abandonment feedback capture.
//!
//! One row per order: the bare dismiss writes a placeholder reason, the exit
//! survey upgrades it in place. Price-driven exits get a retention coupon
//! offer, but only while the ledger says the code is still usable.

use sqlx::{Pool, Postgres};
use tracing::{info, warn};

use crate::config::RetentionConfig;
use crate::error::AppError;
use crate::models::{AbandonReason, ExitFeedback, TicketType};
use crate::services::coupons::{self, Validation};
use crate::services::registration;

const FEEDBACK_COLUMNS: &str = "id, order_id, email, ticket_type, abandon_reason, \
     additional_notes, was_offered_coupon, accepted_coupon, created_at, updated_at";

#[derive(Debug)]
pub struct ExitInput {
    pub order_id: Option<String>,
    pub email: Option<String>,
    pub ticket_type: Option<TicketType>,
    pub reason: AbandonReason,
    pub notes: Option<String>,
    /// The user tapped the retention offer in the exit survey.
    pub accepted_coupon: bool,
}

/// Records (or upgrades) the exit feedback for a checkout. Returns the row
/// and the retention code when one was offered on this call.
pub async fn record_exit(
    pool: &Pool<Postgres>,
    retention: &RetentionConfig,
    input: ExitInput,
) -> Result<(ExitFeedback, Option<String>), AppError> {
    // Backfill identity from the registration when the survey arrived
    // anonymous but names an order.
    let mut email = input.email;
    let mut ticket_type = input.ticket_type;
    if let Some(order_id) = input.order_id.as_deref() {
        if email.is_none() || ticket_type.is_none() {
            let known: Option<(String, TicketType)> = sqlx::query_as(
                "SELECT a.email, a.ticket_type
                 FROM attendees a
                 JOIN payment_orders o ON o.attendee_id = a.id
                 WHERE o.order_id = $1",
            )
            .bind(order_id)
            .fetch_optional(pool)
            .await?;

            if let Some((known_email, known_ticket)) = known {
                email = email.or(Some(known_email));
                ticket_type = ticket_type.or(Some(known_ticket));
            }
        }
    }

    let offered = retention_offer(pool, retention, input.reason).await?;

    // Upsert keyed by order id; anonymous feedback (no order) is appended.
    // A placeholder reason never overwrites a real one, and offer/acceptance
    // flags are sticky once set.
    let feedback: ExitFeedback = sqlx::query_as(&format!(
        "INSERT INTO exit_feedback
             (order_id, email, ticket_type, abandon_reason, additional_notes,
              was_offered_coupon, accepted_coupon)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (order_id) DO UPDATE SET
             email = COALESCE(EXCLUDED.email, exit_feedback.email),
             ticket_type = COALESCE(EXCLUDED.ticket_type, exit_feedback.ticket_type),
             abandon_reason = CASE
                 WHEN EXCLUDED.abandon_reason <> 'UNKNOWN' THEN EXCLUDED.abandon_reason
                 ELSE exit_feedback.abandon_reason
             END,
             additional_notes = COALESCE(EXCLUDED.additional_notes, exit_feedback.additional_notes),
             was_offered_coupon = exit_feedback.was_offered_coupon OR EXCLUDED.was_offered_coupon,
             accepted_coupon = exit_feedback.accepted_coupon OR EXCLUDED.accepted_coupon,
             updated_at = NOW()
         RETURNING {FEEDBACK_COLUMNS}"
    ))
    .bind(&input.order_id)
    .bind(&email)
    .bind(ticket_type)
    .bind(input.reason)
    .bind(&input.notes)
    .bind(offered.is_some())
    .bind(input.accepted_coupon)
    .fetch_one(pool)
    .await?;

    info!(
        "Exit feedback recorded: order={:?}, reason={:?}, offered={}, accepted={}",
        feedback.order_id, feedback.abandon_reason, feedback.was_offered_coupon,
        feedback.accepted_coupon
    );

    if input.accepted_coupon {
        if let Some(order_id) = input.order_id.as_deref() {
            accept_offer(pool, retention, order_id).await?;
        }
    }

    Ok((feedback, offered))
}

/// The retention code, if this exit qualifies for it and the code still has
/// uses left. Checked against the ledger so an exhausted or expired code is
/// never dangled in front of the user.
async fn retention_offer(
    pool: &Pool<Postgres>,
    retention: &RetentionConfig,
    reason: AbandonReason,
) -> Result<Option<String>, AppError> {
    if reason != AbandonReason::PriceHigh {
        return Ok(None);
    }

    match coupons::validate(pool, &retention.coupon_code, 0).await? {
        Validation::Valid { coupon, .. } => Ok(Some(coupon.code)),
        Validation::Rejected(reason) => {
            warn!(
                "Retention coupon {} is not offerable: {}",
                retention.coupon_code,
                reason.describe()
            );
            Ok(None)
        }
    }
}

/// Attaches the retention coupon to the attendee behind `order_id` so the
/// next checkout attempt starts discounted. Never completes anything.
async fn accept_offer(
    pool: &Pool<Postgres>,
    retention: &RetentionConfig,
    order_id: &str,
) -> Result<(), AppError> {
    let attendee: Option<(i64, TicketType)> = sqlx::query_as(
        "SELECT a.id, a.ticket_type
         FROM attendees a
         JOIN payment_orders o ON o.attendee_id = a.id
         WHERE o.order_id = $1",
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    let (attendee_id, ticket_type) = match attendee {
        Some(row) => row,
        None => {
            warn!("Coupon acceptance for unknown order {}", order_id);
            return Ok(());
        }
    };

    let discount = match coupons::validate(pool, &retention.coupon_code, ticket_type.price_minor())
        .await?
    {
        Validation::Valid { discount, .. } => discount,
        Validation::Rejected(reason) => {
            warn!(
                "Retention coupon {} no longer usable at acceptance: {}",
                retention.coupon_code,
                reason.describe()
            );
            return Ok(());
        }
    };

    let mut conn = pool.acquire().await?;
    let code = retention.coupon_code.trim().to_uppercase();
    if registration::attach_coupon(&mut *conn, attendee_id, &code, discount).await? {
        info!(
            "Retention coupon {} attached to attendee {} (discount {})",
            code, attendee_id, discount
        );
    }

    Ok(())
}
