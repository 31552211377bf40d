//! Attendee record store. One active registration per email, enforced by the
//! unique constraint; a prior ABANDONED or FAILED attempt is reclaimed in the
//! same statement that would otherwise conflict.

use sqlx::{PgConnection, Pool, Postgres};
use tracing::info;

use crate::error::AppError;
use crate::models::{AttendanceMode, Attendee, PaymentStatus, TicketType};
use crate::services::coupons::{self, Validation};

const ATTENDEE_COLUMNS: &str = "id, first_name, last_name, email, organization, role, dietary, \
     ticket_type, attendance_mode, coupon_code, discount_amount, payment_status, \
     created_at, updated_at";

#[derive(Debug)]
pub struct NewRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub organization: Option<String>,
    pub role: Option<String>,
    pub dietary: Option<String>,
    pub ticket_type: TicketType,
    pub attendance_mode: AttendanceMode,
    pub coupon_code: Option<String>,
}

/// Registers an attendee with `PENDING` payment status.
///
/// The coupon (if any) is re-validated here rather than trusted from the
/// browser, and the discount is recomputed against the server-side ticket
/// price. Returns `Conflict` when the email already holds a registration
/// that is still pending or paid.
pub async fn register(pool: &Pool<Postgres>, new: NewRegistration) -> Result<Attendee, AppError> {
    let email = new.email.trim().to_lowercase();
    let ticket_price = new.ticket_type.price_minor();

    let (coupon_code, discount_amount) = match new.coupon_code.as_deref() {
        Some(code) if !code.trim().is_empty() => {
            match coupons::validate(pool, code, ticket_price).await? {
                Validation::Valid { coupon, discount } => (Some(coupon.code), discount),
                Validation::Rejected(reason) => {
                    return Err(AppError::Validation(format!(
                        "Coupon cannot be applied: {}",
                        reason.describe()
                    )));
                }
            }
        }
        _ => (None, 0),
    };

    // Insert, or reclaim the row of a prior abandoned/failed attempt. When the
    // existing row is still PENDING or already COMPLETED the update clause
    // does not fire and no row comes back.
    let attendee: Option<Attendee> = sqlx::query_as(&format!(
        "INSERT INTO attendees (first_name, last_name, email, organization, role, dietary,
                                ticket_type, attendance_mode, coupon_code, discount_amount)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (email) DO UPDATE SET
             first_name = EXCLUDED.first_name,
             last_name = EXCLUDED.last_name,
             organization = EXCLUDED.organization,
             role = EXCLUDED.role,
             dietary = EXCLUDED.dietary,
             ticket_type = EXCLUDED.ticket_type,
             attendance_mode = EXCLUDED.attendance_mode,
             coupon_code = EXCLUDED.coupon_code,
             discount_amount = EXCLUDED.discount_amount,
             payment_status = 'PENDING',
             updated_at = NOW()
         WHERE attendees.payment_status IN ('ABANDONED', 'FAILED')
         RETURNING {ATTENDEE_COLUMNS}"
    ))
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&email)
    .bind(&new.organization)
    .bind(&new.role)
    .bind(&new.dietary)
    .bind(new.ticket_type)
    .bind(new.attendance_mode)
    .bind(&coupon_code)
    .bind(discount_amount)
    .fetch_optional(pool)
    .await?;

    match attendee {
        Some(a) => {
            info!(
                "Attendee {} registered: ticket={:?}, discount={}",
                a.id, a.ticket_type, a.discount_amount
            );
            Ok(a)
        }
        None => Err(AppError::Conflict(
            "This email already has an active registration".to_string(),
        )),
    }
}

pub async fn find_by_id(pool: &Pool<Postgres>, id: i64) -> Result<Option<Attendee>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Reconciler-only write: keeps the attendee row in step with the
/// authoritative order status. Guarded on the current status so a late
/// mirror can never move a row out of a terminal state.
pub(crate) async fn mirror_payment_status(
    conn: &mut PgConnection,
    attendee_id: i64,
    status: PaymentStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attendees SET payment_status = $2, updated_at = NOW()
         WHERE id = $1 AND payment_status = 'PENDING'",
    )
    .bind(attendee_id)
    .bind(status)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Attaches a retention coupon to the registration so the next checkout
/// attempt picks it up. Never touches a completed registration.
pub(crate) async fn attach_coupon(
    conn: &mut PgConnection,
    attendee_id: i64,
    code: &str,
    discount_amount: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attendees SET coupon_code = $2, discount_amount = $3, updated_at = NOW()
         WHERE id = $1 AND payment_status <> 'COMPLETED'",
    )
    .bind(attendee_id)
    .bind(code)
    .bind(discount_amount)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}
