//! Coupon ledger: validation is read-only; consumption is a conditional
//! increment that can never push `used_count` past `max_uses`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, Pool, Postgres};
use tracing::info;

use crate::error::AppError;
use crate::models::{Coupon, DiscountType};

const COUPON_COLUMNS: &str = "id, code, discount_type, discount_value, max_uses, used_count, \
     valid_until, is_active, created_at";

/// Reject reason surfaced to the client as `{valid: false, reason}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Invalid,
    Expired,
    Exhausted,
}

impl RejectReason {
    pub fn describe(&self) -> &'static str {
        match self {
            RejectReason::Invalid => "invalid code",
            RejectReason::Expired => "code expired",
            RejectReason::Exhausted => "code fully redeemed",
        }
    }
}

#[derive(Debug)]
pub enum Validation {
    Valid { coupon: Coupon, discount: i64 },
    Rejected(RejectReason),
}

/// Usability check shared by validation and the retention offer. `None`
/// means the coupon can still be applied.
fn classify(coupon: &Coupon, now: DateTime<Utc>) -> Option<RejectReason> {
    if !coupon.is_active {
        // Deactivated codes are indistinguishable from unknown ones.
        return Some(RejectReason::Invalid);
    }
    if coupon.is_expired(now) {
        return Some(RejectReason::Expired);
    }
    if coupon.is_exhausted() {
        return Some(RejectReason::Exhausted);
    }
    None
}

/// Looks up `code` (normalized upper-case) and computes the discount it
/// grants against `ticket_amount`. Never mutates the ledger.
pub async fn validate(
    pool: &Pool<Postgres>,
    code: &str,
    ticket_amount: i64,
) -> Result<Validation, AppError> {
    let normalized = code.trim().to_uppercase();

    let coupon: Option<Coupon> = sqlx::query_as(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
    ))
    .bind(&normalized)
    .fetch_optional(pool)
    .await?;

    let coupon = match coupon {
        Some(c) => c,
        None => return Ok(Validation::Rejected(RejectReason::Invalid)),
    };

    if let Some(reason) = classify(&coupon, Utc::now()) {
        return Ok(Validation::Rejected(reason));
    }

    let discount = coupon.discount_for(ticket_amount);
    Ok(Validation::Valid { coupon, discount })
}

/// Compare-and-increment: records one use only if the cap still has room at
/// the moment of the update. Returns whether a use was recorded; the caller
/// decides how to treat a coupon that filled up between checkout and
/// completion. Runs on the caller's connection so it can join the
/// completion transaction.
pub async fn consume(conn: &mut PgConnection, code: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE coupons SET used_count = used_count + 1
         WHERE code = $1 AND used_count < max_uses",
    )
    .bind(code)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(Debug)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: i32,
    pub valid_until: DateTime<Utc>,
}

pub async fn create(pool: &Pool<Postgres>, new: NewCoupon) -> Result<Coupon, AppError> {
    let code = new.code.trim().to_uppercase();

    let created: Option<Coupon> = sqlx::query_as(&format!(
        "INSERT INTO coupons (code, discount_type, discount_value, max_uses, valid_until)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (code) DO NOTHING
         RETURNING {COUPON_COLUMNS}"
    ))
    .bind(&code)
    .bind(new.discount_type)
    .bind(new.discount_value)
    .bind(new.max_uses)
    .bind(new.valid_until)
    .fetch_optional(pool)
    .await?;

    match created {
        Some(coupon) => {
            info!(
                "Coupon {} created: {:?} {} (max {} uses)",
                coupon.code, coupon.discount_type, coupon.discount_value, coupon.max_uses
            );
            Ok(coupon)
        }
        None => Err(AppError::Conflict(format!("Coupon {code} already exists"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupon() -> Coupon {
        Coupon {
            id: 1,
            code: "SAVE10".to_string(),
            discount_type: DiscountType::Percent,
            discount_value: 10,
            max_uses: 5,
            used_count: 0,
            valid_until: Utc::now() + chrono::Duration::days(7),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_coupon_is_usable() {
        assert_eq!(classify(&coupon(), Utc::now()), None);
    }

    #[test]
    fn inactive_reads_as_invalid() {
        let mut c = coupon();
        c.is_active = false;
        assert_eq!(classify(&c, Utc::now()), Some(RejectReason::Invalid));
    }

    #[test]
    fn expired_coupon_rejected() {
        let c = coupon();
        let later = c.valid_until + chrono::Duration::hours(1);
        assert_eq!(classify(&c, later), Some(RejectReason::Expired));
    }

    #[test]
    fn exhausted_coupon_rejected() {
        let mut c = coupon();
        c.used_count = c.max_uses;
        assert_eq!(classify(&c, Utc::now()), Some(RejectReason::Exhausted));
    }

    #[test]
    fn inactive_wins_over_expired() {
        // A deactivated code stays "invalid" even when also past expiry.
        let mut c = coupon();
        c.is_active = false;
        let later = c.valid_until + chrono::Duration::hours(1);
        assert_eq!(classify(&c, later), Some(RejectReason::Invalid));
    }
}
