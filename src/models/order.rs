use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::PaymentStatus;

/// Platform handling fee added on top of the discounted ticket price.
pub const PLATFORM_FEE_PERCENT: i64 = 5;

/// Amount the gateway order is opened for, in minor units:
/// discounted ticket price plus the platform fee.
pub fn amount_due(ticket_price_minor: i64, discount_minor: i64) -> i64 {
    let discounted = (ticket_price_minor - discount_minor).max(0);
    discounted * (100 + PLATFORM_FEE_PERCENT) / 100
}

/// One gateway order, keyed by the opaque id the gateway minted. The
/// `status` column here is the authoritative copy of the payment lifecycle.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub order_id: String,
    pub attendee_id: i64,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_id: Option<String>,
    pub receipt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentOrder {
    pub order_id: String,
    pub attendee_id: i64,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}
