use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::TicketType;

/// Why the user left checkout. `Unknown` is the placeholder written by the
/// bare dismiss event before the user explains themselves; a later
/// submission overwrites it on the same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbandonReason {
    PriceHigh,
    NotReady,
    NeedApproval,
    TechnicalIssue,
    Other,
    Unknown,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitFeedback {
    pub id: i64,
    pub order_id: Option<String>,
    pub email: Option<String>,
    pub ticket_type: Option<TicketType>,
    pub abandon_reason: AbandonReason,
    pub additional_notes: Option<String>,
    pub was_offered_coupon: bool,
    pub accepted_coupon: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
