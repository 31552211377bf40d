use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Ticket tiers sold for the summit. Prices are fixed server-side; the
/// browser never dictates an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    EarlyBird,
    Regular,
    Student,
}

impl TicketType {
    /// Ticket price in minor currency units (paise).
    pub fn price_minor(&self) -> i64 {
        match self {
            TicketType::EarlyBird => 500_000,
            TicketType::Regular => 750_000,
            TicketType::Student => 300_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceMode {
    InPerson,
    Virtual,
}

/// Payment lifecycle shared by attendees and payment orders. The order row
/// is authoritative; the attendee row mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Abandoned,
    Failed,
}

impl PaymentStatus {
    /// Terminal states admit no further transition; late events on them are
    /// acknowledged no-ops.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub organization: Option<String>,
    pub role: Option<String>,
    pub dietary: Option<String>,
    pub ticket_type: TicketType,
    pub attendance_mode: AttendanceMode,
    pub coupon_code: Option<String>,
    pub discount_amount: i64,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_prices_match_published_tiers() {
        assert_eq!(TicketType::EarlyBird.price_minor(), 500_000);
        assert_eq!(TicketType::Regular.price_minor(), 750_000);
        assert_eq!(TicketType::Student.price_minor(), 300_000);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Abandoned.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn statuses_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&TicketType::EarlyBird).unwrap(),
            "\"EARLY_BIRD\""
        );
        assert_eq!(
            serde_json::to_string(&AttendanceMode::InPerson).unwrap(),
            "\"IN_PERSON\""
        );
    }
}
