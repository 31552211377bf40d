use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// `discount_value` is a whole percentage of the ticket amount.
    Percent,
    /// `discount_value` is an absolute amount in minor units.
    Fixed,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: i32,
    pub used_count: i32,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Discount this coupon grants against `amount` (minor units). Integer
    /// arithmetic, never more than the amount itself.
    pub fn discount_for(&self, amount: i64) -> i64 {
        // i128 headroom: the percent product can pass i64::MAX even when the
        // final discount fits.
        let raw: i128 = match self.discount_type {
            DiscountType::Percent => amount as i128 * self.discount_value as i128 / 100,
            DiscountType::Fixed => self.discount_value as i128,
        };
        raw.clamp(0, amount as i128) as i64
    }

    pub fn is_exhausted(&self) -> bool {
        self.used_count >= self.max_uses
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        Coupon {
            id: 1,
            code: "SAVE10".to_string(),
            discount_type,
            discount_value: value,
            max_uses: 1,
            used_count: 0,
            valid_until: Utc::now() + chrono::Duration::days(30),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn percent_discount_of_regular_ticket() {
        // 10% of 750000 paise.
        let c = coupon(DiscountType::Percent, 10);
        assert_eq!(c.discount_for(750_000), 75_000);
    }

    #[test]
    fn percent_discount_caps_at_amount() {
        let c = coupon(DiscountType::Percent, 150);
        assert_eq!(c.discount_for(750_000), 750_000);
    }

    #[test]
    fn percent_discount_of_maximum_amount() {
        // The intermediate product exceeds i64 here; the result must not.
        let c = coupon(DiscountType::Percent, 10);
        assert_eq!(c.discount_for(i64::MAX), i64::MAX / 10);
    }

    #[test]
    fn fixed_discount_caps_at_amount() {
        let c = coupon(DiscountType::Fixed, 1_000_000);
        assert_eq!(c.discount_for(300_000), 300_000);
    }

    #[test]
    fn fixed_discount_below_amount_passes_through() {
        let c = coupon(DiscountType::Fixed, 50_000);
        assert_eq!(c.discount_for(300_000), 50_000);
    }

    #[test]
    fn negative_value_never_inflates_the_amount() {
        let c = coupon(DiscountType::Fixed, -500);
        assert_eq!(c.discount_for(300_000), 0);
    }

    #[test]
    fn exhaustion_and_expiry_checks() {
        let mut c = coupon(DiscountType::Percent, 10);
        assert!(!c.is_exhausted());
        c.used_count = c.max_uses;
        assert!(c.is_exhausted());

        assert!(!c.is_expired(Utc::now()));
        // Still valid at the exact cutoff instant.
        assert!(!c.is_expired(c.valid_until));
        assert!(c.is_expired(c.valid_until + chrono::Duration::seconds(1)));
    }

    proptest! {
        #[test]
        fn discount_stays_within_the_amount(
            value: i64,
            amount in 0i64..=i64::MAX,
            fixed: bool,
        ) {
            let kind = if fixed { DiscountType::Fixed } else { DiscountType::Percent };
            let d = coupon(kind, value).discount_for(amount);
            prop_assert!((0..=amount).contains(&d));
        }
    }
}
