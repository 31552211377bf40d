//! Payment reconciler.
//!
//! Three independent signals can resolve an open order: the browser's success
//! callback, the gateway's webhook, and a checkout dismiss. They arrive in
//! any order, possibly duplicated, possibly never. The rules:
//!
//!   * `PENDING` moves to exactly one of `COMPLETED`, `ABANDONED`, `FAILED`.
//!   * The first verified writer wins; whoever loses the race sees a
//!     terminal row and acknowledges without touching it.
//!   * A signature mismatch never completes an order, regardless of arrival
//!     order.
//!
//! The decision itself is the pure [`apply`] function; persistence wraps it
//! in status-guarded updates so interleaved requests cannot double-settle.

use sqlx::{Pool, Postgres};
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{PaymentOrder, PaymentStatus};
use crate::services::gateway::SignatureVerifier;
use crate::services::orders::{self, ORDER_COLUMNS};
use crate::services::{coupons, registration};

/// One of the three signals that can settle an order.
#[derive(Debug, Clone)]
pub enum PaymentSignal {
    /// Browser redirect after the checkout widget reported success.
    Callback {
        payment_id: String,
        signature: String,
    },
    /// Server-to-server notification from the gateway. Delivered at least
    /// once, before or after the callback, or not at all.
    Webhook {
        payment_id: String,
        signature: String,
    },
    /// The user closed the checkout widget without paying.
    Dismissed,
}

impl PaymentSignal {
    pub fn source(&self) -> &'static str {
        match self {
            PaymentSignal::Callback { .. } => "callback",
            PaymentSignal::Webhook { .. } => "webhook",
            PaymentSignal::Dismissed => "dismiss",
        }
    }
}

/// What a signal should do to an order in the given status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First verified success signal: `PENDING -> COMPLETED`.
    Complete { payment_id: String },
    /// Dismiss on an open order: `PENDING -> ABANDONED`.
    Abandon,
    /// Signature mismatch on an open order: `PENDING -> FAILED`.
    Fail,
    /// Order already terminal; the event is acknowledged and dropped.
    AlreadySettled,
    /// Signature mismatch on an already-terminal order. Nothing changes,
    /// but the caller still reports verification failure.
    RejectedSettled,
}

/// Pure transition decision. Everything the rules above say is encoded here,
/// with no storage or network involved.
pub fn apply(
    status: PaymentStatus,
    order_id: &str,
    signal: &PaymentSignal,
    verifier: &SignatureVerifier,
) -> Transition {
    match signal {
        PaymentSignal::Callback {
            payment_id,
            signature,
        }
        | PaymentSignal::Webhook {
            payment_id,
            signature,
        } => {
            let verified = verifier.verify(order_id, payment_id, signature);
            match (verified, status.is_terminal()) {
                (true, false) => Transition::Complete {
                    payment_id: payment_id.clone(),
                },
                (true, true) => Transition::AlreadySettled,
                (false, false) => Transition::Fail,
                (false, true) => Transition::RejectedSettled,
            }
        }
        PaymentSignal::Dismissed => {
            if status.is_terminal() {
                Transition::AlreadySettled
            } else {
                Transition::Abandon
            }
        }
    }
}

/// How a settled signal is reported to the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalResult {
    /// This signal performed the `PENDING -> COMPLETED` transition.
    Completed,
    Abandoned,
    Failed,
    /// Verified duplicate of an already-settled order; acknowledged no-op.
    AlreadySettled,
    /// Signature mismatch against a settled order; no state change.
    Rejected,
}

#[derive(Debug)]
pub struct Outcome {
    /// Order row after the signal was applied.
    pub order: PaymentOrder,
    pub result: SignalResult,
}

/// Applies one signal to the order it names and persists the outcome.
pub async fn settle(
    pool: &Pool<Postgres>,
    verifier: &SignatureVerifier,
    order_id: &str,
    signal: PaymentSignal,
) -> Result<Outcome, AppError> {
    let order = orders::find_by_order_id(pool, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment order not found".to_string()))?;

    match apply(order.status, &order.order_id, &signal, verifier) {
        Transition::Complete { payment_id } => {
            complete(pool, &order, &payment_id, signal.source()).await
        }
        Transition::Abandon => {
            close_without_payment(pool, &order, PaymentStatus::Abandoned, signal.source()).await
        }
        Transition::Fail => {
            close_without_payment(pool, &order, PaymentStatus::Failed, signal.source()).await
        }
        Transition::AlreadySettled => {
            info!(
                "Order {} already settled as {:?}, {} acknowledged as no-op",
                order.order_id,
                order.status,
                signal.source()
            );
            Ok(Outcome {
                order,
                result: SignalResult::AlreadySettled,
            })
        }
        Transition::RejectedSettled => {
            warn!(
                "Signature mismatch for settled order {} via {}",
                order.order_id,
                signal.source()
            );
            Ok(Outcome {
                order,
                result: SignalResult::Rejected,
            })
        }
    }
}

/// `PENDING -> COMPLETED` plus its side effects, in one transaction: mirror
/// the attendee row and consume the applied coupon. The status guard on the
/// first update makes the whole block a no-op when another signal won.
async fn complete(
    pool: &Pool<Postgres>,
    order: &PaymentOrder,
    payment_id: &str,
    source: &str,
) -> Result<Outcome, AppError> {
    let mut tx = pool.begin().await?;

    let updated: Option<PaymentOrder> = sqlx::query_as(&format!(
        "UPDATE payment_orders SET status = 'COMPLETED', payment_id = $2, updated_at = NOW()
         WHERE order_id = $1 AND status = 'PENDING'
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(&order.order_id)
    .bind(payment_id)
    .fetch_optional(&mut *tx)
    .await?;

    let updated = match updated {
        Some(u) => u,
        None => {
            tx.rollback().await?;
            return settled_elsewhere(pool, &order.order_id).await;
        }
    };

    if !registration::mirror_payment_status(&mut *tx, order.attendee_id, PaymentStatus::Completed)
        .await?
    {
        warn!(
            "Attendee {} was not PENDING while completing order {}",
            order.attendee_id, order.order_id
        );
    }

    let coupon_code: Option<String> =
        sqlx::query_scalar("SELECT coupon_code FROM attendees WHERE id = $1")
            .bind(order.attendee_id)
            .fetch_one(&mut *tx)
            .await?;

    if let Some(code) = coupon_code {
        if coupons::consume(&mut *tx, &code).await? {
            info!("Coupon {} consumed for order {}", code, order.order_id);
        } else {
            // The cap filled between checkout and completion; the payment
            // already happened, so the completion stands.
            warn!(
                "Coupon {} hit its cap before order {} completed",
                code, order.order_id
            );
        }
    }

    tx.commit().await?;

    info!(
        "Order {} transitioned {:?} -> {:?} via {}",
        order.order_id,
        order.status,
        PaymentStatus::Completed,
        source
    );

    Ok(Outcome {
        order: updated,
        result: SignalResult::Completed,
    })
}

/// Shared `PENDING -> ABANDONED | FAILED` path: no payment id, no coupon.
async fn close_without_payment(
    pool: &Pool<Postgres>,
    order: &PaymentOrder,
    status: PaymentStatus,
    source: &str,
) -> Result<Outcome, AppError> {
    let mut tx = pool.begin().await?;

    let updated: Option<PaymentOrder> = sqlx::query_as(&format!(
        "UPDATE payment_orders SET status = $2, updated_at = NOW()
         WHERE order_id = $1 AND status = 'PENDING'
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(&order.order_id)
    .bind(status)
    .fetch_optional(&mut *tx)
    .await?;

    let updated = match updated {
        Some(u) => u,
        None => {
            tx.rollback().await?;
            return settled_elsewhere(pool, &order.order_id).await;
        }
    };

    if !registration::mirror_payment_status(&mut *tx, order.attendee_id, status).await? {
        warn!(
            "Attendee {} was not PENDING while closing order {}",
            order.attendee_id, order.order_id
        );
    }

    tx.commit().await?;

    info!(
        "Order {} transitioned {:?} -> {:?} via {}",
        order.order_id, order.status, status, source
    );

    let result = match status {
        PaymentStatus::Abandoned => SignalResult::Abandoned,
        _ => SignalResult::Failed,
    };
    Ok(Outcome {
        order: updated,
        result,
    })
}

/// A concurrent signal finished first; report its terminal state.
async fn settled_elsewhere(pool: &Pool<Postgres>, order_id: &str) -> Result<Outcome, AppError> {
    let order = orders::find_by_order_id(pool, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment order not found".to_string()))?;

    info!(
        "Order {} was settled concurrently as {:?}",
        order.order_id, order.status
    );

    Ok(Outcome {
        order,
        result: SignalResult::AlreadySettled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ORDER: &str = "order_test_1";
    const PAYMENT: &str = "pay_test_1";

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new("reconciler_test_secret")
    }

    fn good_callback() -> PaymentSignal {
        PaymentSignal::Callback {
            payment_id: PAYMENT.to_string(),
            signature: verifier().sign(ORDER, PAYMENT),
        }
    }

    fn good_webhook() -> PaymentSignal {
        PaymentSignal::Webhook {
            payment_id: PAYMENT.to_string(),
            signature: verifier().sign(ORDER, PAYMENT),
        }
    }

    fn forged_callback() -> PaymentSignal {
        PaymentSignal::Callback {
            payment_id: PAYMENT.to_string(),
            signature: "deadbeef".repeat(8),
        }
    }

    #[test]
    fn verified_callback_completes_pending_order() {
        let t = apply(PaymentStatus::Pending, ORDER, &good_callback(), &verifier());
        assert_eq!(
            t,
            Transition::Complete {
                payment_id: PAYMENT.to_string()
            }
        );
    }

    #[test]
    fn verified_webhook_completes_pending_order() {
        let t = apply(PaymentStatus::Pending, ORDER, &good_webhook(), &verifier());
        assert!(matches!(t, Transition::Complete { .. }));
    }

    #[test]
    fn dismiss_abandons_pending_order() {
        let t = apply(
            PaymentStatus::Pending,
            ORDER,
            &PaymentSignal::Dismissed,
            &verifier(),
        );
        assert_eq!(t, Transition::Abandon);
    }

    #[test]
    fn forged_callback_fails_pending_order() {
        let t = apply(
            PaymentStatus::Pending,
            ORDER,
            &forged_callback(),
            &verifier(),
        );
        assert_eq!(t, Transition::Fail);
    }

    #[test]
    fn duplicate_webhook_after_completion_is_noop() {
        let t = apply(PaymentStatus::Completed, ORDER, &good_webhook(), &verifier());
        assert_eq!(t, Transition::AlreadySettled);
    }

    #[test]
    fn dismiss_after_completion_is_noop() {
        // The webhook resolved the order while the widget was still open.
        let t = apply(
            PaymentStatus::Completed,
            ORDER,
            &PaymentSignal::Dismissed,
            &verifier(),
        );
        assert_eq!(t, Transition::AlreadySettled);
    }

    #[test]
    fn second_dismiss_is_noop() {
        let t = apply(
            PaymentStatus::Abandoned,
            ORDER,
            &PaymentSignal::Dismissed,
            &verifier(),
        );
        assert_eq!(t, Transition::AlreadySettled);
    }

    #[test]
    fn verified_callback_after_abandon_is_noop() {
        // Terminal states absorb everything, even a genuine late success.
        let t = apply(PaymentStatus::Abandoned, ORDER, &good_callback(), &verifier());
        assert_eq!(t, Transition::AlreadySettled);
    }

    #[test]
    fn forged_callback_on_settled_order_is_rejected_without_change() {
        let t = apply(
            PaymentStatus::Completed,
            ORDER,
            &forged_callback(),
            &verifier(),
        );
        assert_eq!(t, Transition::RejectedSettled);
    }

    #[test]
    fn wrong_payment_id_never_completes() {
        let sig_for_other = verifier().sign(ORDER, "pay_other");
        let signal = PaymentSignal::Webhook {
            payment_id: PAYMENT.to_string(),
            signature: sig_for_other,
        };
        let t = apply(PaymentStatus::Pending, ORDER, &signal, &verifier());
        assert_eq!(t, Transition::Fail);
    }

    /// Folds a transition into the next stored status, the way the guarded
    /// updates do.
    fn step(status: PaymentStatus, t: &Transition) -> PaymentStatus {
        match t {
            Transition::Complete { .. } => PaymentStatus::Completed,
            Transition::Abandon => PaymentStatus::Abandoned,
            Transition::Fail => PaymentStatus::Failed,
            Transition::AlreadySettled | Transition::RejectedSettled => status,
        }
    }

    fn arb_signal() -> impl Strategy<Value = PaymentSignal> {
        prop_oneof![
            Just(good_callback()),
            Just(good_webhook()),
            Just(PaymentSignal::Dismissed),
            Just(forged_callback()),
        ]
    }

    proptest! {
        /// Any interleaving of signals settles an order at most once, and a
        /// terminal state never changes afterwards.
        #[test]
        fn at_most_one_real_transition(signals in proptest::collection::vec(arb_signal(), 0..12)) {
            let v = verifier();
            let mut status = PaymentStatus::Pending;
            let mut transitions = 0;

            for signal in &signals {
                let t = apply(status, ORDER, signal, &v);
                let next = step(status, &t);

                if status.is_terminal() {
                    prop_assert_eq!(next, status, "terminal state must not move");
                }
                if next != status {
                    transitions += 1;
                }
                status = next;
            }

            prop_assert!(transitions <= 1);
            prop_assert_eq!(transitions > 0, status.is_terminal());
        }

        /// A forged signature never produces a completed order.
        #[test]
        fn forged_signals_never_complete(n in 1usize..8) {
            let v = verifier();
            let mut status = PaymentStatus::Pending;
            for _ in 0..n {
                let t = apply(status, ORDER, &forged_callback(), &v);
                status = step(status, &t);
            }
            prop_assert_eq!(status, PaymentStatus::Failed);
        }
    }
}
