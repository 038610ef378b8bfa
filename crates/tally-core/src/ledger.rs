//! # Payment Ledger
//!
//! Balance math shared by sales and purchase orders.
//!
//! ## The Balance Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   amount_paid + amount_due == total          (± 1 cent)                 │
//! │   amount_due  == max(0, total − amount_paid) (± 1 cent)                 │
//! │                                                                         │
//! │   Holds after every committed mutation. Payment rows themselves are    │
//! │   never edited: a correction is a new `adjustment` row.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Transitions
//! ```text
//!            payment clears balance
//!  pending ─────────────────────────► paid
//!     │                                ▲
//!     │ clock passes due date          │ payment clears balance
//!     ▼                                │
//!  overdue ────────────────────────────┘
//! ```
//! The only other move is [`reopen`](adjust_down_payment): lowering the down
//! payment of a credit purchase order that was already settled puts a
//! balance back on it.
//!
//! Every function here is pure; the engines persist the returned [`Balance`].

use chrono::{DateTime, Duration, Utc};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::terms::{PaymentTerm, PurchasePaymentMethod};
use crate::types::{PaymentStatus, PurchaseOrder, Sale};
use crate::PAYMENT_TOLERANCE_CENTS;

/// Rounding tolerance of the ledger: one cent.
pub const TOLERANCE: Money = Money::from_cents(PAYMENT_TOLERANCE_CENTS);

// =============================================================================
// Balance
// =============================================================================

/// The mutable payment fields of a sale or purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub total: Money,
    pub amount_paid: Money,
    pub amount_due: Money,
    pub status: PaymentStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_date: Option<DateTime<Utc>>,
}

impl Balance {
    /// Reads the balance of a stored sale.
    pub fn of_sale(sale: &Sale) -> Self {
        Balance {
            total: sale.total(),
            amount_paid: sale.amount_paid(),
            amount_due: sale.amount_due(),
            status: sale.payment_status,
            due_date: sale.due_date,
            paid_date: sale.paid_date,
        }
    }

    /// Reads the balance of a stored purchase order.
    pub fn of_purchase(order: &PurchaseOrder) -> Self {
        Balance {
            total: order.total(),
            amount_paid: order.amount_paid(),
            amount_due: order.amount_due(),
            status: order.payment_status,
            due_date: order.due_date,
            paid_date: order.paid_date,
        }
    }

    /// Checks the balance invariant.
    pub fn is_consistent(&self) -> bool {
        let expected_due = (self.total - self.amount_paid).non_negative();
        (self.amount_paid + self.amount_due).within(self.total, TOLERANCE)
            && self.amount_due.within(expected_due, TOLERANCE)
            && !self.amount_due.is_negative()
    }

    /// True when nothing meaningful is owed any more.
    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.amount_due <= TOLERANCE
    }

    /// Marks the balance paid at `now`, zeroing the remainder.
    fn settle(mut self, now: DateTime<Utc>) -> Self {
        self.status = PaymentStatus::Paid;
        self.paid_date = Some(now);
        self.amount_due = Money::zero();
        self
    }

    /// Open status for an unpaid balance: overdue once the due date passed.
    fn open_status(&self, now: DateTime<Utc>) -> PaymentStatus {
        match self.due_date {
            Some(due) if now > due => PaymentStatus::Overdue,
            _ => PaymentStatus::Pending,
        }
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// Validates a payment status change. Staying put is always allowed.
pub fn check_transition(from: PaymentStatus, to: PaymentStatus) -> CoreResult<()> {
    use PaymentStatus::*;

    match (from, to) {
        (a, b) if a == b => Ok(()),
        (Pending, Paid) | (Pending, Overdue) | (Overdue, Paid) => Ok(()),
        _ => Err(CoreError::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

// =============================================================================
// Creation
// =============================================================================

/// Settles a new sale.
///
/// - `cash` term: paid in full now, due date = now
/// - net terms: due date = now + term days; the down payment is paid, the
///   rest is due; a down payment covering the total settles the sale
///
/// A down payment larger than the total settles the sale too. The amount
/// paid is capped at the total so the balance invariant holds.
pub fn initial_sale_settlement(
    total: Money,
    term: PaymentTerm,
    down_payment: Money,
    now: DateTime<Utc>,
) -> CoreResult<Balance> {
    if term.is_cash() {
        return Ok(Balance {
            total,
            amount_paid: total,
            amount_due: Money::zero(),
            status: PaymentStatus::Paid,
            due_date: Some(now),
            paid_date: Some(now),
        });
    }

    let paid = down_payment.min(total.non_negative());

    let balance = Balance {
        total,
        amount_paid: paid,
        amount_due: total - paid,
        status: PaymentStatus::Pending,
        due_date: Some(now + Duration::days(term.days())),
        paid_date: None,
    };

    Ok(if balance.amount_due.is_positive() {
        balance
    } else {
        balance.settle(now)
    })
}

/// Settles a new purchase order.
///
/// - credit: due date = order date + payment days; the down payment (if
///   any) is paid, the rest is due
/// - anything else: paid in full on the order date
///
/// ## Errors
/// - `DownPaymentExceedsTotal` when a credit down payment exceeds the total
pub fn initial_purchase_settlement(
    total: Money,
    method: PurchasePaymentMethod,
    down_payment: Money,
    order_date: DateTime<Utc>,
    payment_days: i64,
    now: DateTime<Utc>,
) -> CoreResult<Balance> {
    if !method.is_credit() {
        return Ok(Balance {
            total,
            amount_paid: total,
            amount_due: Money::zero(),
            status: PaymentStatus::Paid,
            due_date: Some(order_date),
            paid_date: Some(order_date),
        });
    }

    let open = Balance {
        total,
        amount_paid: Money::zero(),
        amount_due: total,
        status: PaymentStatus::Pending,
        due_date: Some(order_date + Duration::days(payment_days)),
        paid_date: None,
    };

    if !down_payment.is_positive() {
        return Ok(open);
    }

    if down_payment > total {
        return Err(CoreError::DownPaymentExceedsTotal {
            down_payment,
            total,
        });
    }

    let balance = Balance {
        amount_paid: down_payment,
        amount_due: total - down_payment,
        ..open
    };

    Ok(if balance.is_cleared() {
        balance.settle(now)
    } else {
        balance
    })
}

// =============================================================================
// Mutations
// =============================================================================

/// Applies an instalment.
///
/// ## Errors
/// - `Validation` when `amount` is not positive
/// - `AmountExceedsDue` when `amount` is larger than what is owed
pub fn apply_payment(balance: Balance, amount: Money, now: DateTime<Utc>) -> CoreResult<Balance> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        }
        .into());
    }

    if amount > balance.amount_due {
        return Err(CoreError::AmountExceedsDue {
            amount,
            due: balance.amount_due,
        });
    }

    let mut next = Balance {
        amount_paid: balance.amount_paid + amount,
        amount_due: balance.amount_due - amount,
        ..balance
    };

    next = if next.is_cleared() {
        next.settle(now)
    } else {
        Balance {
            status: next.open_status(now),
            ..next
        }
    };

    check_transition(balance.status, next.status)?;
    Ok(next)
}

/// Changes the down payment of a credit document from `original` to
/// `requested`. Returns the new balance and the signed delta to record as
/// an `adjustment` payment row.
///
/// ## Errors
/// - `DownPaymentExceedsTotal` when `requested` exceeds the total, or the
///   delta would push the amount paid past it
/// - `Validation` when `requested` is negative
pub fn adjust_down_payment(
    balance: Balance,
    original: Money,
    requested: Money,
    now: DateTime<Utc>,
) -> CoreResult<(Balance, Money)> {
    if requested.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "down_payment".to_string(),
        }
        .into());
    }

    let delta = requested - original;
    let amount_paid = balance.amount_paid + delta;

    if requested > balance.total || amount_paid > balance.total {
        return Err(CoreError::DownPaymentExceedsTotal {
            down_payment: requested,
            total: balance.total,
        });
    }

    let next = Balance {
        amount_paid,
        amount_due: (balance.total - amount_paid).non_negative(),
        ..balance
    };

    let next = if next.is_cleared() {
        next.settle(now)
    } else {
        // reopen: a settled order gets a balance back
        Balance {
            status: next.open_status(now),
            paid_date: None,
            ..next
        }
    };

    Ok((next, delta))
}

/// True when an open balance is past its due date.
pub fn is_overdue(balance: &Balance, now: DateTime<Utc>) -> bool {
    balance.status == PaymentStatus::Pending
        && balance.amount_due > TOLERANCE
        && balance.due_date.is_some_and(|due| now > due)
}

/// Moves a pending balance past its due date to `overdue`.
/// Returns `None` when nothing changes.
pub fn mark_overdue(balance: Balance, now: DateTime<Utc>) -> Option<Balance> {
    is_overdue(&balance, now).then_some(Balance {
        status: PaymentStatus::Overdue,
        ..balance
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap()
    }

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn test_cash_sale_is_paid_now() {
        let b = initial_sale_settlement(cents(10000), PaymentTerm::Cash, cents(0), at(1)).unwrap();
        assert_eq!(b.status, PaymentStatus::Paid);
        assert_eq!(b.amount_paid, cents(10000));
        assert!(b.amount_due.is_zero());
        assert_eq!(b.paid_date, Some(at(1)));
        assert_eq!(b.due_date, Some(at(1)));
        assert!(b.is_consistent());
    }

    #[test]
    fn test_net_sale_with_partial_down_payment() {
        let b = initial_sale_settlement(cents(10000), PaymentTerm::Net30, cents(2500), at(1)).unwrap();
        assert_eq!(b.status, PaymentStatus::Pending);
        assert_eq!(b.amount_paid, cents(2500));
        assert_eq!(b.amount_due, cents(7500));
        assert_eq!(b.due_date, Some(at(31)));
        assert_eq!(b.paid_date, None);
        assert!(b.is_consistent());
    }

    #[test]
    fn test_down_payment_covering_total_settles_sale() {
        let b = initial_sale_settlement(cents(10000), PaymentTerm::Net30, cents(10000), at(1)).unwrap();
        assert_eq!(b.status, PaymentStatus::Paid);
        assert!(b.amount_due.is_zero());
        assert_eq!(b.paid_date, Some(at(1)));
        assert!(b.is_consistent());
    }

    #[test]
    fn test_sale_down_payment_above_total_is_capped() {
        let b = initial_sale_settlement(cents(800), PaymentTerm::Net7, cents(1000), at(1)).unwrap();
        assert_eq!(b.status, PaymentStatus::Paid);
        assert_eq!(b.amount_paid, cents(800));
        assert!(b.amount_due.is_zero());
        assert_eq!(b.paid_date, Some(at(1)));
        assert!(b.is_consistent());
    }

    #[test]
    fn test_purchase_non_credit_paid_on_order_date() {
        let order_date = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let b = initial_purchase_settlement(
            cents(5000),
            PurchasePaymentMethod::Transfer,
            cents(0),
            order_date,
            0,
            at(3),
        )
        .unwrap();
        assert_eq!(b.status, PaymentStatus::Paid);
        assert_eq!(b.paid_date, Some(order_date));
        assert_eq!(b.due_date, Some(order_date));
        assert!(b.is_consistent());
    }

    #[test]
    fn test_purchase_credit_without_down_payment() {
        let order_date = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let b = initial_purchase_settlement(
            cents(5000),
            PurchasePaymentMethod::Credit,
            cents(0),
            order_date,
            30,
            at(3),
        )
        .unwrap();
        assert_eq!(b.status, PaymentStatus::Pending);
        assert_eq!(b.amount_due, cents(5000));
        assert_eq!(b.due_date, Some(order_date + Duration::days(30)));
    }

    #[test]
    fn test_purchase_credit_down_payment_checks() {
        let order_date = at(1);
        let err = initial_purchase_settlement(
            cents(5000),
            PurchasePaymentMethod::Credit,
            cents(5001),
            order_date,
            30,
            at(1),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::DownPaymentExceedsTotal { .. }));

        let b = initial_purchase_settlement(
            cents(5000),
            PurchasePaymentMethod::Credit,
            cents(4999),
            order_date,
            30,
            at(2),
        )
        .unwrap();
        // one cent left is within tolerance
        assert_eq!(b.status, PaymentStatus::Paid);
        assert_eq!(b.paid_date, Some(at(2)));
        assert!(b.is_consistent());
    }

    #[test]
    fn test_payment_moves_pending_to_paid() {
        let open = initial_sale_settlement(cents(10000), PaymentTerm::Net30, cents(0), at(1)).unwrap();
        let partial = apply_payment(open, cents(4000), at(2)).unwrap();
        assert_eq!(partial.status, PaymentStatus::Pending);
        assert_eq!(partial.amount_due, cents(6000));
        assert!(partial.is_consistent());

        let paid = apply_payment(partial, cents(6000), at(3)).unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(paid.paid_date, Some(at(3)));
        assert!(paid.is_consistent());
    }

    #[test]
    fn test_partial_payment_after_due_date_is_overdue() {
        let open = initial_sale_settlement(cents(10000), PaymentTerm::Net7, cents(0), at(1)).unwrap();
        let late = apply_payment(open, cents(100), at(20)).unwrap();
        assert_eq!(late.status, PaymentStatus::Overdue);

        let cleared = apply_payment(late, cents(9900), at(21)).unwrap();
        assert_eq!(cleared.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_payment_exceeding_due_rejected() {
        let open = initial_sale_settlement(cents(10000), PaymentTerm::Net30, cents(9000), at(1)).unwrap();
        let err = apply_payment(open, cents(1001), at(2)).unwrap_err();
        assert!(matches!(err, CoreError::AmountExceedsDue { .. }));

        let err = apply_payment(open, cents(0), at(2)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_transitions() {
        use PaymentStatus::*;
        assert!(check_transition(Pending, Paid).is_ok());
        assert!(check_transition(Pending, Overdue).is_ok());
        assert!(check_transition(Overdue, Paid).is_ok());
        assert!(check_transition(Paid, Paid).is_ok());
        assert!(check_transition(Paid, Pending).is_err());
        assert!(check_transition(Overdue, Pending).is_err());
        assert!(check_transition(Paid, Overdue).is_err());
    }

    #[test]
    fn test_adjust_down_payment_up_and_down() {
        let open = initial_purchase_settlement(
            cents(10000),
            PurchasePaymentMethod::Credit,
            cents(2000),
            at(1),
            30,
            at(1),
        )
        .unwrap();

        let (raised, delta) = adjust_down_payment(open, cents(2000), cents(5000), at(2)).unwrap();
        assert_eq!(delta, cents(3000));
        assert_eq!(raised.amount_paid, cents(5000));
        assert_eq!(raised.amount_due, cents(5000));
        assert_eq!(raised.status, PaymentStatus::Pending);
        assert!(raised.is_consistent());

        let (settled, _) = adjust_down_payment(raised, cents(5000), cents(10000), at(3)).unwrap();
        assert_eq!(settled.status, PaymentStatus::Paid);

        // lowering it again reopens the balance
        let (reopened, delta) =
            adjust_down_payment(settled, cents(10000), cents(4000), at(4)).unwrap();
        assert_eq!(delta, cents(-6000));
        assert_eq!(reopened.status, PaymentStatus::Pending);
        assert_eq!(reopened.amount_due, cents(6000));
        assert_eq!(reopened.paid_date, None);
        assert!(reopened.is_consistent());
    }

    #[test]
    fn test_adjust_down_payment_limits() {
        let open = initial_purchase_settlement(
            cents(10000),
            PurchasePaymentMethod::Credit,
            cents(0),
            at(1),
            30,
            at(1),
        )
        .unwrap();
        assert!(adjust_down_payment(open, cents(0), cents(10001), at(2)).is_err());
        assert!(adjust_down_payment(open, cents(0), cents(-1), at(2)).is_err());

        // instalments already paid count against the total
        let paid_some = apply_payment(open, cents(8000), at(2)).unwrap();
        let err = adjust_down_payment(paid_some, cents(0), cents(3000), at(3)).unwrap_err();
        assert!(matches!(err, CoreError::DownPaymentExceedsTotal { .. }));
    }

    #[test]
    fn test_mark_overdue() {
        let open = initial_sale_settlement(cents(10000), PaymentTerm::Net7, cents(0), at(1)).unwrap();
        assert!(mark_overdue(open, at(8)).is_none());
        let late = mark_overdue(open, at(9)).unwrap();
        assert_eq!(late.status, PaymentStatus::Overdue);
        assert!(mark_overdue(late, at(10)).is_none());

        let paid = initial_sale_settlement(cents(10000), PaymentTerm::Cash, cents(0), at(1)).unwrap();
        assert!(mark_overdue(paid, at(30)).is_none());
    }
}
