//! Fine arithmetic and overdue detection.
//!
//! Lateness is counted in whole UTC calendar days: a book due on the 10th and
//! returned any time on the 10th is on time, returned on the 12th is two days late.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::FineStatus;

/// Whole calendar days between `due` and `at`, zero when `at` is on or before the due day.
#[must_use]
pub fn days_late(due: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (at.date_naive() - due.date_naive()).num_days().max(0)
}

#[must_use]
pub fn is_overdue(due: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    days_late(due, now) > 0
}

/// Fine owed for a book returned at `returned`.
#[must_use]
pub fn calculate_fine(due: DateTime<Utc>, returned: DateTime<Utc>, fine_per_day: Decimal) -> Decimal {
    Decimal::from(days_late(due, returned)) * fine_per_day
}

/// Projected fine for a loan that is still out.
#[must_use]
pub fn accrued_fine(due: DateTime<Utc>, now: DateTime<Utc>, fine_per_day: Decimal) -> Decimal {
    calculate_fine(due, now, fine_per_day)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("payment amount must be positive")]
    NonPositive,
    #[error("payment amount cannot have more than 2 decimal places")]
    SubCent,
    #[error("fine is already paid")]
    AlreadyPaid,
    #[error("payment of {payment} exceeds remaining balance of {remaining}")]
    Overpayment { payment: Decimal, remaining: Decimal },
}

/// Apply a payment to a fine, returning the new paid amount and status.
///
/// # Errors
/// Rejects non-positive or sub-cent payments, payments on settled fines, and overpayment.
pub fn apply_payment(
    amount: Decimal,
    paid_amount: Decimal,
    status: FineStatus,
    payment: Decimal,
) -> Result<(Decimal, FineStatus), PaymentError> {
    if status == FineStatus::Paid {
        return Err(PaymentError::AlreadyPaid);
    }
    if payment <= Decimal::ZERO {
        return Err(PaymentError::NonPositive);
    }
    // Balances are stored as NUMERIC(10,2).
    if payment.normalize().scale() > 2 {
        return Err(PaymentError::SubCent);
    }
    let remaining = amount - paid_amount;
    if payment > remaining {
        return Err(PaymentError::Overpayment { payment, remaining });
    }

    let new_paid = paid_amount + payment;
    let new_status = if new_paid >= amount {
        FineStatus::Paid
    } else {
        FineStatus::PartiallyPaid
    };
    Ok((new_paid, new_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn rate() -> Decimal {
        Decimal::new(50, 2)
    }

    #[test]
    fn on_time_and_same_day_returns_are_free() {
        assert_eq!(calculate_fine(at(10, 12), at(9, 8), rate()), Decimal::ZERO);
        assert_eq!(calculate_fine(at(10, 12), at(10, 23), rate()), Decimal::ZERO);
    }

    #[test]
    fn late_return_charges_per_calendar_day() {
        assert_eq!(days_late(at(10, 12), at(12, 1)), 2);
        assert_eq!(calculate_fine(at(10, 12), at(13, 9), rate()), Decimal::new(150, 2));
    }

    #[test]
    fn overdue_flag_follows_days_late() {
        assert!(!is_overdue(at(10, 12), at(10, 20)));
        assert!(is_overdue(at(10, 12), at(11, 0)));
    }

    #[test]
    fn partial_then_full_payment() {
        let amount = Decimal::new(300, 2);
        let (paid, status) =
            apply_payment(amount, Decimal::ZERO, FineStatus::Pending, Decimal::ONE).unwrap();
        assert_eq!(paid, Decimal::ONE);
        assert_eq!(status, FineStatus::PartiallyPaid);

        let (paid, status) = apply_payment(amount, paid, status, Decimal::TWO).unwrap();
        assert_eq!(paid, amount);
        assert_eq!(status, FineStatus::Paid);
    }

    #[test]
    fn payment_rejections() {
        let amount = Decimal::new(100, 2);
        assert_eq!(
            apply_payment(amount, Decimal::ZERO, FineStatus::Pending, Decimal::ZERO),
            Err(PaymentError::NonPositive)
        );
        assert_eq!(
            apply_payment(amount, amount, FineStatus::Paid, Decimal::ONE),
            Err(PaymentError::AlreadyPaid)
        );
        assert!(matches!(
            apply_payment(amount, Decimal::ZERO, FineStatus::Pending, Decimal::TWO),
            Err(PaymentError::Overpayment { .. })
        ));
    }

    #[test]
    fn sub_cent_payment_is_rejected_and_fine_can_still_be_settled() {
        let amount = Decimal::new(100, 2);
        assert_eq!(
            apply_payment(amount, Decimal::ZERO, FineStatus::Pending, Decimal::new(995, 3)),
            Err(PaymentError::SubCent)
        );

        let (paid, status) =
            apply_payment(amount, Decimal::ZERO, FineStatus::Pending, Decimal::new(99, 2)).unwrap();
        assert_eq!(status, FineStatus::PartiallyPaid);
        let (paid, status) = apply_payment(amount, paid, status, Decimal::new(1, 2)).unwrap();
        assert_eq!(paid, amount);
        assert_eq!(status, FineStatus::Paid);
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        let (paid, status) = apply_payment(
            Decimal::new(200, 2),
            Decimal::ZERO,
            FineStatus::Pending,
            Decimal::new(2000, 3),
        )
        .unwrap();
        assert_eq!(paid, Decimal::TWO);
        assert_eq!(status, FineStatus::Paid);
    }
}
