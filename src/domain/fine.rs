use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BorrowingId, FineAssessed, FinePaid, FinePaymentError, LendingPolicy, MemberId};

const SECONDS_PER_DAY: i64 = 86_400;

/// 純粋関数：延滞日数
///
/// 期限を1秒でも過ぎれば1日と数える（切り上げ）。
pub fn overdue_days(due_at: DateTime<Utc>, as_of: DateTime<Utc>) -> i64 {
    if as_of <= due_at {
        return 0;
    }
    let late_seconds = (as_of - due_at).num_seconds();
    // 1秒未満の遅れも1日
    let late_seconds = late_seconds.max(1);
    (late_seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

/// 純粋関数：延滞料金
///
/// `min(延滞日数 × 日額, 上限)`。返却済みなら`returned_at`、
/// 未返却なら現在時刻で呼ぶ。同じ入力には常に同じ値を返す。
pub fn calculate_fine(
    due_at: DateTime<Utc>,
    returned_at_or_now: DateTime<Utc>,
    policy: &LendingPolicy,
) -> Decimal {
    let days = overdue_days(due_at, returned_at_or_now);
    if days == 0 {
        return Decimal::ZERO;
    }
    let amount = Decimal::from(days) * policy.daily_rate;
    amount.min(policy.max_fine).round_dp(2)
}

/// 延滞料金のスナップショット
///
/// 集計用のキャッシュ。正は常に`calculate_fine`による再計算。
/// `finalized`は返却時に確定したことを示す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    pub borrowing_id: BorrowingId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub overdue_days: i64,
    pub reason: String,
    pub computed_at: DateTime<Utc>,
    pub finalized: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Fine {
    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }
}

fn overdue_reason(days: i64) -> String {
    format!("Overdue by {} day{}", days, if days == 1 { "" } else { "s" })
}

/// 純粋関数：延滞料金のスナップショットを作る
///
/// 延滞していなければ`None`。
pub fn assess_fine(
    borrowing_id: BorrowingId,
    member_id: MemberId,
    due_at: DateTime<Utc>,
    as_of: DateTime<Utc>,
    finalized: bool,
    policy: &LendingPolicy,
) -> Option<Fine> {
    let days = overdue_days(due_at, as_of);
    if days == 0 {
        return None;
    }

    Some(Fine {
        borrowing_id,
        member_id,
        amount: calculate_fine(due_at, as_of, policy),
        overdue_days: days,
        reason: overdue_reason(days),
        computed_at: as_of,
        finalized,
        paid_at: None,
    })
}

impl From<&Fine> for FineAssessed {
    fn from(fine: &Fine) -> Self {
        FineAssessed {
            borrowing_id: fine.borrowing_id,
            member_id: fine.member_id,
            amount: fine.amount,
            overdue_days: fine.overdue_days,
            assessed_at: fine.computed_at,
        }
    }
}

/// 純粋関数：延滞料金を支払済みにする
pub fn pay_fine(fine: &Fine, paid_at: DateTime<Utc>) -> Result<(Fine, FinePaid), FinePaymentError> {
    if !fine.finalized {
        return Err(FinePaymentError::NotFinalized);
    }
    if fine.is_paid() {
        return Err(FinePaymentError::AlreadyPaid);
    }

    let paid = Fine {
        paid_at: Some(paid_at),
        ..fine.clone()
    };

    let event = FinePaid {
        borrowing_id: fine.borrowing_id,
        member_id: fine.member_id,
        amount: fine.amount,
        paid_at,
    };

    Ok((paid, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn policy() -> LendingPolicy {
        LendingPolicy {
            loan_period_days: 14,
            daily_rate: dec!(0.50),
            max_fine: dec!(10.00),
            max_active_borrowings: 5,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_no_fine_on_or_before_due_date() {
        let due = date(2024, 1, 10);
        assert_eq!(calculate_fine(due, due, &policy()), Decimal::ZERO);
        assert_eq!(
            calculate_fine(due, due - Duration::days(3), &policy()),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_five_days_late() {
        let fine = calculate_fine(date(2024, 1, 10), date(2024, 1, 15), &policy());
        assert_eq!(fine, dec!(2.50));
    }

    #[test]
    fn test_fine_is_capped() {
        let fine = calculate_fine(date(2024, 1, 10), date(2024, 2, 1), &policy());
        assert_eq!(overdue_days(date(2024, 1, 10), date(2024, 2, 1)), 22);
        assert_eq!(fine, dec!(10.00));
    }

    #[test]
    fn test_partial_day_rounds_up() {
        let due = date(2024, 1, 10);
        assert_eq!(overdue_days(due, due + Duration::seconds(1)), 1);
        assert_eq!(overdue_days(due, due + Duration::milliseconds(1)), 1);
        assert_eq!(overdue_days(due, due + Duration::hours(25)), 2);
        assert_eq!(calculate_fine(due, due + Duration::hours(1), &policy()), dec!(0.50));
    }

    #[test]
    fn test_fine_is_monotonic_in_return_time() {
        let due = date(2024, 1, 10);
        let mut previous = Decimal::ZERO;
        for hours in 0..(24 * 40) {
            let fine = calculate_fine(due, due + Duration::hours(hours), &policy());
            assert!(fine >= previous);
            assert!(fine <= policy().max_fine);
            previous = fine;
        }
    }

    #[test]
    fn test_assess_fine_builds_reason() {
        let borrowing_id = BorrowingId::new();
        let member_id = MemberId::new();
        let fine = assess_fine(
            borrowing_id,
            member_id,
            date(2024, 1, 10),
            date(2024, 1, 11),
            true,
            &policy(),
        )
        .unwrap();
        assert_eq!(fine.reason, "Overdue by 1 day");
        assert_eq!(fine.amount, dec!(0.50));
        assert!(fine.finalized);
        assert!(!fine.is_paid());

        assert!(
            assess_fine(
                borrowing_id,
                member_id,
                date(2024, 1, 10),
                date(2024, 1, 9),
                true,
                &policy()
            )
            .is_none()
        );
    }

    #[test]
    fn test_pay_fine_only_once_and_only_when_final() {
        let provisional = assess_fine(
            BorrowingId::new(),
            MemberId::new(),
            date(2024, 1, 10),
            date(2024, 1, 15),
            false,
            &policy(),
        )
        .unwrap();
        assert_eq!(
            pay_fine(&provisional, date(2024, 1, 16)).unwrap_err(),
            FinePaymentError::NotFinalized
        );

        let final_fine = Fine {
            finalized: true,
            ..provisional
        };
        let (paid, event) = pay_fine(&final_fine, date(2024, 1, 16)).unwrap();
        assert!(paid.is_paid());
        assert_eq!(event.amount, dec!(2.50));
        assert_eq!(
            pay_fine(&paid, date(2024, 1, 17)).unwrap_err(),
            FinePaymentError::AlreadyPaid
        );
    }
}
