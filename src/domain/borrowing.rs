use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    BookBorrowed, BookReturned, BorrowingId, BorrowingStatus, CheckoutError, Ineligibility,
    LendingPolicy, MemberAccount, MemberId, ReservationToken, ReturnError, TitleId, fine,
};

/// Borrowing集約 - 1冊の1回の貸出
///
/// 永続化される状態は「返却済みか否か」（`returned_at`）のみ。
/// 延滞は`status_at`で導出し、バッチの実行有無に左右されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrowing {
    // 識別子
    pub borrowing_id: BorrowingId,

    // 他の集約への参照（IDのみ）
    pub title_id: TitleId,
    pub member_id: MemberId,

    // 貸出管理の責務
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,

    // 監査情報
    pub updated_at: DateTime<Utc>,
}

impl Borrowing {
    pub fn is_returned(&self) -> bool {
        self.returned_at.is_some()
    }

    /// 純粋関数：指定時刻における実効ステータス
    pub fn status_at(&self, now: DateTime<Utc>) -> BorrowingStatus {
        if self.is_returned() {
            BorrowingStatus::Returned
        } else if now > self.due_at {
            BorrowingStatus::Overdue
        } else {
            BorrowingStatus::Active
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == BorrowingStatus::Overdue
    }

    /// 返却期限までの日数（返却済みなら`None`、期限切れなら負）
    pub fn days_until_due(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.is_returned() {
            return None;
        }
        Some((self.due_at - now).num_days())
    }

    /// 延滞日数。返却済みなら返却時点で固定される。
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        fine::overdue_days(self.due_at, self.returned_at.unwrap_or(now))
    }

    /// 延滞料金。返却済みなら`returned_at`、未返却なら`now`で計算する。
    pub fn fine_at(&self, now: DateTime<Utc>, policy: &LendingPolicy) -> Decimal {
        fine::calculate_fine(self.due_at, self.returned_at.unwrap_or(now), policy)
    }
}

/// 純粋関数：会員が新たに借りられるか
///
/// ビジネスルール：
/// - 会員ステータスがActive
/// - 貸出中の冊数が上限未満
pub fn check_eligibility(
    member: &MemberAccount,
    policy: &LendingPolicy,
) -> Result<(), CheckoutError> {
    if !member.status.can_borrow() {
        return Err(CheckoutError::MemberIneligible(Ineligibility::NotActive(
            member.status,
        )));
    }

    if member.active_borrowings >= policy.max_active_borrowings {
        return Err(CheckoutError::MemberIneligible(
            Ineligibility::BorrowingLimitReached {
                limit: policy.max_active_borrowings,
            },
        ));
    }

    Ok(())
}

/// 純粋関数：貸出を作成する
///
/// ビジネスルール：
/// - 在庫の予約（`ReservationToken`）が済んでいること
/// - 会員が貸出可能であること
/// - 返却期限は指定がなければ貸出日時 + 貸出期間
///
/// 副作用なし。新しいBorrowingとイベントを返す。
pub fn open_borrowing(
    reservation: ReservationToken,
    member: &MemberAccount,
    borrowed_at: DateTime<Utc>,
    due_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    policy: &LendingPolicy,
) -> Result<(Borrowing, BookBorrowed), CheckoutError> {
    check_eligibility(member, policy)?;

    let due_at = due_at.unwrap_or(borrowed_at + policy.loan_duration());
    if due_at <= borrowed_at {
        return Err(CheckoutError::InvalidDueDate);
    }

    let borrowing = Borrowing {
        borrowing_id: BorrowingId::new(),
        title_id: reservation.title_id(),
        member_id: member.member_id,
        borrowed_at,
        due_at,
        returned_at: None,
        notes,
        updated_at: borrowed_at,
    };

    let event = BookBorrowed {
        borrowing_id: borrowing.borrowing_id,
        title_id: borrowing.title_id,
        member_id: borrowing.member_id,
        borrowed_at,
        due_at,
    };

    Ok((borrowing, event))
}

/// 純粋関数：書籍を返却する
///
/// ビジネスルール：
/// - ActiveでもOverdueでも返却を受け付ける
/// - 返却済みへの再返却は拒否する（在庫の二重加算を防ぐ）
///
/// 副作用なし。新しいBorrowingとイベントを返す。
pub fn return_borrowing(
    borrowing: &Borrowing,
    returned_at: DateTime<Utc>,
) -> Result<(Borrowing, BookReturned), ReturnError> {
    if borrowing.is_returned() {
        return Err(ReturnError::AlreadyReturned);
    }

    let was_overdue = borrowing.is_overdue(returned_at);

    let returned = Borrowing {
        returned_at: Some(returned_at),
        updated_at: returned_at,
        ..borrowing.clone()
    };

    let event = BookReturned {
        borrowing_id: borrowing.borrowing_id,
        title_id: borrowing.title_id,
        member_id: borrowing.member_id,
        returned_at,
        was_overdue,
    };

    Ok((returned, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MembershipStatus, inventory};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn policy() -> LendingPolicy {
        LendingPolicy {
            loan_period_days: 14,
            daily_rate: dec!(0.50),
            max_fine: dec!(10.00),
            max_active_borrowings: 2,
        }
    }

    fn token() -> ReservationToken {
        let title =
            inventory::register_title("Dune".into(), "Frank Herbert".into(), None, 1, Utc::now());
        let (_, token) = inventory::reserve(&title, Utc::now()).unwrap();
        token
    }

    fn active_member() -> MemberAccount {
        MemberAccount::new(MemberId::new(), MembershipStatus::Active)
    }

    #[test]
    fn test_open_borrowing_sets_due_date_from_policy() {
        let member = active_member();
        let borrowed_at = Utc::now();
        let token = token();

        let (borrowing, event) =
            open_borrowing(token, &member, borrowed_at, None, None, &policy()).unwrap();

        assert_eq!(borrowing.due_at, borrowed_at + Duration::days(14));
        assert_eq!(borrowing.title_id, token.title_id());
        assert_eq!(borrowing.member_id, member.member_id);
        assert_eq!(borrowing.status_at(borrowed_at), BorrowingStatus::Active);
        assert!(borrowing.returned_at.is_none());

        assert_eq!(event.borrowing_id, borrowing.borrowing_id);
        assert_eq!(event.due_at, borrowing.due_at);
    }

    #[test]
    fn test_open_borrowing_accepts_explicit_due_date() {
        let borrowed_at = Utc::now();
        let due_at = borrowed_at + Duration::days(3);
        let (borrowing, _) = open_borrowing(
            token(),
            &active_member(),
            borrowed_at,
            Some(due_at),
            Some("reference desk copy".into()),
            &policy(),
        )
        .unwrap();
        assert_eq!(borrowing.due_at, due_at);
        assert_eq!(borrowing.notes.as_deref(), Some("reference desk copy"));
    }

    #[test]
    fn test_open_borrowing_rejects_due_date_in_past() {
        let borrowed_at = Utc::now();
        let result = open_borrowing(
            token(),
            &active_member(),
            borrowed_at,
            Some(borrowed_at - Duration::days(1)),
            None,
            &policy(),
        );
        assert_eq!(result.unwrap_err(), CheckoutError::InvalidDueDate);
    }

    #[test]
    fn test_suspended_member_is_ineligible() {
        let member = MemberAccount::new(MemberId::new(), MembershipStatus::Suspended);
        assert_eq!(
            check_eligibility(&member, &policy()).unwrap_err(),
            CheckoutError::MemberIneligible(Ineligibility::NotActive(MembershipStatus::Suspended))
        );
    }

    #[test]
    fn test_member_at_limit_is_ineligible() {
        let member = active_member()
            .with_borrowing_opened()
            .with_borrowing_opened();
        assert_eq!(
            check_eligibility(&member, &policy()).unwrap_err(),
            CheckoutError::MemberIneligible(Ineligibility::BorrowingLimitReached { limit: 2 })
        );
    }

    #[test]
    fn test_overdue_is_derived_from_time() {
        let borrowed_at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let (borrowing, _) =
            open_borrowing(token(), &active_member(), borrowed_at, None, None, &policy()).unwrap();

        assert!(!borrowing.is_overdue(borrowing.due_at));
        assert!(borrowing.is_overdue(borrowing.due_at + Duration::seconds(1)));
        assert_eq!(
            borrowing.days_until_due(borrowed_at + Duration::days(4)),
            Some(10)
        );
        assert_eq!(borrowing.days_overdue(borrowing.due_at + Duration::days(3)), 3);
    }

    #[test]
    fn test_return_borrowing_success() {
        let borrowed_at = Utc::now();
        let (borrowing, _) =
            open_borrowing(token(), &active_member(), borrowed_at, None, None, &policy()).unwrap();
        let returned_at = borrowed_at + Duration::days(7);

        let (returned, event) = return_borrowing(&borrowing, returned_at).unwrap();

        assert_eq!(returned.returned_at, Some(returned_at));
        assert_eq!(returned.status_at(returned_at), BorrowingStatus::Returned);
        assert_eq!(returned.days_until_due(returned_at), None);
        assert!(!event.was_overdue);
        assert_eq!(event.borrowing_id, borrowing.borrowing_id);
    }

    #[test]
    fn test_return_borrowing_detects_overdue() {
        let borrowed_at = Utc::now();
        let (borrowing, _) =
            open_borrowing(token(), &active_member(), borrowed_at, None, None, &policy()).unwrap();

        let (_, event) = return_borrowing(&borrowing, borrowed_at + Duration::days(20)).unwrap();
        assert!(event.was_overdue);
    }

    #[test]
    fn test_return_borrowing_fails_when_already_returned() {
        let borrowed_at = Utc::now();
        let (borrowing, _) =
            open_borrowing(token(), &active_member(), borrowed_at, None, None, &policy()).unwrap();
        let (returned, _) = return_borrowing(&borrowing, borrowed_at + Duration::days(1)).unwrap();

        let result = return_borrowing(&returned, borrowed_at + Duration::days(2));
        assert_eq!(result.unwrap_err(), ReturnError::AlreadyReturned);
    }

    #[test]
    fn test_live_and_final_fine_agree_at_return_instant() {
        let borrowed_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let (borrowing, _) =
            open_borrowing(token(), &active_member(), borrowed_at, None, None, &policy()).unwrap();
        let returned_at = borrowing.due_at + Duration::days(5);

        let live = borrowing.fine_at(returned_at, &policy());
        let (returned, _) = return_borrowing(&borrowing, returned_at).unwrap();
        let fixed = returned.fine_at(returned_at + Duration::days(30), &policy());

        assert_eq!(live, dec!(2.50));
        assert_eq!(live, fixed);
    }
}
