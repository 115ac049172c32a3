use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CopiesAdjusted, InventoryError, TitleId};

/// カタログ上のタイトルと蔵書数
///
/// 不変条件：`0 <= available_copies <= total_copies`
/// 冊数を変更できるのは在庫台帳の純粋関数のみ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub title_id: TitleId,
    pub name: String,
    pub author: String,
    pub isbn: Option<String>,
    pub total_copies: u32,
    pub available_copies: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Title {
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    pub fn on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    /// 保存済みの冊数が不変条件を満たしているか
    pub fn check_invariant(&self) -> Result<(), InventoryError> {
        if self.available_copies > self.total_copies {
            return Err(InventoryError::InvariantViolation(format!(
                "title {} has available_copies {} > total_copies {}",
                self.title_id, self.available_copies, self.total_copies
            )));
        }
        Ok(())
    }
}

/// 予約トークン
///
/// `reserve`が成功したことの証明。貸出作成にはこれが必要。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationToken {
    title_id: TitleId,
}

impl ReservationToken {
    pub fn title_id(&self) -> TitleId {
        self.title_id
    }
}

/// 純粋関数：タイトルを新規登録する
///
/// 登録直後は全冊が貸出可能。
pub fn register_title(
    name: String,
    author: String,
    isbn: Option<String>,
    total_copies: u32,
    registered_at: DateTime<Utc>,
) -> Title {
    Title {
        title_id: TitleId::new(),
        name,
        author,
        isbn,
        total_copies,
        available_copies: total_copies,
        created_at: registered_at,
        updated_at: registered_at,
    }
}

/// 純粋関数：1冊を予約する
///
/// ロックの取得は呼び出し側の責務。ロック下で呼ばれることで
/// 最後の1冊を2つの予約が同時に取ることはない。
pub fn reserve(
    title: &Title,
    reserved_at: DateTime<Utc>,
) -> Result<(Title, ReservationToken), InventoryError> {
    title.check_invariant()?;

    if title.available_copies == 0 {
        return Err(InventoryError::OutOfCopies);
    }

    let updated = Title {
        available_copies: title.available_copies - 1,
        updated_at: reserved_at,
        ..title.clone()
    };

    Ok((
        updated,
        ReservationToken {
            title_id: title.title_id,
        },
    ))
}

/// 純粋関数：1冊を書架に戻す
///
/// 総冊数を超える場合は二重返却とみなし`InvariantViolation`を返す。
pub fn release(title: &Title, released_at: DateTime<Utc>) -> Result<Title, InventoryError> {
    title.check_invariant()?;

    if title.available_copies >= title.total_copies {
        return Err(InventoryError::InvariantViolation(format!(
            "release of title {} would exceed total_copies {}",
            title.title_id, title.total_copies
        )));
    }

    Ok(Title {
        available_copies: title.available_copies + 1,
        updated_at: released_at,
        ..title.clone()
    })
}

/// 純粋関数：蔵書数を増減する
///
/// ビジネスルール：
/// - 増加分はすべて書架に並ぶ（available も同数増える）
/// - 減少は書架にある分のみ（貸出中の本は除籍できない）
pub fn adjust_total(
    title: &Title,
    delta: i64,
    adjusted_at: DateTime<Utc>,
) -> Result<(Title, CopiesAdjusted), InventoryError> {
    title.check_invariant()?;

    if delta == 0 {
        return Err(InventoryError::InvalidAdjustment);
    }

    let (total_copies, available_copies) = if delta > 0 {
        let added = u32::try_from(delta).map_err(|_| InventoryError::InvalidAdjustment)?;
        let total = title
            .total_copies
            .checked_add(added)
            .ok_or(InventoryError::InvalidAdjustment)?;
        (total, title.available_copies + added)
    } else {
        let removed =
            u32::try_from(delta.unsigned_abs()).map_err(|_| InventoryError::InvalidAdjustment)?;
        if removed > title.available_copies {
            return Err(InventoryError::CopiesOnLoan {
                available: title.available_copies,
                requested: removed,
            });
        }
        (
            title.total_copies - removed,
            title.available_copies - removed,
        )
    };

    let updated = Title {
        total_copies,
        available_copies,
        updated_at: adjusted_at,
        ..title.clone()
    };

    let event = CopiesAdjusted {
        title_id: title.title_id,
        delta,
        total_copies,
        available_copies,
        adjusted_at,
    };

    Ok((updated, event))
}

/// 純粋関数：タイトルを除籍する（書架の全冊を取り除く）
///
/// 1冊でも貸出中なら`CopiesOnLoan`。
pub fn retire(
    title: &Title,
    retired_at: DateTime<Utc>,
) -> Result<(Title, Option<CopiesAdjusted>), InventoryError> {
    title.check_invariant()?;

    let on_loan = title.on_loan();
    if on_loan > 0 {
        return Err(InventoryError::CopiesOnLoan {
            available: title.available_copies,
            requested: title.total_copies,
        });
    }

    if title.total_copies == 0 {
        return Ok((title.clone(), None));
    }

    let (updated, event) = adjust_total(title, -i64::from(title.total_copies), retired_at)?;
    Ok((updated, Some(event)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_with(total: u32, available: u32) -> Title {
        let now = Utc::now();
        Title {
            available_copies: available,
            ..register_title(
                "Dune".to_string(),
                "Frank Herbert".to_string(),
                None,
                total,
                now,
            )
        }
    }

    #[test]
    fn test_register_title_shelves_all_copies() {
        let title = register_title("Dune".into(), "Frank Herbert".into(), None, 3, Utc::now());
        assert_eq!(title.total_copies, 3);
        assert_eq!(title.available_copies, 3);
        assert!(title.is_available());
    }

    #[test]
    fn test_reserve_decrements_available() {
        let title = title_with(2, 2);
        let (updated, token) = reserve(&title, Utc::now()).unwrap();
        assert_eq!(updated.available_copies, 1);
        assert_eq!(updated.total_copies, 2);
        assert_eq!(token.title_id(), title.title_id);
    }

    #[test]
    fn test_reserve_fails_when_no_copies_left() {
        let title = title_with(1, 0);
        let result = reserve(&title, Utc::now());
        assert_eq!(result.unwrap_err(), InventoryError::OutOfCopies);
    }

    #[test]
    fn test_release_increments_available() {
        let title = title_with(2, 1);
        let updated = release(&title, Utc::now()).unwrap();
        assert_eq!(updated.available_copies, 2);
    }

    #[test]
    fn test_release_rejects_double_release() {
        let title = title_with(2, 2);
        let result = release(&title, Utc::now());
        assert!(matches!(result, Err(InventoryError::InvariantViolation(_))));
    }

    #[test]
    fn test_corrupted_counts_are_reported() {
        let title = title_with(1, 3);
        assert!(matches!(
            reserve(&title, Utc::now()),
            Err(InventoryError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_adjust_total_adds_copies_to_shelf() {
        let title = title_with(2, 1);
        let (updated, event) = adjust_total(&title, 3, Utc::now()).unwrap();
        assert_eq!(updated.total_copies, 5);
        assert_eq!(updated.available_copies, 4);
        assert_eq!(event.delta, 3);
        assert_eq!(event.total_copies, 5);
    }

    #[test]
    fn test_adjust_total_removes_only_shelved_copies() {
        let title = title_with(3, 1);
        let result = adjust_total(&title, -2, Utc::now());
        assert_eq!(
            result.unwrap_err(),
            InventoryError::CopiesOnLoan {
                available: 1,
                requested: 2
            }
        );

        let (updated, _) = adjust_total(&title, -1, Utc::now()).unwrap();
        assert_eq!(updated.total_copies, 2);
        assert_eq!(updated.available_copies, 0);
    }

    #[test]
    fn test_adjust_total_rejects_zero() {
        let title = title_with(1, 1);
        assert_eq!(
            adjust_total(&title, 0, Utc::now()).unwrap_err(),
            InventoryError::InvalidAdjustment
        );
    }

    #[test]
    fn test_retire_requires_all_copies_returned() {
        let title = title_with(2, 1);
        assert!(matches!(
            retire(&title, Utc::now()),
            Err(InventoryError::CopiesOnLoan { .. })
        ));

        let title = title_with(2, 2);
        let (retired, event) = retire(&title, Utc::now()).unwrap();
        assert_eq!(retired.total_copies, 0);
        assert_eq!(retired.available_copies, 0);
        assert_eq!(event.unwrap().delta, -2);
    }
}
