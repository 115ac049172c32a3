use thiserror::Error;

use super::MembershipStatus;

/// 在庫台帳のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// 貸出可能な冊数がない
    #[error("no available copies")]
    OutOfCopies,

    /// 貸出中の冊数を超えて除籍しようとした
    #[error("cannot remove {requested} copies, only {available} on the shelf")]
    CopiesOnLoan { available: u32, requested: u32 },

    /// 0冊の増減
    #[error("copy adjustment must be non-zero")]
    InvalidAdjustment,

    /// 冊数の不変条件（0 <= available <= total）が壊れる
    ///
    /// 二重返却やデータ破損を示すため、握りつぶしてはならない。
    #[error("inventory invariant violated: {0}")]
    InvariantViolation(String),
}

/// 会員が貸出できない理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ineligibility {
    #[error("membership is {}", .0.as_str())]
    NotActive(MembershipStatus),

    #[error("borrowing limit of {limit} reached")]
    BorrowingLimitReached { limit: u32 },
}

/// 貸出作成のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("member is not eligible to borrow: {0}")]
    MemberIneligible(Ineligibility),

    /// 返却期限が貸出日時以前
    #[error("due date must be after the borrowing time")]
    InvalidDueDate,
}

/// 返却のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnError {
    /// 既に返却済み
    #[error("borrowing has already been returned")]
    AlreadyReturned,
}

/// 延滞料金支払いのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinePaymentError {
    /// 返却前の暫定料金は支払えない
    #[error("fine is provisional until the book is returned")]
    NotFinalized,

    #[error("fine has already been paid")]
    AlreadyPaid,
}
