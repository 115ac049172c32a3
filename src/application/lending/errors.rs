use crate::domain::{
    CheckoutError, FinePaymentError, Ineligibility, InventoryError, ReturnError,
};
use crate::ports::{capability::CapabilityError, lending_store::StoreError};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 貸出管理アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum LendingError {
    /// 権限がない（ロックを取る前に判定される）
    #[error("Forbidden")]
    Forbidden,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Title not found")]
    TitleNotFound,

    #[error("Borrowing not found")]
    BorrowingNotFound,

    #[error("Fine not found")]
    FineNotFound,

    /// 貸出可能な本が残っていない
    #[error("No copies available")]
    OutOfCopies,

    /// 会員が貸出できない状態
    #[error("Member is not eligible to borrow: {0}")]
    MemberIneligible(Ineligibility),

    /// 同じタイトルを返却前に再度借りようとした
    #[error("Member already has this title on loan")]
    AlreadyBorrowed,

    #[error("Due date must be after the borrowing time")]
    InvalidDueDate,

    #[error("Borrowing has already been returned")]
    AlreadyReturned,

    /// 貸出中の本は除籍できない
    #[error("Cannot remove {requested} copies, only {available} on the shelf")]
    CopiesOnLoan { available: u32, requested: u32 },

    #[error("Copy adjustment must be non-zero")]
    InvalidAdjustment,

    /// 返却前の暫定料金は支払えない
    #[error("Fine is provisional until the book is returned")]
    FineNotPayable,

    #[error("Fine has already been paid")]
    FineAlreadyPaid,

    /// 在庫や会員の不変条件が破れている。握りつぶさない。
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// ロック待ちタイムアウトなど。再試行してよい。
    #[error("Transient store failure")]
    Transient(#[source] BoxError),

    #[error("Store error")]
    Store(#[source] BoxError),

    #[error("Capability service error")]
    CapabilityService(#[source] BoxError),
}

impl LendingError {
    /// 不変条件違反をログに残してから返す
    pub(crate) fn invariant_violation(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(detail = %detail, "lending invariant violated");
        LendingError::InvariantViolation(detail)
    }

    /// 再試行で成功しうるエラーか
    pub fn is_transient(&self) -> bool {
        matches!(self, LendingError::Transient(_))
    }
}

impl From<InventoryError> for LendingError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::OutOfCopies => LendingError::OutOfCopies,
            InventoryError::CopiesOnLoan {
                available,
                requested,
            } => LendingError::CopiesOnLoan {
                available,
                requested,
            },
            InventoryError::InvalidAdjustment => LendingError::InvalidAdjustment,
            InventoryError::InvariantViolation(detail) => LendingError::invariant_violation(detail),
        }
    }
}

impl From<CheckoutError> for LendingError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::MemberIneligible(reason) => LendingError::MemberIneligible(reason),
            CheckoutError::InvalidDueDate => LendingError::InvalidDueDate,
        }
    }
}

impl From<ReturnError> for LendingError {
    fn from(err: ReturnError) -> Self {
        match err {
            ReturnError::AlreadyReturned => LendingError::AlreadyReturned,
        }
    }
}

impl From<FinePaymentError> for LendingError {
    fn from(err: FinePaymentError) -> Self {
        match err {
            FinePaymentError::NotFinalized => LendingError::FineNotPayable,
            FinePaymentError::AlreadyPaid => LendingError::FineAlreadyPaid,
        }
    }
}

impl From<StoreError> for LendingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(source) => LendingError::Transient(source),
            StoreError::Backend(source) => LendingError::Store(source),
        }
    }
}

impl From<CapabilityError> for LendingError {
    fn from(err: CapabilityError) -> Self {
        LendingError::CapabilityService(err.0)
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LendingError>;
