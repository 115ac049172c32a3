use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Borrowing, Fine, LendingPolicy, MemberId, Title, TitleId, commands::*};

/// 貸出リクエスト（POST /borrowings）
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub member_id: Uuid,
    pub title_id: Uuid,
    /// 省略時はポリシーの貸出期間
    pub due_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl CheckoutRequest {
    pub fn to_command(&self, borrowed_at: DateTime<Utc>) -> Checkout {
        Checkout {
            member_id: MemberId::from_uuid(self.member_id),
            title_id: TitleId::from_uuid(self.title_id),
            borrowed_at,
            due_at: self.due_at,
            notes: self.notes.clone(),
        }
    }
}

/// 延滞一覧のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct OverdueQuery {
    /// 省略時は現在時刻
    pub as_of: Option<DateTime<Utc>>,
}

/// タイトル登録リクエスト（POST /titles）
#[derive(Debug, Deserialize)]
pub struct RegisterTitleRequest {
    pub name: String,
    pub author: String,
    pub isbn: Option<String>,
    pub total_copies: u32,
}

impl RegisterTitleRequest {
    pub fn to_command(&self, registered_at: DateTime<Utc>) -> RegisterTitle {
        RegisterTitle {
            name: self.name.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
            total_copies: self.total_copies,
            registered_at,
        }
    }
}

/// 蔵書数の増減リクエスト（POST /titles/:id/copies）
#[derive(Debug, Deserialize)]
pub struct AdjustCopiesRequest {
    pub delta: i64,
}

/// 貸出レスポンス
///
/// ステータスと延滞料金は`as_of`時点で導出した値。
#[derive(Debug, Serialize)]
pub struct BorrowingResponse {
    pub borrowing_id: Uuid,
    pub title_id: Uuid,
    pub member_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: String,
    pub days_until_due: Option<i64>,
    pub days_overdue: i64,
    pub fine_amount: Decimal,
    pub notes: Option<String>,
}

impl BorrowingResponse {
    pub fn at(borrowing: &Borrowing, as_of: DateTime<Utc>, policy: &LendingPolicy) -> Self {
        Self {
            borrowing_id: borrowing.borrowing_id.value(),
            title_id: borrowing.title_id.value(),
            member_id: borrowing.member_id.value(),
            borrowed_at: borrowing.borrowed_at,
            due_at: borrowing.due_at,
            returned_at: borrowing.returned_at,
            status: borrowing.status_at(as_of).as_str().to_string(),
            days_until_due: borrowing.days_until_due(as_of),
            days_overdue: borrowing.days_overdue(as_of),
            fine_amount: borrowing.fine_at(as_of, policy),
            notes: borrowing.notes.clone(),
        }
    }
}

/// 延滞料金レスポンス
#[derive(Debug, Serialize)]
pub struct FineResponse {
    pub borrowing_id: Uuid,
    pub member_id: Uuid,
    pub amount: Decimal,
    pub overdue_days: i64,
    pub reason: String,
    pub computed_at: DateTime<Utc>,
    pub finalized: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Fine> for FineResponse {
    fn from(fine: Fine) -> Self {
        Self {
            borrowing_id: fine.borrowing_id.value(),
            member_id: fine.member_id.value(),
            amount: fine.amount,
            overdue_days: fine.overdue_days,
            reason: fine.reason,
            computed_at: fine.computed_at,
            finalized: fine.finalized,
            paid_at: fine.paid_at,
        }
    }
}

/// 返却レスポンス（POST /borrowings/:id/return）
#[derive(Debug, Serialize)]
pub struct BookReturnedResponse {
    pub borrowing: BorrowingResponse,
    /// 期限内の返却なら`null`
    pub fine: Option<FineResponse>,
}

/// タイトルレスポンス
#[derive(Debug, Serialize)]
pub struct TitleResponse {
    pub title_id: Uuid,
    pub name: String,
    pub author: String,
    pub isbn: Option<String>,
    pub total_copies: u32,
    pub available_copies: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Title> for TitleResponse {
    fn from(title: Title) -> Self {
        Self {
            title_id: title.title_id.value(),
            name: title.name,
            author: title.author,
            isbn: title.isbn,
            total_copies: title.total_copies,
            available_copies: title.available_copies,
            created_at: title.created_at,
            updated_at: title.updated_at,
        }
    }
}

/// エラーレスポンス
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
