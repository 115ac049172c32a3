use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BorrowingId, MemberId, TitleId};

/// コマンド：書籍を貸し出す
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub member_id: MemberId,
    pub title_id: TitleId,
    pub borrowed_at: DateTime<Utc>,
    /// 省略時はポリシーの貸出期間から算出
    pub due_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// コマンド：書籍を返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnBook {
    pub borrowing_id: BorrowingId,
    pub returned_at: DateTime<Utc>,
}

/// コマンド：タイトルをカタログに登録する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTitle {
    pub name: String,
    pub author: String,
    pub isbn: Option<String>,
    pub total_copies: u32,
    pub registered_at: DateTime<Utc>,
}

/// コマンド：蔵書数を増減する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustCopies {
    pub title_id: TitleId,
    pub delta: i64,
    pub adjusted_at: DateTime<Utc>,
}

/// コマンド：延滞料金を支払済みにする
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayFine {
    pub borrowing_id: BorrowingId,
    pub paid_at: DateTime<Utc>,
}
