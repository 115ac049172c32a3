use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BorrowingId, MemberId, TitleId};

/// イベント：書籍が貸し出された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookBorrowed {
    pub borrowing_id: BorrowingId,
    pub title_id: TitleId,
    pub member_id: MemberId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// イベント：書籍が返却された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookReturned {
    pub borrowing_id: BorrowingId,
    pub title_id: TitleId,
    pub member_id: MemberId,
    pub returned_at: DateTime<Utc>,
    pub was_overdue: bool,
}

/// イベント：延滞料金が確定した
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineAssessed {
    pub borrowing_id: BorrowingId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub overdue_days: i64,
    pub assessed_at: DateTime<Utc>,
}

/// イベント：延滞料金が支払われた
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinePaid {
    pub borrowing_id: BorrowingId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

/// イベント：蔵書数が増減した
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiesAdjusted {
    pub title_id: TitleId,
    pub delta: i64,
    pub total_copies: u32,
    pub available_copies: u32,
    pub adjusted_at: DateTime<Utc>,
}

/// ドメインイベント統合型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    BookBorrowed(BookBorrowed),
    BookReturned(BookReturned),
    FineAssessed(FineAssessed),
    FinePaid(FinePaid),
    CopiesAdjusted(CopiesAdjusted),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::BookBorrowed(_) => "BookBorrowed",
            DomainEvent::BookReturned(_) => "BookReturned",
            DomainEvent::FineAssessed(_) => "FineAssessed",
            DomainEvent::FinePaid(_) => "FinePaid",
            DomainEvent::CopiesAdjusted(_) => "CopiesAdjusted",
        }
    }

    /// イベントが属する集約のID（貸出またはタイトル）
    pub fn aggregate_id(&self) -> uuid::Uuid {
        match self {
            DomainEvent::BookBorrowed(e) => e.borrowing_id.value(),
            DomainEvent::BookReturned(e) => e.borrowing_id.value(),
            DomainEvent::FineAssessed(e) => e.borrowing_id.value(),
            DomainEvent::FinePaid(e) => e.borrowing_id.value(),
            DomainEvent::CopiesAdjusted(e) => e.title_id.value(),
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        match self {
            DomainEvent::CopiesAdjusted(_) => "Title",
            _ => "Borrowing",
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::BookBorrowed(e) => e.borrowed_at,
            DomainEvent::BookReturned(e) => e.returned_at,
            DomainEvent::FineAssessed(e) => e.assessed_at,
            DomainEvent::FinePaid(e) => e.paid_at,
            DomainEvent::CopiesAdjusted(e) => e.adjusted_at,
        }
    }
}
