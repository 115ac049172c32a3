use crate::domain::{Actor, BorrowingId, MemberId, TitleId};
use async_trait::async_trait;
use thiserror::Error;

/// 権限判定の対象となる操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Checkout,
    /// 返却期限を貸出規定以外の日付に指定する
    SetDueDate,
    ReturnBook,
    ViewBorrowing,
    ListOverdue,
    ViewCatalog,
    ManageCatalog,
    ViewFines,
    CollectFine,
}

/// 権限判定の対象となるリソース
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// 会員（およびその会員の貸出全体）
    Member(MemberId),
    Title(TitleId),
    Borrowing {
        borrowing_id: BorrowingId,
        member_id: MemberId,
    },
    /// 図書館全体（延滞一覧、未払い一覧など）
    Library,
}

#[derive(Debug, Error)]
#[error("capability check failed")]
pub struct CapabilityError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

/// 権限判定ポート（RBAC）
///
/// ロールや権限の保存方法はこのコンテキストの外側にある。
/// `false`の場合、呼び出し側はロックを取る前に`Forbidden`で打ち切る。
#[async_trait]
pub trait CapabilityCheck: Send + Sync {
    async fn can(
        &self,
        actor: &Actor,
        action: Action,
        resource: &Resource,
    ) -> Result<bool, CapabilityError>;
}
