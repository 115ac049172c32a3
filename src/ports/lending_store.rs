use crate::domain::{
    Borrowing, BorrowingId, DomainEvent, Fine, MemberAccount, MemberId, Title, TitleId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// ストアのエラー
#[derive(Debug, Error)]
pub enum StoreError {
    /// ロック待ちのタイムアウト、直列化失敗、接続不可など。再試行してよい。
    #[error("transient store failure")]
    Transient(#[source] BoxError),

    /// それ以外の障害
    #[error("store failure")]
    Backend(#[source] BoxError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// 貸出ストアポート
///
/// 行ロック付きのトランザクションを提供する永続化層を抽象化する。
/// 読み取り専用のクエリはロックを取らずに直接実行し、
/// 更新は必ず`begin`で開始したトランザクションの中で行う。
#[async_trait]
pub trait LendingStore: Send + Sync {
    /// トランザクションを開始する
    ///
    /// `commit`されずに破棄されたトランザクションの変更はすべて取り消される。
    async fn begin(&self) -> Result<Box<dyn LendingTransaction>>;

    async fn get_title(&self, title_id: TitleId) -> Result<Option<Title>>;

    async fn get_member(&self, member_id: MemberId) -> Result<Option<MemberAccount>>;

    async fn get_borrowing(&self, borrowing_id: BorrowingId) -> Result<Option<Borrowing>>;

    /// 未返却かつ`due_at < as_of`の貸出を返却期限の昇順で返す
    async fn find_open_borrowings_due_before(&self, as_of: DateTime<Utc>)
    -> Result<Vec<Borrowing>>;

    /// 会員の全貸出を貸出日時の降順で返す
    async fn find_borrowings_by_member(&self, member_id: MemberId) -> Result<Vec<Borrowing>>;

    /// タイトルの全貸出を貸出日時の降順で返す
    async fn find_borrowings_by_title(&self, title_id: TitleId) -> Result<Vec<Borrowing>>;

    async fn get_fine(&self, borrowing_id: BorrowingId) -> Result<Option<Fine>>;

    /// 確定済みかつ未払いの延滞料金を新しい順で返す
    async fn find_unpaid_fines(&self) -> Result<Vec<Fine>>;

    /// 集約（貸出またはタイトル）の履歴イベントを記録順で返す
    async fn find_events(&self, aggregate_id: Uuid) -> Result<Vec<DomainEvent>>;
}

/// 貸出ストアのトランザクション
///
/// `lock_*`は該当行を排他ロックし、トランザクション終了まで保持する。
/// デッドロックを避けるため、ロックは 会員 → タイトル → 貸出 → 延滞料金
/// の順に取得すること。
#[async_trait]
pub trait LendingTransaction: Send {
    async fn lock_member(&mut self, member_id: MemberId) -> Result<Option<MemberAccount>>;

    /// 貸出中の冊数のみを書き戻す（会員の状態は会員管理コンテキストが持つ）
    async fn save_member(&mut self, member: &MemberAccount) -> Result<()>;

    async fn lock_title(&mut self, title_id: TitleId) -> Result<Option<Title>>;

    async fn insert_title(&mut self, title: &Title) -> Result<()>;

    async fn save_title(&mut self, title: &Title) -> Result<()>;

    async fn lock_borrowing(&mut self, borrowing_id: BorrowingId) -> Result<Option<Borrowing>>;

    /// 会員が同じタイトルを未返却で借りているか
    async fn has_open_borrowing(&mut self, member_id: MemberId, title_id: TitleId)
    -> Result<bool>;

    async fn insert_borrowing(&mut self, borrowing: &Borrowing) -> Result<()>;

    async fn save_borrowing(&mut self, borrowing: &Borrowing) -> Result<()>;

    async fn lock_fine(&mut self, borrowing_id: BorrowingId) -> Result<Option<Fine>>;

    /// 延滞料金のスナップショットを保存（upsert）
    async fn save_fine(&mut self, fine: &Fine) -> Result<()>;

    /// ドメインイベントを履歴に追記する
    async fn append_events(&mut self, events: Vec<DomainEvent>) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
