use crate::domain::{
    Borrowing, BorrowingId, DomainEvent, Fine, MemberAccount, MemberId, Title, TitleId,
};
use crate::ports::lending_store::{
    LendingStore as LendingStoreTrait, LendingTransaction, Result, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use uuid::Uuid;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Member(MemberId),
    Title(TitleId),
    Borrowing(BorrowingId),
    Fine(BorrowingId),
}

#[derive(Debug, Default)]
struct Tables {
    titles: HashMap<TitleId, Title>,
    members: HashMap<MemberId, MemberAccount>,
    borrowings: HashMap<BorrowingId, Borrowing>,
    fines: HashMap<BorrowingId, Fine>,
    events: Vec<DomainEvent>,
}

/// 行ごとの非同期ミューテックス
///
/// 別のタイトルのロックは互いに待たない。
/// 誰も保持・待機していない行のエントリは解放時に取り除く。
#[derive(Debug, Default)]
struct RowLocks {
    rows: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
}

impl RowLocks {
    fn handle(&self, key: RowKey) -> Result<Arc<RowMutex<()>>> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows.entry(key).or_default().clone())
    }

    /// ガードを落とした後に呼ぶ
    fn release(&self, keys: impl IntoIterator<Item = RowKey>) {
        let mut rows = match self.rows.lock() {
            Ok(rows) => rows,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in keys {
            if rows.get(&key).is_some_and(|row| Arc::strong_count(row) == 1) {
                rows.remove(&key);
            }
        }
    }

    async fn acquire(&self, key: RowKey, timeout: Duration) -> Result<OwnedMutexGuard<()>> {
        let row = self.handle(key)?;
        match tokio::time::timeout(timeout, row.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                self.release([key]);
                Err(StoreError::Transient(
                    format!("lock wait timeout on {:?}", key).into(),
                ))
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Backend("in-memory store mutex poisoned".into())
}

#[derive(Debug, Default)]
struct Faults {
    fail_borrowing_writes: AtomicBool,
}

/// LendingStoreのインメモリ実装
///
/// 行ロック付きのトランザクションストアを模倣する：
/// - `lock_*`は行ごとのミューテックスを取り、コミットまたは破棄まで保持する
/// - 書き込みはトランザクション内に溜め、コミット時にまとめて反映する
/// - コミットせずに破棄したトランザクションの書き込みは捨てられる
///
/// ロック待ちには上限があり、超えると`StoreError::Transient`になる。
#[derive(Debug, Clone)]
pub struct LendingStore {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<RowLocks>,
    faults: Arc<Faults>,
    lock_timeout: Duration,
}

impl LendingStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            locks: Arc::new(RowLocks::default()),
            faults: Arc::new(Faults::default()),
            lock_timeout,
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(poisoned)
    }

    /// 会員を登録する（会員管理コンテキストの代わり）
    ///
    /// 行ロックを保持中のトランザクションがあれば待たずに`Transient`。
    pub fn add_member(&self, member: MemberAccount) -> Result<()> {
        let key = RowKey::Member(member.member_id);
        let row = self.locks.handle(key)?;
        let result = match row.clone().try_lock_owned() {
            Ok(guard) => {
                let inserted = self.tables().map(|mut tables| {
                    tables.members.insert(member.member_id, member);
                });
                drop(guard);
                inserted
            }
            Err(_) => Err(StoreError::Transient(
                format!("member {} is locked", member.member_id).into(),
            )),
        };
        drop(row);
        self.locks.release([key]);
        result
    }

    /// タイトル行をそのまま置く（カタログの初期データ、破損状態のテスト用）
    pub fn put_title(&self, title: Title) -> Result<()> {
        self.tables()?.titles.insert(title.title_id, title);
        Ok(())
    }

    /// 会員の状態を変更する（会員管理コンテキストの代わり）
    ///
    /// 貸出処理と同じ行ロックを取るので、処理中の貸出のコミットを待つ。
    pub async fn set_member_status(
        &self,
        member_id: MemberId,
        status: crate::domain::MembershipStatus,
    ) -> Result<()> {
        let key = RowKey::Member(member_id);
        let guard = self.locks.acquire(key, self.lock_timeout).await?;
        let result = self.tables().map(|mut tables| {
            if let Some(member) = tables.members.get_mut(&member_id) {
                member.status = status;
            }
        });
        drop(guard);
        self.locks.release([key]);
        result
    }

    /// 以降の貸出の書き込みをすべて失敗させる（ロールバックのテスト用）
    pub fn fail_borrowing_writes(&self, fail: bool) {
        self.faults
            .fail_borrowing_writes
            .store(fail, Ordering::SeqCst);
    }
}

impl Default for LendingStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(mut borrowings: Vec<Borrowing>) -> Vec<Borrowing> {
    borrowings.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at));
    borrowings
}

#[async_trait]
impl LendingStoreTrait for LendingStore {
    async fn begin(&self) -> Result<Box<dyn LendingTransaction>> {
        Ok(Box::new(Transaction {
            store: self.clone(),
            guards: HashMap::new(),
            staged: Staged::default(),
        }))
    }

    async fn get_title(&self, title_id: TitleId) -> Result<Option<Title>> {
        Ok(self.tables()?.titles.get(&title_id).cloned())
    }

    async fn get_member(&self, member_id: MemberId) -> Result<Option<MemberAccount>> {
        Ok(self.tables()?.members.get(&member_id).cloned())
    }

    async fn get_borrowing(&self, borrowing_id: BorrowingId) -> Result<Option<Borrowing>> {
        Ok(self.tables()?.borrowings.get(&borrowing_id).cloned())
    }

    async fn find_open_borrowings_due_before(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Borrowing>> {
        let mut overdue: Vec<Borrowing> = self
            .tables()?
            .borrowings
            .values()
            .filter(|b| b.returned_at.is_none() && b.due_at < as_of)
            .cloned()
            .collect();
        overdue.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        Ok(overdue)
    }

    async fn find_borrowings_by_member(&self, member_id: MemberId) -> Result<Vec<Borrowing>> {
        let borrowings = self
            .tables()?
            .borrowings
            .values()
            .filter(|b| b.member_id == member_id)
            .cloned()
            .collect();
        Ok(newest_first(borrowings))
    }

    async fn find_borrowings_by_title(&self, title_id: TitleId) -> Result<Vec<Borrowing>> {
        let borrowings = self
            .tables()?
            .borrowings
            .values()
            .filter(|b| b.title_id == title_id)
            .cloned()
            .collect();
        Ok(newest_first(borrowings))
    }

    async fn get_fine(&self, borrowing_id: BorrowingId) -> Result<Option<Fine>> {
        Ok(self.tables()?.fines.get(&borrowing_id).cloned())
    }

    async fn find_unpaid_fines(&self) -> Result<Vec<Fine>> {
        let mut fines: Vec<Fine> = self
            .tables()?
            .fines
            .values()
            .filter(|f| f.finalized && !f.is_paid())
            .cloned()
            .collect();
        fines.sort_by(|a, b| b.computed_at.cmp(&a.computed_at));
        Ok(fines)
    }

    async fn find_events(&self, aggregate_id: Uuid) -> Result<Vec<DomainEvent>> {
        Ok(self
            .tables()?
            .events
            .iter()
            .filter(|e| e.aggregate_id() == aggregate_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct Staged {
    titles: HashMap<TitleId, Title>,
    members: HashMap<MemberId, MemberAccount>,
    borrowings: HashMap<BorrowingId, Borrowing>,
    fines: HashMap<BorrowingId, Fine>,
    events: Vec<DomainEvent>,
}

/// インメモリストアのトランザクション
///
/// 行ロックはコミットまたは破棄の時点で解放される。
pub struct Transaction {
    store: LendingStore,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged: Staged,
}

impl Transaction {
    async fn lock(&mut self, key: RowKey) -> Result<()> {
        if self.guards.contains_key(&key) {
            return Ok(());
        }
        let guard = self.store.locks.acquire(key, self.store.lock_timeout).await?;
        self.guards.insert(key, guard);
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let keys: Vec<RowKey> = self.guards.keys().copied().collect();
        self.guards.clear();
        self.store.locks.release(keys);
    }
}

#[async_trait]
impl LendingTransaction for Transaction {
    async fn lock_member(&mut self, member_id: MemberId) -> Result<Option<MemberAccount>> {
        self.lock(RowKey::Member(member_id)).await?;
        if let Some(member) = self.staged.members.get(&member_id) {
            return Ok(Some(member.clone()));
        }
        Ok(self.store.tables()?.members.get(&member_id).cloned())
    }

    async fn save_member(&mut self, member: &MemberAccount) -> Result<()> {
        self.staged
            .members
            .insert(member.member_id, member.clone());
        Ok(())
    }

    async fn lock_title(&mut self, title_id: TitleId) -> Result<Option<Title>> {
        self.lock(RowKey::Title(title_id)).await?;
        if let Some(title) = self.staged.titles.get(&title_id) {
            return Ok(Some(title.clone()));
        }
        Ok(self.store.tables()?.titles.get(&title_id).cloned())
    }

    async fn insert_title(&mut self, title: &Title) -> Result<()> {
        if self.store.tables()?.titles.contains_key(&title.title_id) {
            return Err(StoreError::Backend(
                format!("title {} already exists", title.title_id).into(),
            ));
        }
        self.staged.titles.insert(title.title_id, title.clone());
        Ok(())
    }

    async fn save_title(&mut self, title: &Title) -> Result<()> {
        self.staged.titles.insert(title.title_id, title.clone());
        Ok(())
    }

    async fn lock_borrowing(&mut self, borrowing_id: BorrowingId) -> Result<Option<Borrowing>> {
        self.lock(RowKey::Borrowing(borrowing_id)).await?;
        if let Some(borrowing) = self.staged.borrowings.get(&borrowing_id) {
            return Ok(Some(borrowing.clone()));
        }
        Ok(self.store.tables()?.borrowings.get(&borrowing_id).cloned())
    }

    async fn has_open_borrowing(
        &mut self,
        member_id: MemberId,
        title_id: TitleId,
    ) -> Result<bool> {
        let is_open_match =
            |b: &Borrowing| b.member_id == member_id && b.title_id == title_id && b.returned_at.is_none();

        if self.staged.borrowings.values().any(is_open_match) {
            return Ok(true);
        }
        let tables = self.store.tables()?;
        Ok(tables
            .borrowings
            .values()
            .filter(|b| !self.staged.borrowings.contains_key(&b.borrowing_id))
            .any(is_open_match))
    }

    async fn insert_borrowing(&mut self, borrowing: &Borrowing) -> Result<()> {
        if self.store.faults.fail_borrowing_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected borrowing write failure".into()));
        }
        self.staged
            .borrowings
            .insert(borrowing.borrowing_id, borrowing.clone());
        Ok(())
    }

    async fn save_borrowing(&mut self, borrowing: &Borrowing) -> Result<()> {
        if self.store.faults.fail_borrowing_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected borrowing write failure".into()));
        }
        self.staged
            .borrowings
            .insert(borrowing.borrowing_id, borrowing.clone());
        Ok(())
    }

    async fn lock_fine(&mut self, borrowing_id: BorrowingId) -> Result<Option<Fine>> {
        self.lock(RowKey::Fine(borrowing_id)).await?;
        if let Some(fine) = self.staged.fines.get(&borrowing_id) {
            return Ok(Some(fine.clone()));
        }
        Ok(self.store.tables()?.fines.get(&borrowing_id).cloned())
    }

    async fn save_fine(&mut self, fine: &Fine) -> Result<()> {
        self.staged.fines.insert(fine.borrowing_id, fine.clone());
        Ok(())
    }

    async fn append_events(&mut self, events: Vec<DomainEvent>) -> Result<()> {
        self.staged.events.extend(events);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let mut tables = self.store.tables()?;
        tables.titles.extend(staged.titles);
        // 会員の状態は会員管理の持ち物なので、貸出冊数だけを書き戻す
        for (member_id, staged_member) in staged.members {
            if let Some(member) = tables.members.get_mut(&member_id) {
                member.active_borrowings = staged_member.active_borrowings;
            }
        }
        tables.borrowings.extend(staged.borrowings);
        tables.fines.extend(staged.fines);
        tables.events.extend(staged.events);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
