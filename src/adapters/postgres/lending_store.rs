use crate::domain::{
    Borrowing, BorrowingId, DomainEvent, Fine, MemberAccount, MemberId, MembershipStatus, Title,
    TitleId,
};
use crate::ports::lending_store::{
    BoxError, LendingStore as LendingStoreTrait, LendingTransaction, Result, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use std::str::FromStr;
use uuid::Uuid;

/// SQLSTATEs that mean "try again": serialization failure, deadlock, lock timeout
const TRANSIENT_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Map a sqlx error onto the store taxonomy
fn classify(err: sqlx::Error) -> StoreError {
    let transient = match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .as_deref()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code)),
        _ => false,
    };

    if transient {
        StoreError::Transient(Box::new(err))
    } else {
        StoreError::Backend(Box::new(err))
    }
}

fn invalid_data(message: String) -> StoreError {
    StoreError::Backend(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

fn to_count(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| invalid_data(format!("{} out of range: {}", column, value)))
}

fn to_db_count(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| invalid_data(format!("{} out of range: {}", column, value)))
}

fn map_row_to_title(row: &PgRow) -> Result<Title> {
    Ok(Title {
        title_id: TitleId::from_uuid(row.try_get("title_id").map_err(classify)?),
        name: row.try_get("name").map_err(classify)?,
        author: row.try_get("author").map_err(classify)?,
        isbn: row.try_get("isbn").map_err(classify)?,
        total_copies: to_count(row.try_get("total_copies").map_err(classify)?, "total_copies")?,
        available_copies: to_count(
            row.try_get("available_copies").map_err(classify)?,
            "available_copies",
        )?,
        created_at: row.try_get("created_at").map_err(classify)?,
        updated_at: row.try_get("updated_at").map_err(classify)?,
    })
}

fn map_row_to_member(row: &PgRow) -> Result<MemberAccount> {
    let status: String = row.try_get("status").map_err(classify)?;
    let status = MembershipStatus::from_str(&status).map_err(invalid_data)?;

    Ok(MemberAccount {
        member_id: MemberId::from_uuid(row.try_get("member_id").map_err(classify)?),
        status,
        active_borrowings: to_count(
            row.try_get("active_borrowings").map_err(classify)?,
            "active_borrowings",
        )?,
    })
}

fn map_row_to_borrowing(row: &PgRow) -> Result<Borrowing> {
    Ok(Borrowing {
        borrowing_id: BorrowingId::from_uuid(row.try_get("borrowing_id").map_err(classify)?),
        title_id: TitleId::from_uuid(row.try_get("title_id").map_err(classify)?),
        member_id: MemberId::from_uuid(row.try_get("member_id").map_err(classify)?),
        borrowed_at: row.try_get("borrowed_at").map_err(classify)?,
        due_at: row.try_get("due_at").map_err(classify)?,
        returned_at: row.try_get("returned_at").map_err(classify)?,
        notes: row.try_get("notes").map_err(classify)?,
        updated_at: row.try_get("updated_at").map_err(classify)?,
    })
}

fn map_row_to_fine(row: &PgRow) -> Result<Fine> {
    Ok(Fine {
        borrowing_id: BorrowingId::from_uuid(row.try_get("borrowing_id").map_err(classify)?),
        member_id: MemberId::from_uuid(row.try_get("member_id").map_err(classify)?),
        amount: row.try_get("amount").map_err(classify)?,
        overdue_days: row.try_get("overdue_days").map_err(classify)?,
        reason: row.try_get("reason").map_err(classify)?,
        computed_at: row.try_get("computed_at").map_err(classify)?,
        finalized: row.try_get("finalized").map_err(classify)?,
        paid_at: row.try_get("paid_at").map_err(classify)?,
    })
}

const TITLE_COLUMNS: &str =
    "title_id, name, author, isbn, total_copies, available_copies, created_at, updated_at";
const BORROWING_COLUMNS: &str =
    "borrowing_id, title_id, member_id, borrowed_at, due_at, returned_at, notes, updated_at";
const FINE_COLUMNS: &str =
    "borrowing_id, member_id, amount, overdue_days, reason, computed_at, finalized, paid_at";

/// PostgreSQL implementation of LendingStore
///
/// Mutations run inside a database transaction and take row locks with
/// `SELECT ... FOR UPDATE`. Each transaction sets a `lock_timeout` so that a
/// stuck lock surfaces as a transient error instead of blocking forever.
#[derive(Debug, Clone)]
pub struct LendingStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl LendingStore {
    /// Create a new LendingStore with a PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout_ms(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }
}

#[async_trait]
impl LendingStoreTrait for LendingStore {
    async fn begin(&self) -> Result<Box<dyn LendingTransaction>> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // SET LOCAL does not accept bind parameters
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        Ok(Box::new(Transaction { tx }))
    }

    async fn get_title(&self, title_id: TitleId) -> Result<Option<Title>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM titles WHERE title_id = $1",
            TITLE_COLUMNS
        ))
        .bind(title_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.as_ref().map(map_row_to_title).transpose()
    }

    async fn get_member(&self, member_id: MemberId) -> Result<Option<MemberAccount>> {
        let row = sqlx::query(
            "SELECT member_id, status, active_borrowings FROM members WHERE member_id = $1",
        )
        .bind(member_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.as_ref().map(map_row_to_member).transpose()
    }

    async fn get_borrowing(&self, borrowing_id: BorrowingId) -> Result<Option<Borrowing>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM borrowings WHERE borrowing_id = $1",
            BORROWING_COLUMNS
        ))
        .bind(borrowing_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.as_ref().map(map_row_to_borrowing).transpose()
    }

    async fn find_open_borrowings_due_before(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Borrowing>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM borrowings
            WHERE returned_at IS NULL AND due_at < $1
            ORDER BY due_at ASC
            "#,
            BORROWING_COLUMNS
        ))
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(map_row_to_borrowing).collect()
    }

    async fn find_borrowings_by_member(&self, member_id: MemberId) -> Result<Vec<Borrowing>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM borrowings WHERE member_id = $1 ORDER BY borrowed_at DESC",
            BORROWING_COLUMNS
        ))
        .bind(member_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(map_row_to_borrowing).collect()
    }

    async fn find_borrowings_by_title(&self, title_id: TitleId) -> Result<Vec<Borrowing>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM borrowings WHERE title_id = $1 ORDER BY borrowed_at DESC",
            BORROWING_COLUMNS
        ))
        .bind(title_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(map_row_to_borrowing).collect()
    }

    async fn get_fine(&self, borrowing_id: BorrowingId) -> Result<Option<Fine>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM fines WHERE borrowing_id = $1",
            FINE_COLUMNS
        ))
        .bind(borrowing_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.as_ref().map(map_row_to_fine).transpose()
    }

    async fn find_unpaid_fines(&self) -> Result<Vec<Fine>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM fines
            WHERE finalized AND paid_at IS NULL
            ORDER BY computed_at DESC
            "#,
            FINE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(map_row_to_fine).collect()
    }

    async fn find_events(&self, aggregate_id: Uuid) -> Result<Vec<DomainEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_data
            FROM lending_events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event_data: serde_json::Value = row.try_get("event_data").map_err(classify)?;
            let event: DomainEvent = serde_json::from_value(event_data)
                .map_err(|e| StoreError::Backend(Box::new(e) as BoxError))?;
            events.push(event);
        }

        Ok(events)
    }
}

/// Database transaction holding the row locks taken so far
///
/// Dropping it without `commit` rolls back (sqlx issues ROLLBACK on drop).
pub struct Transaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl LendingTransaction for Transaction {
    async fn lock_member(&mut self, member_id: MemberId) -> Result<Option<MemberAccount>> {
        let row = sqlx::query(
            r#"
            SELECT member_id, status, active_borrowings
            FROM members
            WHERE member_id = $1
            FOR UPDATE
            "#,
        )
        .bind(member_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;

        row.as_ref().map(map_row_to_member).transpose()
    }

    /// Write back the active borrowing count only; status belongs to member management
    async fn save_member(&mut self, member: &MemberAccount) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE members
            SET active_borrowings = $2
            WHERE member_id = $1
            "#,
        )
        .bind(member.member_id.value())
        .bind(to_db_count(member.active_borrowings, "active_borrowings")?)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn lock_title(&mut self, title_id: TitleId) -> Result<Option<Title>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM titles WHERE title_id = $1 FOR UPDATE",
            TITLE_COLUMNS
        ))
        .bind(title_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;

        row.as_ref().map(map_row_to_title).transpose()
    }

    async fn insert_title(&mut self, title: &Title) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO titles (
                title_id,
                name,
                author,
                isbn,
                total_copies,
                available_copies,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(title.title_id.value())
        .bind(&title.name)
        .bind(&title.author)
        .bind(&title.isbn)
        .bind(to_db_count(title.total_copies, "total_copies")?)
        .bind(to_db_count(title.available_copies, "available_copies")?)
        .bind(title.created_at)
        .bind(title.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn save_title(&mut self, title: &Title) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE titles
            SET total_copies = $2, available_copies = $3, updated_at = $4
            WHERE title_id = $1
            "#,
        )
        .bind(title.title_id.value())
        .bind(to_db_count(title.total_copies, "total_copies")?)
        .bind(to_db_count(title.available_copies, "available_copies")?)
        .bind(title.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn lock_borrowing(&mut self, borrowing_id: BorrowingId) -> Result<Option<Borrowing>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM borrowings WHERE borrowing_id = $1 FOR UPDATE",
            BORROWING_COLUMNS
        ))
        .bind(borrowing_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;

        row.as_ref().map(map_row_to_borrowing).transpose()
    }

    async fn has_open_borrowing(
        &mut self,
        member_id: MemberId,
        title_id: TitleId,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM borrowings
                WHERE member_id = $1 AND title_id = $2 AND returned_at IS NULL
            )
            "#,
        )
        .bind(member_id.value())
        .bind(title_id.value())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(exists)
    }

    async fn insert_borrowing(&mut self, borrowing: &Borrowing) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO borrowings (
                borrowing_id,
                title_id,
                member_id,
                borrowed_at,
                due_at,
                returned_at,
                notes,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(borrowing.borrowing_id.value())
        .bind(borrowing.title_id.value())
        .bind(borrowing.member_id.value())
        .bind(borrowing.borrowed_at)
        .bind(borrowing.due_at)
        .bind(borrowing.returned_at)
        .bind(&borrowing.notes)
        .bind(borrowing.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn save_borrowing(&mut self, borrowing: &Borrowing) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE borrowings
            SET returned_at = $2, notes = $3, updated_at = $4
            WHERE borrowing_id = $1
            "#,
        )
        .bind(borrowing.borrowing_id.value())
        .bind(borrowing.returned_at)
        .bind(&borrowing.notes)
        .bind(borrowing.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn lock_fine(&mut self, borrowing_id: BorrowingId) -> Result<Option<Fine>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM fines WHERE borrowing_id = $1 FOR UPDATE",
            FINE_COLUMNS
        ))
        .bind(borrowing_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;

        row.as_ref().map(map_row_to_fine).transpose()
    }

    async fn save_fine(&mut self, fine: &Fine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fines (
                borrowing_id,
                member_id,
                amount,
                overdue_days,
                reason,
                computed_at,
                finalized,
                paid_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (borrowing_id) DO UPDATE SET
                amount = EXCLUDED.amount,
                overdue_days = EXCLUDED.overdue_days,
                reason = EXCLUDED.reason,
                computed_at = EXCLUDED.computed_at,
                finalized = EXCLUDED.finalized,
                paid_at = EXCLUDED.paid_at
            "#,
        )
        .bind(fine.borrowing_id.value())
        .bind(fine.member_id.value())
        .bind(fine.amount)
        .bind(fine.overdue_days)
        .bind(&fine.reason)
        .bind(fine.computed_at)
        .bind(fine.finalized)
        .bind(fine.paid_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    /// Append events with a single batch INSERT using UNNEST
    async fn append_events(&mut self, events: Vec<DomainEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut aggregate_ids = Vec::with_capacity(events.len());
        let mut aggregate_types = Vec::with_capacity(events.len());
        let mut event_types = Vec::with_capacity(events.len());
        let mut event_data_list = Vec::with_capacity(events.len());
        let mut occurred_at_list = Vec::with_capacity(events.len());

        for event in &events {
            aggregate_ids.push(event.aggregate_id());
            aggregate_types.push(event.aggregate_type());
            event_types.push(event.event_type());
            event_data_list.push(
                serde_json::to_value(event).map_err(|e| StoreError::Backend(Box::new(e)))?,
            );
            occurred_at_list.push(event.occurred_at());
        }

        sqlx::query(
            r#"
            INSERT INTO lending_events (
                aggregate_id,
                aggregate_type,
                event_type,
                event_data,
                occurred_at
            )
            SELECT * FROM UNNEST($1::uuid[], $2::varchar[], $3::varchar[], $4::jsonb[], $5::timestamptz[])
            "#,
        )
        .bind(&aggregate_ids)
        .bind(&aggregate_types)
        .bind(&event_types)
        .bind(&event_data_list)
        .bind(&occurred_at_list)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(classify)
    }
}
