use crate::domain::{
    self, Actor, Borrowing, BorrowingId, DomainEvent, Fine, MemberId, TitleId, commands::*,
};
use crate::ports::{Action, CapabilityCheck, LendingStore, PolicySource, Resource};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::errors::{LendingError, Result};

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、純粋な関数に依存関係を渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub store: Arc<dyn LendingStore>,
    pub capabilities: Arc<dyn CapabilityCheck>,
    pub policy: Arc<dyn PolicySource>,
}

/// 権限を確認する
///
/// トランザクション開始前に呼ぶこと（外部呼び出し中にロックを保持しない）。
pub async fn authorize(
    deps: &ServiceDependencies,
    actor: &Actor,
    action: Action,
    resource: Resource,
) -> Result<()> {
    if deps.capabilities.can(actor, action, &resource).await? {
        Ok(())
    } else {
        tracing::debug!(actor = %actor.id, role = actor.role.as_str(), ?action, "capability denied");
        Err(LendingError::Forbidden)
    }
}

/// 書籍を貸し出す
///
/// ビジネスルール：
/// - 会員がActiveで、貸出中の冊数が上限未満であること
/// - 同じタイトルを返却前に重ねて借りないこと
/// - 貸出可能な本が残っていること
/// - 返却期限を明示できるのは`SetDueDate`を持つ職員のみ
///
/// 在庫・貸出・会員の冊数は1つのトランザクションで更新される。
/// 途中で失敗した場合、トランザクションは破棄され何も変わらない。
///
/// ロック順序：会員 → タイトル
pub async fn checkout(deps: &ServiceDependencies, actor: &Actor, cmd: Checkout) -> Result<Borrowing> {
    // 1. 権限確認（ロック前）
    authorize(deps, actor, Action::Checkout, Resource::Member(cmd.member_id)).await?;
    if cmd.due_at.is_some() {
        authorize(deps, actor, Action::SetDueDate, Resource::Member(cmd.member_id)).await?;
    }

    let policy = deps.policy.current();
    let mut tx = deps.store.begin().await?;

    // 2. 会員をロックして貸出可否を確認
    let member = tx
        .lock_member(cmd.member_id)
        .await?
        .ok_or(LendingError::MemberNotFound)?;
    domain::borrowing::check_eligibility(&member, &policy)?;

    // 3. タイトルをロック
    let title = tx
        .lock_title(cmd.title_id)
        .await?
        .ok_or(LendingError::TitleNotFound)?;

    if tx.has_open_borrowing(cmd.member_id, cmd.title_id).await? {
        return Err(LendingError::AlreadyBorrowed);
    }

    // 4. ドメイン層の純粋関数を呼び出し
    let (reserved_title, token) = domain::inventory::reserve(&title, cmd.borrowed_at)?;
    let (borrowing, event) = domain::borrowing::open_borrowing(
        token,
        &member,
        cmd.borrowed_at,
        cmd.due_at,
        cmd.notes,
        &policy,
    )?;

    // 5. 変更をまとめて書き込み、コミット
    tx.save_title(&reserved_title).await?;
    tx.insert_borrowing(&borrowing).await?;
    tx.save_member(&member.with_borrowing_opened()).await?;
    tx.append_events(vec![DomainEvent::BookBorrowed(event)])
        .await?;
    tx.commit().await?;

    tracing::info!(
        borrowing_id = %borrowing.borrowing_id,
        member_id = %borrowing.member_id,
        title_id = %borrowing.title_id,
        due_at = %borrowing.due_at,
        available_copies = reserved_title.available_copies,
        "book checked out"
    );

    Ok(borrowing)
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - ActiveでもOverdueでも返却を受け付ける
/// - 返却済みの貸出は`AlreadyReturned`（在庫の二重加算を防ぐ）
/// - 延滞していれば確定した延滞料金を同じトランザクションで保存する
///
/// 延滞がなければ延滞料金は`None`。
///
/// ロック順序：会員 → タイトル → 貸出 → 延滞料金。
/// ロック前に貸出を読むのは会員とタイトルを知るためで、
/// 返却済みかどうかの判定はロック下でやり直す。
pub async fn return_book(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: ReturnBook,
) -> Result<(Borrowing, Option<Fine>)> {
    // 1. 対象の貸出を確認（ロックなし）
    let existing = deps
        .store
        .get_borrowing(cmd.borrowing_id)
        .await?
        .ok_or(LendingError::BorrowingNotFound)?;

    // 2. 権限確認（ロック前）
    authorize(
        deps,
        actor,
        Action::ReturnBook,
        Resource::Borrowing {
            borrowing_id: existing.borrowing_id,
            member_id: existing.member_id,
        },
    )
    .await?;

    let policy = deps.policy.current();
    let mut tx = deps.store.begin().await?;

    // 3. ロック順序どおりに取得
    let member = tx
        .lock_member(existing.member_id)
        .await?
        .ok_or(LendingError::MemberNotFound)?;
    let title = tx
        .lock_title(existing.title_id)
        .await?
        .ok_or(LendingError::TitleNotFound)?;
    let borrowing = tx
        .lock_borrowing(cmd.borrowing_id)
        .await?
        .ok_or(LendingError::BorrowingNotFound)?;

    // 4. ドメイン層の純粋関数を呼び出し（ロック下で再判定）
    let (returned, event) = domain::borrowing::return_borrowing(&borrowing, cmd.returned_at)?;
    let released_title = domain::inventory::release(&title, cmd.returned_at)?;
    let member_after = member.with_borrowing_closed().ok_or_else(|| {
        LendingError::invariant_violation(format!(
            "member {} has no active borrowings to close",
            member.member_id
        ))
    })?;

    let fine = domain::fine::assess_fine(
        returned.borrowing_id,
        returned.member_id,
        returned.due_at,
        cmd.returned_at,
        true,
        &policy,
    );

    // 5. 変更をまとめて書き込み、コミット
    let mut events = vec![DomainEvent::BookReturned(event)];
    tx.save_borrowing(&returned).await?;
    tx.save_title(&released_title).await?;
    tx.save_member(&member_after).await?;
    if let Some(fine) = &fine {
        // 暫定スナップショットがあれば確定値で置き換える
        tx.lock_fine(fine.borrowing_id).await?;
        tx.save_fine(fine).await?;
        events.push(DomainEvent::FineAssessed(fine.into()));
    }
    tx.append_events(events).await?;
    tx.commit().await?;

    tracing::info!(
        borrowing_id = %returned.borrowing_id,
        member_id = %returned.member_id,
        title_id = %returned.title_id,
        available_copies = released_title.available_copies,
        "book returned"
    );
    if let Some(fine) = &fine {
        tracing::warn!(
            borrowing_id = %fine.borrowing_id,
            member_id = %fine.member_id,
            amount = %fine.amount,
            overdue_days = fine.overdue_days,
            "fine assessed on late return"
        );
    }

    Ok((returned, fine))
}

/// 延滞中の貸出一覧（読み取り専用）
///
/// 未返却かつ`as_of > due_at`の貸出を返却期限の古い順に返す。
/// 権限確認は呼び出し側（API層やスケジューラ）の責務。
pub async fn list_overdue(deps: &ServiceDependencies, as_of: DateTime<Utc>) -> Result<Vec<Borrowing>> {
    let overdue = deps.store.find_open_borrowings_due_before(as_of).await?;
    tracing::debug!(count = overdue.len(), %as_of, "listed overdue borrowings");
    Ok(overdue)
}

/// 貸出を1件取得する
pub async fn get_borrowing(
    deps: &ServiceDependencies,
    actor: &Actor,
    borrowing_id: BorrowingId,
) -> Result<Borrowing> {
    let borrowing = deps
        .store
        .get_borrowing(borrowing_id)
        .await?
        .ok_or(LendingError::BorrowingNotFound)?;

    authorize(
        deps,
        actor,
        Action::ViewBorrowing,
        Resource::Borrowing {
            borrowing_id,
            member_id: borrowing.member_id,
        },
    )
    .await?;

    Ok(borrowing)
}

/// 会員の貸出履歴（新しい順）
pub async fn borrowing_history_for_member(
    deps: &ServiceDependencies,
    actor: &Actor,
    member_id: MemberId,
) -> Result<Vec<Borrowing>> {
    authorize(deps, actor, Action::ViewBorrowing, Resource::Member(member_id)).await?;

    if deps.store.get_member(member_id).await?.is_none() {
        return Err(LendingError::MemberNotFound);
    }

    Ok(deps.store.find_borrowings_by_member(member_id).await?)
}

/// タイトルの貸出履歴（新しい順）
pub async fn borrowing_history_for_title(
    deps: &ServiceDependencies,
    actor: &Actor,
    title_id: TitleId,
) -> Result<Vec<Borrowing>> {
    authorize(deps, actor, Action::ViewBorrowing, Resource::Title(title_id)).await?;

    if deps.store.get_title(title_id).await?.is_none() {
        return Err(LendingError::TitleNotFound);
    }

    Ok(deps.store.find_borrowings_by_title(title_id).await?)
}
