use crate::domain::{self, Actor, BorrowingId, DomainEvent, Fine, commands::PayFine};
use crate::ports::{Action, Resource};
use chrono::{DateTime, Utc};

use super::errors::{LendingError, Result};
use super::lending_service::{ServiceDependencies, authorize};

/// 貸出の延滞料金を求める
///
/// - 未返却：`now`時点の暫定料金（保存しない）
/// - 返却済み：返却時に確定したスナップショット（支払状況を含む）
///
/// 延滞していなければ`None`。
pub async fn current_fine(
    deps: &ServiceDependencies,
    actor: &Actor,
    borrowing_id: BorrowingId,
    now: DateTime<Utc>,
) -> Result<Option<Fine>> {
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

    if let Some(returned_at) = borrowing.returned_at {
        if let Some(snapshot) = deps.store.get_fine(borrowing_id).await? {
            if snapshot.finalized {
                return Ok(Some(snapshot));
            }
        }
        return Ok(domain::fine::assess_fine(
            borrowing.borrowing_id,
            borrowing.member_id,
            borrowing.due_at,
            returned_at,
            true,
            &deps.policy.current(),
        ));
    }

    Ok(domain::fine::assess_fine(
        borrowing.borrowing_id,
        borrowing.member_id,
        borrowing.due_at,
        now,
        false,
        &deps.policy.current(),
    ))
}

/// 延滞料金を支払済みにする
///
/// ビジネスルール：
/// - 確定済み（返却済み）の料金のみ支払える
/// - 二重の支払いは`FineAlreadyPaid`
pub async fn mark_fine_paid(deps: &ServiceDependencies, actor: &Actor, cmd: PayFine) -> Result<Fine> {
    let snapshot = deps
        .store
        .get_fine(cmd.borrowing_id)
        .await?
        .ok_or(LendingError::FineNotFound)?;

    authorize(
        deps,
        actor,
        Action::CollectFine,
        Resource::Borrowing {
            borrowing_id: cmd.borrowing_id,
            member_id: snapshot.member_id,
        },
    )
    .await?;

    let mut tx = deps.store.begin().await?;
    let fine = tx
        .lock_fine(cmd.borrowing_id)
        .await?
        .ok_or(LendingError::FineNotFound)?;

    let (paid, event) = domain::fine::pay_fine(&fine, cmd.paid_at)?;

    tx.save_fine(&paid).await?;
    tx.append_events(vec![DomainEvent::FinePaid(event)]).await?;
    tx.commit().await?;

    tracing::info!(
        borrowing_id = %paid.borrowing_id,
        member_id = %paid.member_id,
        amount = %paid.amount,
        "fine paid"
    );

    Ok(paid)
}

/// 未払いの確定済み延滞料金（新しい順）
pub async fn list_unpaid_fines(deps: &ServiceDependencies, actor: &Actor) -> Result<Vec<Fine>> {
    authorize(deps, actor, Action::ViewFines, Resource::Library).await?;
    Ok(deps.store.find_unpaid_fines().await?)
}
