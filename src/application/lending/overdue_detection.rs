use crate::domain::{self, BorrowingId, DomainEvent, Fine, LendingPolicy};
use chrono::{DateTime, Utc};

use super::errors::Result;
use super::lending_service::ServiceDependencies;

/// 延滞料金の更新バッチ
///
/// 外部のスケジューラから定期的に呼ばれ、延滞中の貸出ごとに
/// 暫定の延滞料金スナップショットを保存する。
///
/// ビジネスルール：
/// - 延滞はいつでも再計算できるので、貸出の状態は変更しない
/// - 確定済み（返却時に保存された）の料金には触れない
/// - 金額が変わらない場合は書き込まない
///
/// 貸出1件ごとに別トランザクションで処理する。
/// 一時的なエラーの貸出は飛ばして残りを処理する。
///
/// # 戻り値
/// 新規作成または更新したスナップショットの件数
pub async fn refresh_overdue_fines(deps: &ServiceDependencies, as_of: DateTime<Utc>) -> Result<usize> {
    let policy = deps.policy.current();
    let candidates = deps.store.find_open_borrowings_due_before(as_of).await?;
    let mut refreshed = 0;
    let mut skipped = 0;

    for candidate in candidates {
        match refresh_one(deps, candidate.borrowing_id, as_of, &policy).await {
            Ok(Some(fine)) => {
                tracing::warn!(
                    borrowing_id = %fine.borrowing_id,
                    member_id = %fine.member_id,
                    amount = %fine.amount,
                    overdue_days = fine.overdue_days,
                    "provisional fine accrued"
                );
                refreshed += 1;
            }
            Ok(None) => {}
            // ロック待ちのタイムアウトなどは次回の実行で拾える
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    borrowing_id = %candidate.borrowing_id,
                    error = %err,
                    "skipping borrowing in overdue sweep"
                );
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    tracing::info!(refreshed, skipped, %as_of, "overdue fine sweep finished");
    Ok(refreshed)
}

/// 貸出1件分の延滞料金を更新する
///
/// 書き込んだ場合のみ`Some`。
async fn refresh_one(
    deps: &ServiceDependencies,
    borrowing_id: BorrowingId,
    as_of: DateTime<Utc>,
    policy: &LendingPolicy,
) -> Result<Option<Fine>> {
    let mut tx = deps.store.begin().await?;

    // 候補の取得後に返却された場合はスキップ
    let borrowing = match tx.lock_borrowing(borrowing_id).await? {
        Some(borrowing) if !borrowing.is_returned() => borrowing,
        _ => return Ok(None),
    };

    let existing = tx.lock_fine(borrowing.borrowing_id).await?;
    if existing.as_ref().is_some_and(|fine| fine.finalized) {
        return Ok(None);
    }

    let Some(fine) = domain::fine::assess_fine(
        borrowing.borrowing_id,
        borrowing.member_id,
        borrowing.due_at,
        as_of,
        false,
        policy,
    ) else {
        return Ok(None);
    };

    let unchanged = existing.as_ref().is_some_and(|previous| {
        previous.amount == fine.amount && previous.overdue_days == fine.overdue_days
    });
    if unchanged {
        return Ok(None);
    }

    tx.save_fine(&fine).await?;
    tx.append_events(vec![DomainEvent::FineAssessed((&fine).into())])
        .await?;
    tx.commit().await?;

    Ok(Some(fine))
}
