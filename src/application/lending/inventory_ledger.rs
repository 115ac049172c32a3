use crate::domain::{self, Actor, DomainEvent, Title, TitleId, commands::*};
use crate::ports::{Action, Resource};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::{LendingError, Result};
use super::lending_service::{ServiceDependencies, authorize};

/// タイトルの在庫状況
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub title_id: TitleId,
    pub total_copies: u32,
    pub available_copies: u32,
    pub is_available: bool,
}

impl From<&Title> for Availability {
    fn from(title: &Title) -> Self {
        Self {
            title_id: title.title_id,
            total_copies: title.total_copies,
            available_copies: title.available_copies,
            is_available: title.is_available(),
        }
    }
}

/// タイトルをカタログに登録する（全冊が貸出可能な状態で登録）
pub async fn register_title(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: RegisterTitle,
) -> Result<Title> {
    authorize(deps, actor, Action::ManageCatalog, Resource::Library).await?;

    let title = domain::inventory::register_title(
        cmd.name,
        cmd.author,
        cmd.isbn,
        cmd.total_copies,
        cmd.registered_at,
    );

    let mut tx = deps.store.begin().await?;
    tx.insert_title(&title).await?;
    if title.total_copies > 0 {
        tx.append_events(vec![DomainEvent::CopiesAdjusted(domain::CopiesAdjusted {
            title_id: title.title_id,
            delta: i64::from(title.total_copies),
            total_copies: title.total_copies,
            available_copies: title.available_copies,
            adjusted_at: cmd.registered_at,
        })])
        .await?;
    }
    tx.commit().await?;

    tracing::info!(title_id = %title.title_id, total_copies = title.total_copies, "title registered");
    Ok(title)
}

/// 蔵書数を増減する
///
/// 減らせるのは書架にある分のみ。貸出中の本は`CopiesOnLoan`。
pub async fn adjust_copies(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: AdjustCopies,
) -> Result<Title> {
    authorize(deps, actor, Action::ManageCatalog, Resource::Title(cmd.title_id)).await?;

    let mut tx = deps.store.begin().await?;
    let title = tx
        .lock_title(cmd.title_id)
        .await?
        .ok_or(LendingError::TitleNotFound)?;

    let (adjusted, event) = domain::inventory::adjust_total(&title, cmd.delta, cmd.adjusted_at)?;

    tx.save_title(&adjusted).await?;
    tx.append_events(vec![DomainEvent::CopiesAdjusted(event)])
        .await?;
    tx.commit().await?;

    tracing::info!(
        title_id = %adjusted.title_id,
        delta = cmd.delta,
        total_copies = adjusted.total_copies,
        available_copies = adjusted.available_copies,
        "copies adjusted"
    );
    Ok(adjusted)
}

/// タイトルを除籍する（書架の全冊を取り除く）
///
/// 1冊でも貸出中なら`CopiesOnLoan`。貸出履歴は残る。
pub async fn retire_title(
    deps: &ServiceDependencies,
    actor: &Actor,
    title_id: TitleId,
    retired_at: DateTime<Utc>,
) -> Result<Title> {
    authorize(deps, actor, Action::ManageCatalog, Resource::Title(title_id)).await?;

    let mut tx = deps.store.begin().await?;
    let title = tx
        .lock_title(title_id)
        .await?
        .ok_or(LendingError::TitleNotFound)?;

    let (retired, event) = domain::inventory::retire(&title, retired_at)?;
    if let Some(event) = event {
        tx.save_title(&retired).await?;
        tx.append_events(vec![DomainEvent::CopiesAdjusted(event)])
            .await?;
    }
    tx.commit().await?;

    tracing::info!(title_id = %retired.title_id, "title retired");
    Ok(retired)
}

/// 在庫状況を取得する（読み取り専用）
pub async fn available_count(
    deps: &ServiceDependencies,
    actor: &Actor,
    title_id: TitleId,
) -> Result<Availability> {
    authorize(deps, actor, Action::ViewCatalog, Resource::Title(title_id)).await?;

    let title = deps
        .store
        .get_title(title_id)
        .await?
        .ok_or(LendingError::TitleNotFound)?;

    Ok(Availability::from(&title))
}
