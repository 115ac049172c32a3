use crate::application::lending::{self, Availability, ServiceDependencies, authorize};
use crate::domain::{
    Actor, BorrowingId, MemberId, Role, TitleId,
    commands::{AdjustCopies, PayFine, ReturnBook},
};
use crate::ports::{Action, Resource};
use axum::{
    Json, async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::ApiError,
    types::{
        AdjustCopiesRequest, BookReturnedResponse, BorrowingResponse, CheckoutRequest,
        FineResponse, OverdueQuery, RegisterTitleRequest, TitleResponse,
    },
};

/// 呼び出し元のIDヘッダー
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// 呼び出し元のロールヘッダー
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

// ============================================================================
// Actor extraction
// ============================================================================

/// 認証済みの呼び出し元
///
/// 認証は上流のゲートウェイが行い、結果をヘッダーで渡す。
/// ヘッダーがない・不正な場合は401。
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
        };

        let id = header(ACTOR_ID_HEADER)
            .ok_or(ApiError::Unauthorized("missing x-actor-id header"))?
            .parse::<Uuid>()
            .map_err(|_| ApiError::Unauthorized("invalid x-actor-id header"))?;

        let role = header(ACTOR_ROLE_HEADER)
            .ok_or(ApiError::Unauthorized("missing x-actor-role header"))?
            .parse::<Role>()
            .map_err(|_| ApiError::Unauthorized("invalid x-actor-role header"))?;

        Ok(CurrentActor(Actor::new(id, role)))
    }
}

// ============================================================================
// Borrowing handlers
// ============================================================================

/// POST /borrowings - 書籍を貸し出す
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<BorrowingResponse>), ApiError> {
    let now = Utc::now();
    let borrowing = lending::checkout(&state.service_deps, &actor, req.to_command(now)).await?;

    let policy = state.service_deps.policy.current();
    Ok((
        StatusCode::CREATED,
        Json(BorrowingResponse::at(&borrowing, now, &policy)),
    ))
}

/// POST /borrowings/:id/return - 書籍を返却する
///
/// 延滞していた場合は確定した延滞料金も返す。
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(borrowing_id): Path<Uuid>,
) -> Result<Json<BookReturnedResponse>, ApiError> {
    let now = Utc::now();
    let cmd = ReturnBook {
        borrowing_id: BorrowingId::from_uuid(borrowing_id),
        returned_at: now,
    };

    let (borrowing, fine) = lending::return_book(&state.service_deps, &actor, cmd).await?;

    let policy = state.service_deps.policy.current();
    Ok(Json(BookReturnedResponse {
        borrowing: BorrowingResponse::at(&borrowing, now, &policy),
        fine: fine.map(FineResponse::from),
    }))
}

/// GET /borrowings/:id - 貸出詳細（延滞料金は現在時刻で計算）
pub async fn get_borrowing(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(borrowing_id): Path<Uuid>,
) -> Result<Json<BorrowingResponse>, ApiError> {
    let borrowing = lending::get_borrowing(
        &state.service_deps,
        &actor,
        BorrowingId::from_uuid(borrowing_id),
    )
    .await?;

    let policy = state.service_deps.policy.current();
    Ok(Json(BorrowingResponse::at(&borrowing, Utc::now(), &policy)))
}

/// GET /borrowings/overdue?as_of= - 延滞中の貸出一覧
pub async fn list_overdue(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<OverdueQuery>,
) -> Result<Json<Vec<BorrowingResponse>>, ApiError> {
    authorize(
        &state.service_deps,
        &actor,
        Action::ListOverdue,
        Resource::Library,
    )
    .await?;

    let as_of = query.as_of.unwrap_or_else(Utc::now);
    let overdue = lending::list_overdue(&state.service_deps, as_of).await?;

    let policy = state.service_deps.policy.current();
    Ok(Json(
        overdue
            .iter()
            .map(|borrowing| BorrowingResponse::at(borrowing, as_of, &policy))
            .collect(),
    ))
}

/// GET /members/:id/borrowings - 会員の貸出履歴
pub async fn member_borrowings(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(member_id): Path<Uuid>,
) -> Result<Json<Vec<BorrowingResponse>>, ApiError> {
    let history = lending::borrowing_history_for_member(
        &state.service_deps,
        &actor,
        MemberId::from_uuid(member_id),
    )
    .await?;

    let now = Utc::now();
    let policy = state.service_deps.policy.current();
    Ok(Json(
        history
            .iter()
            .map(|borrowing| BorrowingResponse::at(borrowing, now, &policy))
            .collect(),
    ))
}

// ============================================================================
// Catalog handlers
// ============================================================================

/// POST /titles - タイトルを登録する
pub async fn register_title(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<RegisterTitleRequest>,
) -> Result<(StatusCode, Json<TitleResponse>), ApiError> {
    let title =
        lending::register_title(&state.service_deps, &actor, req.to_command(Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(TitleResponse::from(title))))
}

/// GET /titles/:id/availability - 在庫状況
pub async fn availability(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(title_id): Path<Uuid>,
) -> Result<Json<Availability>, ApiError> {
    let availability =
        lending::available_count(&state.service_deps, &actor, TitleId::from_uuid(title_id))
            .await?;
    Ok(Json(availability))
}

/// POST /titles/:id/copies - 蔵書数を増減する
pub async fn adjust_copies(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(title_id): Path<Uuid>,
    Json(req): Json<AdjustCopiesRequest>,
) -> Result<Json<TitleResponse>, ApiError> {
    let cmd = AdjustCopies {
        title_id: TitleId::from_uuid(title_id),
        delta: req.delta,
        adjusted_at: Utc::now(),
    };
    let title = lending::adjust_copies(&state.service_deps, &actor, cmd).await?;
    Ok(Json(TitleResponse::from(title)))
}

/// DELETE /titles/:id - タイトルを除籍する
pub async fn retire_title(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(title_id): Path<Uuid>,
) -> Result<Json<TitleResponse>, ApiError> {
    let title = lending::retire_title(
        &state.service_deps,
        &actor,
        TitleId::from_uuid(title_id),
        Utc::now(),
    )
    .await?;
    Ok(Json(TitleResponse::from(title)))
}

// ============================================================================
// Fine handlers
// ============================================================================

/// GET /fines/unpaid - 未払いの延滞料金
pub async fn unpaid_fines(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<FineResponse>>, ApiError> {
    let fines = lending::list_unpaid_fines(&state.service_deps, &actor).await?;
    Ok(Json(fines.into_iter().map(FineResponse::from).collect()))
}

/// POST /fines/:borrowing_id/pay - 延滞料金を支払済みにする
pub async fn pay_fine(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(borrowing_id): Path<Uuid>,
) -> Result<Json<FineResponse>, ApiError> {
    let cmd = PayFine {
        borrowing_id: BorrowingId::from_uuid(borrowing_id),
        paid_at: Utc::now(),
    };
    let fine = lending::mark_fine_paid(&state.service_deps, &actor, cmd).await?;
    Ok(Json(FineResponse::from(fine)))
}

/// GET /borrowings/:id/fine - 現在の延滞料金（延滞がなければ`null`）
pub async fn current_fine(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(borrowing_id): Path<Uuid>,
) -> Result<Json<Option<FineResponse>>, ApiError> {
    let fine = lending::current_fine(
        &state.service_deps,
        &actor,
        BorrowingId::from_uuid(borrowing_id),
        Utc::now(),
    )
    .await?;
    Ok(Json(fine.map(FineResponse::from)))
}

