use crate::application::lending::LendingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub enum ApiError {
    /// アプリケーション層のエラー
    Lending(LendingError),
    /// 呼び出し元の識別ヘッダーがない・不正
    Unauthorized(&'static str),
}

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        ApiError::Lending(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", reason.to_string())
            }
            ApiError::Lending(err) => map_lending_error(err),
        };

        let body = Json(ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}

fn map_lending_error(err: LendingError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        // 403 Forbidden
        LendingError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", message),

        // 404 Not Found - リクエストされたリソースが存在しない
        LendingError::MemberNotFound => (StatusCode::NOT_FOUND, "MEMBER_NOT_FOUND", message),
        LendingError::TitleNotFound => (StatusCode::NOT_FOUND, "TITLE_NOT_FOUND", message),
        LendingError::BorrowingNotFound => {
            (StatusCode::NOT_FOUND, "BORROWING_NOT_FOUND", message)
        }
        LendingError::FineNotFound => (StatusCode::NOT_FOUND, "FINE_NOT_FOUND", message),

        // 409 Conflict - 現在の状態と衝突する
        LendingError::OutOfCopies => (StatusCode::CONFLICT, "OUT_OF_COPIES", message),
        LendingError::AlreadyReturned => (StatusCode::CONFLICT, "ALREADY_RETURNED", message),
        LendingError::AlreadyBorrowed => (StatusCode::CONFLICT, "ALREADY_BORROWED", message),
        LendingError::CopiesOnLoan { .. } => (StatusCode::CONFLICT, "COPIES_ON_LOAN", message),
        LendingError::FineAlreadyPaid => (StatusCode::CONFLICT, "FINE_ALREADY_PAID", message),

        // 422 Unprocessable Entity - ビジネスルール違反
        LendingError::MemberIneligible(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "MEMBER_INELIGIBLE",
            message,
        ),
        LendingError::InvalidDueDate => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_DUE_DATE",
            message,
        ),
        LendingError::InvalidAdjustment => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_ADJUSTMENT",
            message,
        ),
        LendingError::FineNotPayable => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "FINE_NOT_PAYABLE",
            message,
        ),

        // 503 Service Unavailable - 再試行してよい
        LendingError::Transient(ref e) => {
            tracing::warn!("Transient store error: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "TRANSIENT",
                "Temporarily unavailable, please retry".to_string(),
            )
        }

        // 500 Internal Server Error - システム障害
        // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
        LendingError::InvariantViolation(ref detail) => {
            tracing::error!("Invariant violation: {}", detail);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INVARIANT_VIOLATION",
                "Internal consistency error".to_string(),
            )
        }
        LendingError::Store(ref e) => {
            tracing::error!("Store error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "Failed to access lending store".to_string(),
            )
        }
        LendingError::CapabilityService(ref e) => {
            tracing::error!("Capability service error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CAPABILITY_SERVICE_ERROR",
                "Capability service error".to_string(),
            )
        }
    }
}
