use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, adjust_copies, availability, checkout, current_fine, get_borrowing, list_overdue,
    member_borrowings, pay_fine, register_title, retire_title, return_book, unpaid_fines,
};

/// Creates the API router with all lending endpoints
///
/// Borrowing endpoints:
/// - POST /borrowings - Check out a copy
/// - GET /borrowings/overdue - List overdue borrowings
/// - GET /borrowings/:id - Get borrowing details
/// - GET /borrowings/:id/fine - Get the current fine
/// - POST /borrowings/:id/return - Return a copy
/// - GET /members/:id/borrowings - Member borrowing history
///
/// Catalog endpoints:
/// - POST /titles, GET /titles/:id/availability,
///   POST /titles/:id/copies, DELETE /titles/:id
///
/// Fine endpoints:
/// - GET /fines/unpaid, POST /fines/:borrowing_id/pay
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Borrowing endpoints
        .route("/borrowings", post(checkout))
        .route("/borrowings/overdue", get(list_overdue))
        .route("/borrowings/:id", get(get_borrowing))
        .route("/borrowings/:id/fine", get(current_fine))
        .route("/borrowings/:id/return", post(return_book))
        .route("/members/:id/borrowings", get(member_borrowings))
        // Catalog endpoints
        .route("/titles", post(register_title))
        .route("/titles/:id", delete(retire_title))
        .route("/titles/:id/availability", get(availability))
        .route("/titles/:id/copies", post(adjust_copies))
        // Fine endpoints
        .route("/fines/unpaid", get(unpaid_fines))
        .route("/fines/:borrowing_id/pay", post(pay_fine))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
