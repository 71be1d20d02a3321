pub mod account;
pub mod auth;
pub mod badge;
pub mod health;
pub mod quest;
pub mod shop;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::auth::Claims;
use crate::db::AppState;
use crate::services::ledger_service::RetryPolicy;
use crate::services::{Scope, ServiceError};

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth
        .route("/auth/register", post(auth::register_school))
        .route("/auth/login", post(auth::login))
        // Accounts
        .route(
            "/accounts",
            get(account::list_accounts).post(account::create_account),
        )
        .route("/accounts/me", get(account::get_me))
        .route("/accounts/:id/badges", get(badge::list_account_badges))
        // Quests
        .route("/quests", get(quest::list_quests).post(quest::create_quest))
        .route("/quests/:id", get(quest::get_quest))
        .route("/quests/:id/submissions", post(quest::submit_quest))
        // Submissions
        .route("/submissions", get(quest::list_submissions))
        .route("/submissions/:id/approve", put(quest::approve_submission))
        .route("/submissions/:id/reject", put(quest::reject_submission))
        // Marketplace / reward catalog
        .route("/items", get(shop::list_items).post(shop::create_item))
        .route("/items/:id", get(shop::get_item))
        .route("/items/:id/purchase", post(shop::purchase_item))
        .route("/purchases", get(shop::list_purchases))
        .route("/purchases/:id/claim", put(shop::claim_purchase))
        .route("/purchases/:id/cancel", put(shop::cancel_purchase))
        // Badges
        .route("/badges", get(badge::list_badges).post(badge::create_badge))
        .with_state(state)
}

/// Map a service error to an HTTP response with a machine-readable kind.
pub(crate) fn service_error(err: ServiceError) -> (StatusCode, Json<Value>) {
    let (status, kind, message) = match err {
        ServiceError::NotFound => (StatusCode::NOT_FOUND, "not_found", "Not found".to_string()),
        ServiceError::Forbidden => (
            StatusCode::FORBIDDEN,
            "forbidden",
            "Not allowed for this account".to_string(),
        ),
        ServiceError::InsufficientFunds => (
            StatusCode::CONFLICT,
            "insufficient_funds",
            "Point balance does not cover this debit".to_string(),
        ),
        ServiceError::InsufficientStock => (
            StatusCode::CONFLICT,
            "insufficient_stock",
            "Item stock does not cover this quantity".to_string(),
        ),
        ServiceError::ItemInactive => (
            StatusCode::CONFLICT,
            "item_inactive",
            "Item is not available for purchase".to_string(),
        ),
        ServiceError::QuotaExceeded => (
            StatusCode::CONFLICT,
            "quota_exceeded",
            "Per-account limit for this item reached".to_string(),
        ),
        ServiceError::DuplicateSubmission => (
            StatusCode::CONFLICT,
            "duplicate_submission",
            "A submission for this quest already exists".to_string(),
        ),
        ServiceError::InvalidTransition(detail) => {
            (StatusCode::CONFLICT, "invalid_transition", detail)
        }
        ServiceError::Validation(detail) => (StatusCode::BAD_REQUEST, "validation", detail),
        ServiceError::Unavailable(detail) => {
            tracing::error!("ledger store unavailable: {}", detail);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "Storage is temporarily unavailable".to_string(),
            )
        }
        ServiceError::Database(detail) => {
            tracing::error!("database error: {}", detail);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database",
                "Internal error".to_string(),
            )
        }
    };

    (status, Json(json!({ "error": kind, "message": message })))
}

pub(crate) fn scope_from(claims: &Claims) -> Scope {
    Scope {
        school_id: claims.school_id,
        account_id: claims.account_id,
        staff: claims.is_staff(),
    }
}

pub(crate) fn retry_policy(state: &AppState) -> RetryPolicy {
    RetryPolicy {
        attempts: state.config.ledger_retry_attempts,
        backoff_ms: state.config.ledger_retry_backoff_ms,
    }
}

pub(crate) fn require_staff(claims: &Claims) -> Result<(), (StatusCode, Json<Value>)> {
    if claims.is_staff() {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden", "message": "Staff role required" })),
        ))
    }
}
