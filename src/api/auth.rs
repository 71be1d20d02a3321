use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{create_jwt, hash_password, verify_password};
use crate::db::AppState;
use crate::models::{account, school};

#[derive(Deserialize)]
pub struct RegisterRequest {
    school_name: String,
    subdomain: String,
    username: String,
    password: String,
}

/// Bootstrap a new school with its first admin account.
pub async fn register_school(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    let db = &state.conn;
    let now = chrono::Utc::now().to_rfc3339();

    if payload.subdomain.is_empty() || payload.username.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "validation", "message": "subdomain and username are required" })),
        )
            .into_response();
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("password hashing failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal", "message": "Internal error" })),
            )
                .into_response();
        }
    };

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(e) => {
            tracing::error!("failed to open transaction: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "database", "message": "Internal error" })),
            )
                .into_response();
        }
    };

    let new_school = school::ActiveModel {
        name: Set(payload.school_name),
        subdomain: Set(payload.subdomain),
        is_active: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };

    let saved_school = match new_school.insert(&txn).await {
        Ok(s) => s,
        Err(e) if e.to_string().contains("UNIQUE") => {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "duplicate", "message": "Subdomain is already taken" })),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("failed to create school: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "database", "message": "Internal error" })),
            )
                .into_response();
        }
    };

    let admin = account::ActiveModel {
        school_id: Set(saved_school.id),
        username: Set(payload.username),
        password_hash: Set(password_hash),
        role: Set("admin".to_owned()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    let saved_admin = match admin.insert(&txn).await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("failed to create admin account: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "database", "message": "Internal error" })),
            )
                .into_response();
        }
    };

    if let Err(e) = txn.commit().await {
        tracing::error!("failed to commit registration: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "database", "message": "Internal error" })),
        )
            .into_response();
    }

    match create_jwt(&saved_admin) {
        Ok(token) => (
            StatusCode::CREATED,
            Json(json!({
                "school": saved_school,
                "account": saved_admin,
                "token": token
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to issue token: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal", "message": "Internal error" })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    subdomain: String,
    username: String,
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let db = &state.conn;
    tracing::info!(
        "Login attempt for user: {}@{}",
        payload.username,
        payload.subdomain
    );

    let school = match school::Entity::find()
        .filter(school::Column::Subdomain.eq(&payload.subdomain))
        .filter(school::Column::IsActive.eq(true))
        .one(db)
        .await
    {
        Ok(Some(s)) => s,
        _ => {
            tracing::warn!("Unknown school: {}", payload.subdomain);
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response();
        }
    };

    let account = match account::Entity::find()
        .filter(account::Column::SchoolId.eq(school.id))
        .filter(account::Column::Username.eq(&payload.username))
        .one(db)
        .await
    {
        Ok(Some(a)) => a,
        _ => {
            tracing::warn!("User not found: {}", payload.username);
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response();
        }
    };

    match verify_password(&payload.password, &account.password_hash) {
        Ok(true) => {
            let token = match create_jwt(&account) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("failed to issue token: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "Internal error" })),
                    )
                        .into_response();
                }
            };
            (StatusCode::OK, Json(json!({ "token": token }))).into_response()
        }
        _ => {
            tracing::warn!("Password verification failed for user: {}", account.username);
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response()
        }
    }
}
