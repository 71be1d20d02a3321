use axum::{Json, extract::State, http::StatusCode};
use sea_orm::*;
use serde_json::{Value, json};

use crate::auth::{Claims, hash_password};
use crate::db::AppState;
use crate::models::account::{self, AccountDto, Entity as Account};
use crate::models::account_badge::{self, Entity as AccountBadge};
use crate::models::badge::Entity as Badge;

use super::require_staff;

/// Current account with its ledger stats and earned badges.
pub async fn get_me(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let db = &state.conn;

    let account = Account::find_by_id(claims.account_id)
        .filter(account::Column::SchoolId.eq(claims.school_id))
        .one(db)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_found", "message": "Account not found" })),
        ))?;

    let badges: Vec<Value> = AccountBadge::find()
        .filter(account_badge::Column::AccountId.eq(account.id))
        .find_also_related(Badge)
        .all(db)
        .await
        .map_err(internal)?
        .into_iter()
        .map(|(grant, badge)| {
            json!({
                "badge": badge,
                "earned_at": grant.earned_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "account": account,
        "badges": badges,
    })))
}

/// School roster with balances. Staff only.
pub async fn list_accounts(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_staff(&claims)?;

    let accounts = Account::find()
        .filter(account::Column::SchoolId.eq(claims.school_id))
        .order_by_asc(account::Column::Username)
        .all(&state.conn)
        .await
        .map_err(internal)?;

    Ok(Json(json!({ "accounts": accounts })))
}

/// Create an account in the caller's school. Staff only; only admins may
/// create other admins.
pub async fn create_account(
    State(state): State<AppState>,
    claims: Claims,
    Json(payload): Json<AccountDto>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_staff(&claims)?;

    let role = payload.role.unwrap_or_else(|| "student".to_string());
    if role != "student" && role != "teacher" && role != "admin" {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "validation", "message": format!("unknown role '{}'", role) })),
        ));
    }
    if role == "admin" && claims.role != "admin" {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden", "message": "Only admins can create admins" })),
        ));
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        tracing::error!("password hashing failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal", "message": "Internal error" })),
        )
    })?;

    let now = chrono::Utc::now().to_rfc3339();
    let new_account = account::ActiveModel {
        school_id: Set(claims.school_id),
        username: Set(payload.username),
        password_hash: Set(password_hash),
        role: Set(role),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    let saved = match new_account.insert(&state.conn).await {
        Ok(a) => a,
        Err(e) if e.to_string().contains("UNIQUE") => {
            return Err((
                StatusCode::CONFLICT,
                Json(
                    json!({ "error": "duplicate", "message": "Username already exists in this school" }),
                ),
            ));
        }
        Err(e) => return Err(internal(e)),
    };

    Ok(Json(json!({ "account": saved })))
}

fn internal(e: sea_orm::DbErr) -> (StatusCode, Json<Value>) {
    tracing::error!("database error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "database", "message": "Internal error" })),
    )
}
