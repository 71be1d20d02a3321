use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use sea_orm::*;
use serde_json::{Value, json};

use crate::auth::Claims;
use crate::db::AppState;
use crate::models::account_badge::{self, Entity as AccountBadge};
use crate::models::badge::{self, BadgeDto, Entity as Badge};

use super::require_staff;

pub async fn list_badges(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let badges = Badge::find()
        .filter(badge::Column::SchoolId.eq(claims.school_id))
        .order_by_asc(badge::Column::Name)
        .all(&state.conn)
        .await
        .map_err(internal)?;

    Ok(Json(json!({ "badges": badges })))
}

pub async fn create_badge(
    State(state): State<AppState>,
    claims: Claims,
    Json(payload): Json<BadgeDto>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_staff(&claims)?;

    let now = Utc::now().to_rfc3339();
    let new_badge = badge::ActiveModel {
        school_id: Set(claims.school_id),
        name: Set(payload.name),
        description: Set(payload.description),
        icon: Set(payload.icon),
        required_level: Set(payload.required_level),
        required_quests: Set(payload.required_quests),
        required_points: Set(payload.required_points),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    let saved = new_badge.insert(&state.conn).await.map_err(internal)?;

    Ok(Json(
        json!({ "badge": saved, "message": "Badge created successfully" }),
    ))
}

/// Badges earned by an account. Students may look at themselves; staff at
/// anyone in the school.
pub async fn list_account_badges(
    State(state): State<AppState>,
    claims: Claims,
    Path(account_id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if account_id != claims.account_id && !claims.is_staff() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden", "message": "Not allowed for this account" })),
        ));
    }

    let grants: Vec<Value> = AccountBadge::find()
        .filter(account_badge::Column::AccountId.eq(account_id))
        .filter(account_badge::Column::SchoolId.eq(claims.school_id))
        .find_also_related(Badge)
        .all(&state.conn)
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

    Ok(Json(json!({ "badges": grants })))
}

fn internal(e: sea_orm::DbErr) -> (StatusCode, Json<Value>) {
    tracing::error!("database error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "database", "message": "Internal error" })),
    )
}
