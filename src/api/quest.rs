use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::Claims;
use crate::db::AppState;
use crate::models::quest::QuestDto;
use crate::services::quest_service::{self, QuestPolicy, SubmissionFilter};

use super::{require_staff, retry_policy, scope_from, service_error};

#[derive(Deserialize)]
pub struct ListQuestsQuery {
    pub include_inactive: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/quests",
    responses(
        (status = 200, description = "Quests of the caller's school")
    )
)]
pub async fn list_quests(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<ListQuestsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // Students only ever see active quests.
    let active_only = !(claims.is_staff() && query.include_inactive.unwrap_or(false));

    let quests = quest_service::list_quests(&state.conn, claims.school_id, active_only)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({ "quests": quests })))
}

pub async fn create_quest(
    State(state): State<AppState>,
    claims: Claims,
    Json(payload): Json<QuestDto>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_staff(&claims)?;

    let quest = quest_service::create_quest(&state.conn, claims.school_id, payload)
        .await
        .map_err(service_error)?;

    Ok(Json(
        json!({ "quest": quest, "message": "Quest created successfully" }),
    ))
}

pub async fn get_quest(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let quest = quest_service::get_quest(&state.conn, claims.school_id, id)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({ "quest": quest })))
}

#[derive(Deserialize)]
pub struct SubmitQuestRequest {
    pub comment: Option<String>,
}

pub async fn submit_quest(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<SubmitQuestRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let scope = scope_from(&claims);
    let policy = QuestPolicy {
        allow_resubmit_rejected: state.config.allow_resubmit_rejected,
    };
    let retry = retry_policy(&state);

    let submission =
        quest_service::submit(&state.conn, &scope, id, payload.comment, &policy, &retry)
            .await
            .map_err(service_error)?;

    Ok(Json(json!({
        "submission": submission,
        "message": "Submission recorded"
    })))
}

#[derive(Deserialize)]
pub struct ListSubmissionsQuery {
    pub status: Option<String>,
    pub quest_id: Option<i32>,
    pub account_id: Option<i32>,
}

pub async fn list_submissions(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<ListSubmissionsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // Students see their own submissions only.
    let account_id = if claims.is_staff() {
        query.account_id
    } else {
        Some(claims.account_id)
    };

    let filter = SubmissionFilter {
        status: query.status,
        quest_id: query.quest_id,
        account_id,
    };

    let submissions = quest_service::list_submissions(&state.conn, claims.school_id, filter)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({ "submissions": submissions })))
}

pub async fn approve_submission(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_staff(&claims)?;

    let scope = scope_from(&claims);
    let retry = retry_policy(&state);

    let (submission, new_badges) = quest_service::approve(&state.conn, &scope, id, &retry)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({
        "submission": submission,
        "new_badges": new_badges,
        "message": "Submission approved"
    })))
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub feedback: Option<String>,
}

pub async fn reject_submission(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_staff(&claims)?;

    let scope = scope_from(&claims);

    let submission = quest_service::reject(&state.conn, &scope, id, payload.feedback)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({
        "submission": submission,
        "message": "Submission rejected"
    })))
}
