use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::Claims;
use crate::db::AppState;
use crate::models::item::ItemDto;
use crate::services::redemption_service::{self, PurchaseFilter};

use super::{require_staff, retry_policy, scope_from, service_error};

#[derive(Deserialize)]
pub struct ListItemsQuery {
    pub kind: Option<String>,
    pub include_inactive: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/items",
    responses(
        (status = 200, description = "Redeemable items of the caller's school")
    )
)]
pub async fn list_items(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let active_only = !(claims.is_staff() && query.include_inactive.unwrap_or(false));

    let items = redemption_service::list_items(&state.conn, claims.school_id, query.kind, active_only)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({ "items": items })))
}

pub async fn create_item(
    State(state): State<AppState>,
    claims: Claims,
    Json(payload): Json<ItemDto>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_staff(&claims)?;

    let item = redemption_service::create_item(&state.conn, claims.school_id, payload)
        .await
        .map_err(service_error)?;

    Ok(Json(
        json!({ "item": item, "message": "Item created successfully" }),
    ))
}

pub async fn get_item(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let item = redemption_service::get_item(&state.conn, claims.school_id, id)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({ "item": item })))
}

#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub quantity: Option<i32>,
}

#[utoipa::path(
    post,
    path = "/api/items/{id}/purchase",
    responses(
        (status = 200, description = "Purchase recorded, points debited and stock consumed"),
        (status = 409, description = "Insufficient funds or stock, quota exceeded, or item inactive")
    )
)]
pub async fn purchase_item(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<PurchaseRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let scope = scope_from(&claims);
    let retry = retry_policy(&state);
    let quantity = payload.quantity.unwrap_or(1);

    let purchase = redemption_service::purchase(&state.conn, &scope, id, quantity, &retry)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({
        "purchase": purchase,
        "message": "Purchase completed"
    })))
}

#[derive(Deserialize)]
pub struct ListPurchasesQuery {
    pub account_id: Option<i32>,
    pub item_id: Option<i32>,
    pub status: Option<String>,
}

pub async fn list_purchases(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<ListPurchasesQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // Students see their own purchases only.
    let account_id = if claims.is_staff() {
        query.account_id
    } else {
        Some(claims.account_id)
    };

    let filter = PurchaseFilter {
        account_id,
        item_id: query.item_id,
        status: query.status,
    };

    let purchases = redemption_service::list_purchases(&state.conn, claims.school_id, filter)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({ "purchases": purchases })))
}

/// Hand over a pending purchase. Staff only.
pub async fn claim_purchase(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_staff(&claims)?;

    let scope = scope_from(&claims);

    let purchase = redemption_service::claim(&state.conn, &scope, id)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({
        "purchase": purchase,
        "message": "Purchase claimed"
    })))
}

/// Cancel a pending purchase, refunding points and restoring stock.
/// Owners can cancel their own purchases; staff can cancel any.
pub async fn cancel_purchase(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let scope = scope_from(&claims);
    let retry = retry_policy(&state);

    let purchase = redemption_service::cancel(&state.conn, &scope, id, &retry)
        .await
        .map_err(service_error)?;

    Ok(Json(json!({
        "purchase": purchase,
        "message": "Purchase cancelled and refunded"
    })))
}
