//! Redemption Engine - debit flows for marketplace products and catalog
//! rewards. A purchase consumes stock and funds inside one transaction:
//! either the stock decrement, the debit and the record all become
//! visible together, or none of them do.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::item::{self, Entity as Item, ItemDto};
use crate::models::purchase::{self, Entity as Purchase};

use super::ledger_service::{self, CreditKind, RetryPolicy, with_retry};
use super::{Scope, ServiceError, badge_service};

/// The full transition table for purchase records. Everything not listed
/// here is an `InvalidTransition`; claimed and cancelled are terminal.
const PURCHASE_TRANSITIONS: &[(&str, &str)] = &[
    ("pending_claim", "claimed"),
    ("pending_claim", "cancelled"),
];

pub fn transition_allowed(from: &str, to: &str) -> bool {
    PURCHASE_TRANSITIONS.contains(&(from, to))
}

/// Enriched purchase with related data
#[derive(Debug, Clone, serde::Serialize)]
pub struct PurchaseWithDetails {
    pub id: i32,
    pub reference: String,
    pub item_id: i32,
    pub account_id: i32,
    pub quantity: i32,
    pub points_spent: i64,
    pub status: String,
    pub claimed_at: Option<String>,
    pub claimed_by: Option<i32>,
    pub cancelled_at: Option<String>,
    pub created_at: String,
    pub item_name: String,
    pub item_kind: String,
}

/// Filter parameters for listing purchases
#[derive(Debug, Default, Clone)]
pub struct PurchaseFilter {
    pub account_id: Option<i32>,
    pub item_id: Option<i32>,
    pub status: Option<String>,
}

pub async fn create_item(
    db: &DatabaseConnection,
    school_id: i32,
    dto: ItemDto,
) -> Result<item::Model, ServiceError> {
    if dto.price_points <= 0 {
        return Err(ServiceError::Validation(
            "price_points must be positive".to_string(),
        ));
    }
    if let Some(stock) = dto.stock {
        if stock < 0 {
            return Err(ServiceError::Validation(
                "stock cannot be negative".to_string(),
            ));
        }
    }
    let kind = dto.kind.unwrap_or_else(|| "product".to_string());
    if kind != "product" && kind != "reward" {
        return Err(ServiceError::Validation(format!(
            "unknown item kind '{}'",
            kind
        )));
    }

    let now = Utc::now().to_rfc3339();
    let new_item = item::ActiveModel {
        school_id: Set(school_id),
        name: Set(dto.name),
        description: Set(dto.description),
        kind: Set(kind),
        price_points: Set(dto.price_points),
        stock: Set(dto.stock),
        max_per_account: Set(dto.max_per_account),
        is_active: Set(dto.is_active.unwrap_or(true)),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    Ok(new_item.insert(db).await?)
}

pub async fn list_items(
    db: &DatabaseConnection,
    school_id: i32,
    kind: Option<String>,
    active_only: bool,
) -> Result<Vec<item::Model>, ServiceError> {
    let mut query = Item::find().filter(item::Column::SchoolId.eq(school_id));
    if let Some(kind) = kind {
        query = query.filter(item::Column::Kind.eq(kind));
    }
    if active_only {
        query = query.filter(item::Column::IsActive.eq(true));
    }
    Ok(query.order_by_desc(item::Column::CreatedAt).all(db).await?)
}

pub async fn get_item(
    db: &DatabaseConnection,
    school_id: i32,
    item_id: i32,
) -> Result<item::Model, ServiceError> {
    Item::find_by_id(item_id)
        .filter(item::Column::SchoolId.eq(school_id))
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)
}

/// Purchase `quantity` of an item for the calling account.
pub async fn purchase(
    db: &DatabaseConnection,
    scope: &Scope,
    item_id: i32,
    quantity: i32,
    retry: &RetryPolicy,
) -> Result<purchase::Model, ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }

    let record = with_retry(retry, || purchase_once(db, scope, item_id, quantity)).await?;

    // Point thresholds may also unlock badges; evaluation is idempotent
    // and runs outside the purchase unit.
    if let Err(e) =
        badge_service::evaluate(db, scope.school_id, scope.account_id, scope.account_id).await
    {
        tracing::warn!(
            "badge evaluation after purchase {} failed: {:?}",
            record.reference,
            e
        );
    }

    Ok(record)
}

async fn purchase_once(
    db: &DatabaseConnection,
    scope: &Scope,
    item_id: i32,
    quantity: i32,
) -> Result<purchase::Model, ServiceError> {
    let txn = db.begin().await?;

    let item = Item::find_by_id(item_id)
        .filter(item::Column::SchoolId.eq(scope.school_id))
        .one(&txn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if !item.is_active {
        return Err(ServiceError::ItemInactive);
    }

    if let Some(max) = item.max_per_account {
        // Cancelled purchases gave their quantity back, so they do not
        // count against the quota.
        let prior: i64 = Purchase::find()
            .filter(purchase::Column::ItemId.eq(item_id))
            .filter(purchase::Column::AccountId.eq(scope.account_id))
            .filter(purchase::Column::Status.ne("cancelled"))
            .all(&txn)
            .await?
            .iter()
            .map(|p| i64::from(p.quantity))
            .sum();
        if prior + i64::from(quantity) > i64::from(max) {
            return Err(ServiceError::QuotaExceeded);
        }
    }

    // Price snapshot at this instant; later catalog edits never touch it.
    let points_spent = item.price_points * i64::from(quantity);

    // Stock first, then funds. Any `?` below drops the transaction and
    // rolls both back, so stock is never consumed without a debit.
    ledger_service::adjust_stock(
        &txn,
        scope.school_id,
        item.id,
        -quantity,
        scope.account_id,
        &format!("purchase x{} '{}'", quantity, item.name),
    )
    .await?;

    ledger_service::debit(
        &txn,
        scope.school_id,
        scope.account_id,
        points_spent,
        scope.account_id,
        &format!("purchase x{} '{}'", quantity, item.name),
    )
    .await?;

    let now = Utc::now().to_rfc3339();
    let record = purchase::ActiveModel {
        school_id: Set(scope.school_id),
        reference: Set(Uuid::new_v4().to_string()),
        item_id: Set(item.id),
        account_id: Set(scope.account_id),
        quantity: Set(quantity),
        points_spent: Set(points_spent),
        status: Set("pending_claim".to_owned()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    let saved = record.insert(&txn).await?;

    txn.commit().await?;

    Ok(saved)
}

/// Cancel a pending purchase, refunding the snapshot price and restoring
/// stock. A cancel on an already cancelled or claimed record fails with
/// `InvalidTransition` and touches nothing, so a refund can never happen
/// twice.
pub async fn cancel(
    db: &DatabaseConnection,
    scope: &Scope,
    purchase_id: i32,
    retry: &RetryPolicy,
) -> Result<purchase::Model, ServiceError> {
    with_retry(retry, || cancel_once(db, scope, purchase_id)).await
}

async fn cancel_once(
    db: &DatabaseConnection,
    scope: &Scope,
    purchase_id: i32,
) -> Result<purchase::Model, ServiceError> {
    let txn = db.begin().await?;

    let record = Purchase::find_by_id(purchase_id)
        .filter(purchase::Column::SchoolId.eq(scope.school_id))
        .one(&txn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if record.account_id != scope.account_id && !scope.staff {
        return Err(ServiceError::Forbidden);
    }

    if !transition_allowed(&record.status, "cancelled") {
        return Err(ServiceError::InvalidTransition(format!(
            "purchase is already {}",
            record.status
        )));
    }

    let now = Utc::now().to_rfc3339();

    let res = Purchase::update_many()
        .col_expr(purchase::Column::Status, Expr::value("cancelled"))
        .col_expr(
            purchase::Column::CancelledAt,
            Expr::value(Some(now.clone())),
        )
        .col_expr(purchase::Column::UpdatedAt, Expr::value(now))
        .filter(purchase::Column::Id.eq(purchase_id))
        .filter(purchase::Column::Status.eq("pending_claim"))
        .exec(&txn)
        .await?;

    if res.rows_affected == 0 {
        return Err(ServiceError::InvalidTransition(format!(
            "purchase is already {}",
            record.status
        )));
    }

    ledger_service::credit(
        &txn,
        scope.school_id,
        record.account_id,
        record.points_spent,
        CreditKind::Refund,
        scope.account_id,
        &format!("refund purchase {}", record.reference),
    )
    .await?;

    ledger_service::adjust_stock(
        &txn,
        scope.school_id,
        record.item_id,
        record.quantity,
        scope.account_id,
        &format!("restock from cancelled purchase {}", record.reference),
    )
    .await?;

    txn.commit().await?;

    Purchase::find_by_id(purchase_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)
}

/// Mark a pending purchase as handed over. Funds were captured at
/// purchase time, so claiming has no ledger effect.
pub async fn claim(
    db: &DatabaseConnection,
    scope: &Scope,
    purchase_id: i32,
) -> Result<purchase::Model, ServiceError> {
    let record = Purchase::find_by_id(purchase_id)
        .filter(purchase::Column::SchoolId.eq(scope.school_id))
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if !transition_allowed(&record.status, "claimed") {
        return Err(ServiceError::InvalidTransition(format!(
            "purchase is already {}",
            record.status
        )));
    }

    let now = Utc::now().to_rfc3339();

    let res = Purchase::update_many()
        .col_expr(purchase::Column::Status, Expr::value("claimed"))
        .col_expr(purchase::Column::ClaimedAt, Expr::value(Some(now.clone())))
        .col_expr(
            purchase::Column::ClaimedBy,
            Expr::value(Some(scope.account_id)),
        )
        .col_expr(purchase::Column::UpdatedAt, Expr::value(now))
        .filter(purchase::Column::Id.eq(purchase_id))
        .filter(purchase::Column::Status.eq("pending_claim"))
        .exec(db)
        .await?;

    if res.rows_affected == 0 {
        return Err(ServiceError::InvalidTransition(format!(
            "purchase is already {}",
            record.status
        )));
    }

    Purchase::find_by_id(purchase_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)
}

/// List purchases with item names joined in.
pub async fn list_purchases(
    db: &DatabaseConnection,
    school_id: i32,
    filter: PurchaseFilter,
) -> Result<Vec<PurchaseWithDetails>, ServiceError> {
    let mut condition = Condition::all().add(purchase::Column::SchoolId.eq(school_id));

    if let Some(account_id) = filter.account_id {
        condition = condition.add(purchase::Column::AccountId.eq(account_id));
    }
    if let Some(item_id) = filter.item_id {
        condition = condition.add(purchase::Column::ItemId.eq(item_id));
    }
    if let Some(status) = filter.status {
        condition = condition.add(purchase::Column::Status.eq(status));
    }

    let purchases = Purchase::find()
        .filter(condition)
        .order_by_desc(purchase::Column::CreatedAt)
        .all(db)
        .await?;

    // Fetch item names in one query
    let item_ids: Vec<i32> = purchases.iter().map(|p| p.item_id).collect();
    let mut item_map: HashMap<i32, (String, String)> = HashMap::new();

    if !item_ids.is_empty() {
        let items = Item::find()
            .filter(item::Column::Id.is_in(item_ids))
            .all(db)
            .await?;
        for item in items {
            item_map.insert(item.id, (item.name, item.kind));
        }
    }

    let result: Vec<PurchaseWithDetails> = purchases
        .into_iter()
        .map(|p| {
            let (item_name, item_kind) = item_map
                .get(&p.item_id)
                .cloned()
                .unwrap_or_else(|| ("Unknown".to_string(), "product".to_string()));

            PurchaseWithDetails {
                id: p.id,
                reference: p.reference,
                item_id: p.item_id,
                account_id: p.account_id,
                quantity: p.quantity,
                points_spent: p.points_spent,
                status: p.status,
                claimed_at: p.claimed_at,
                claimed_by: p.claimed_by,
                cancelled_at: p.cancelled_at,
                created_at: p.created_at,
                item_name,
                item_kind,
            }
        })
        .collect();

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::transition_allowed;

    #[test]
    fn pending_claim_can_be_claimed_or_cancelled() {
        assert!(transition_allowed("pending_claim", "claimed"));
        assert!(transition_allowed("pending_claim", "cancelled"));
    }

    #[test]
    fn claimed_and_cancelled_are_terminal() {
        for from in ["claimed", "cancelled"] {
            for to in ["pending_claim", "claimed", "cancelled"] {
                assert!(!transition_allowed(from, to), "{} -> {}", from, to);
            }
        }
    }
}
