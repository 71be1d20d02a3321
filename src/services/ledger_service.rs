//! Ledger Store - the only code allowed to mutate point balances, item
//! stock and badge grants. All four primitives are single conditional
//! statements against the store, so concurrent requests on the same key
//! serialize there instead of racing in process memory. Each primitive is
//! generic over the connection so workflows can run several of them inside
//! one transaction.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::*;

use crate::models::account::{self, Entity as Account};
use crate::models::account_badge::{self, Entity as AccountBadge};
use crate::models::item::{self, Entity as Item};
use crate::models::ledger_audit;

use super::ServiceError;

/// What a credit means for the account's lifetime stats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CreditKind {
    /// Earned points raise the spendable balance and lifetime experience.
    Earn,
    /// Refunds restore the balance only; experience never goes back up
    /// for points the account already earned once.
    Refund,
}

/// Outcome of a badge grant request. `AlreadyGranted` is idempotent
/// success, not an error, so evaluators can re-run safely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BadgeGrant {
    Granted,
    AlreadyGranted,
}

/// Bounded retry for transient store failures. Business failures are
/// never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 50,
        }
    }
}

/// Re-run `op` while it fails with `ServiceError::Unavailable`, up to
/// `policy.attempts` total attempts with linear backoff. `op` must be a
/// whole failure-atomic unit: nothing committed means re-running is safe.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Err(ServiceError::Unavailable(msg)) if attempt < policy.attempts.max(1) => {
                let delay = policy.backoff_ms * u64::from(attempt);
                tracing::warn!(
                    "ledger store unavailable (attempt {}/{}): {}; retrying in {}ms",
                    attempt,
                    policy.attempts,
                    msg,
                    delay
                );
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Level ladder: 100 XP to reach level 2, each step costing 50 more than
/// the previous one. Monotone in experience by construction.
pub fn level_for_experience(experience: i64) -> i32 {
    let mut level = 1;
    let mut step = 100;
    let mut threshold = 100;
    while experience >= threshold {
        level += 1;
        step += 50;
        threshold += step;
    }
    level
}

/// Credit `amount` points to an account and write the audit entry.
pub async fn credit<C: ConnectionTrait>(
    conn: &C,
    school_id: i32,
    account_id: i32,
    amount: i64,
    kind: CreditKind,
    actor: i32,
    reason: &str,
) -> Result<account::Model, ServiceError> {
    if amount <= 0 {
        return Err(ServiceError::Validation(
            "credit amount must be positive".to_string(),
        ));
    }

    let now = Utc::now().to_rfc3339();

    let mut update = Account::update_many()
        .col_expr(
            account::Column::PointBalance,
            Expr::col(account::Column::PointBalance).add(amount),
        )
        .col_expr(account::Column::UpdatedAt, Expr::value(now));

    if kind == CreditKind::Earn {
        update = update.col_expr(
            account::Column::Experience,
            Expr::col(account::Column::Experience).add(amount),
        );
    }

    let res = update
        .filter(account::Column::Id.eq(account_id))
        .filter(account::Column::SchoolId.eq(school_id))
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        return Err(ServiceError::NotFound);
    }

    let mut updated = Account::find_by_id(account_id)
        .one(conn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    // Level only ever moves up, and only as a function of experience.
    let new_level = level_for_experience(updated.experience);
    if new_level > updated.level {
        Account::update_many()
            .col_expr(account::Column::Level, Expr::value(new_level))
            .filter(account::Column::Id.eq(account_id))
            .filter(account::Column::Level.lt(new_level))
            .exec(conn)
            .await?;
        updated = Account::find_by_id(account_id)
            .one(conn)
            .await?
            .ok_or(ServiceError::NotFound)?;
    }

    write_audit(
        conn,
        school_id,
        "balance",
        account_id,
        actor,
        amount,
        updated.point_balance - amount,
        updated.point_balance,
        reason,
    )
    .await?;

    Ok(updated)
}

/// Debit `amount` points. The balance check and the subtraction are one
/// conditional UPDATE: two concurrent debits can never both pass a check
/// against a balance that only covers one of them. No partial debit.
pub async fn debit<C: ConnectionTrait>(
    conn: &C,
    school_id: i32,
    account_id: i32,
    amount: i64,
    actor: i32,
    reason: &str,
) -> Result<account::Model, ServiceError> {
    if amount <= 0 {
        return Err(ServiceError::Validation(
            "debit amount must be positive".to_string(),
        ));
    }

    // Existence first, so a missing account is NotFound and not a
    // misleading InsufficientFunds.
    Account::find_by_id(account_id)
        .filter(account::Column::SchoolId.eq(school_id))
        .one(conn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let now = Utc::now().to_rfc3339();

    let res = Account::update_many()
        .col_expr(
            account::Column::PointBalance,
            Expr::col(account::Column::PointBalance).sub(amount),
        )
        .col_expr(account::Column::UpdatedAt, Expr::value(now))
        .filter(account::Column::Id.eq(account_id))
        .filter(account::Column::SchoolId.eq(school_id))
        .filter(account::Column::PointBalance.gte(amount))
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        return Err(ServiceError::InsufficientFunds);
    }

    let updated = Account::find_by_id(account_id)
        .one(conn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    write_audit(
        conn,
        school_id,
        "balance",
        account_id,
        actor,
        -amount,
        updated.point_balance + amount,
        updated.point_balance,
        reason,
    )
    .await?;

    Ok(updated)
}

/// Adjust an item's supply counter. Negative delta on purchase, positive
/// on cancellation. Items with NULL stock are unlimited and pass through
/// untouched.
pub async fn adjust_stock<C: ConnectionTrait>(
    conn: &C,
    school_id: i32,
    item_id: i32,
    delta: i32,
    actor: i32,
    reason: &str,
) -> Result<item::Model, ServiceError> {
    if delta == 0 {
        return Err(ServiceError::Validation(
            "stock delta must be non-zero".to_string(),
        ));
    }

    let current = Item::find_by_id(item_id)
        .filter(item::Column::SchoolId.eq(school_id))
        .one(conn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if current.stock.is_none() {
        return Ok(current);
    }

    let now = Utc::now().to_rfc3339();

    // stock >= -delta is stock + delta >= 0, checked and applied in one
    // statement.
    let res = Item::update_many()
        .col_expr(
            item::Column::Stock,
            Expr::col(item::Column::Stock).add(delta),
        )
        .col_expr(item::Column::UpdatedAt, Expr::value(now))
        .filter(item::Column::Id.eq(item_id))
        .filter(item::Column::SchoolId.eq(school_id))
        .filter(item::Column::Stock.gte(-delta))
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock);
    }

    let updated = Item::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let after = i64::from(updated.stock.unwrap_or(0));
    write_audit(
        conn,
        school_id,
        "stock",
        item_id,
        actor,
        i64::from(delta),
        after - i64::from(delta),
        after,
        reason,
    )
    .await?;

    Ok(updated)
}

/// Grant a badge to an account at most once, ever. The UNIQUE pair on
/// account_badges does the coordination: the second insert is dropped by
/// the store and reported as `AlreadyGranted`, whichever evaluator it
/// came from.
pub async fn grant_badge_once<C: ConnectionTrait>(
    conn: &C,
    school_id: i32,
    account_id: i32,
    badge_id: i32,
    actor: i32,
) -> Result<BadgeGrant, ServiceError> {
    let grant = account_badge::ActiveModel {
        school_id: Set(school_id),
        account_id: Set(account_id),
        badge_id: Set(badge_id),
        earned_at: Set(Utc::now().to_rfc3339()),
        ..Default::default()
    };

    let insert = AccountBadge::insert(grant)
        .on_conflict(
            OnConflict::columns([
                account_badge::Column::AccountId,
                account_badge::Column::BadgeId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec(conn)
        .await;

    match insert {
        Ok(_) => {
            write_audit(
                conn,
                school_id,
                "badge",
                account_id,
                actor,
                1,
                0,
                1,
                &format!("badge {} granted", badge_id),
            )
            .await?;
            Ok(BadgeGrant::Granted)
        }
        Err(DbErr::RecordNotInserted) => Ok(BadgeGrant::AlreadyGranted),
        Err(e) => Err(e.into()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn write_audit<C: ConnectionTrait>(
    conn: &C,
    school_id: i32,
    entity_type: &str,
    entity_id: i32,
    actor: i32,
    delta: i64,
    before: i64,
    after: i64,
    reason: &str,
) -> Result<(), ServiceError> {
    let entry = ledger_audit::ActiveModel {
        school_id: Set(school_id),
        entity_type: Set(entity_type.to_owned()),
        entity_id: Set(entity_id),
        actor: Set(actor),
        delta: Set(delta),
        before_value: Set(before),
        after_value: Set(after),
        reason: Set(reason.to_owned()),
        created_at: Set(Utc::now().to_rfc3339()),
        ..Default::default()
    };
    entry.insert(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::level_for_experience;

    #[test]
    fn level_ladder_thresholds() {
        assert_eq!(level_for_experience(0), 1);
        assert_eq!(level_for_experience(99), 1);
        assert_eq!(level_for_experience(100), 2);
        assert_eq!(level_for_experience(249), 2);
        assert_eq!(level_for_experience(250), 3);
        assert_eq!(level_for_experience(449), 3);
        assert_eq!(level_for_experience(450), 4);
    }

    #[test]
    fn level_is_monotone() {
        let mut last = 0;
        for exp in (0..5000).step_by(7) {
            let level = level_for_experience(exp);
            assert!(level >= last, "level dropped at {} XP", exp);
            last = level;
        }
    }
}
