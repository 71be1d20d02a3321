//! Ledger Store tests: the four primitives, their guards and the audit
//! trail they leave behind.

use questledger::db;
use questledger::models::{account, item, ledger_audit, school};
use questledger::services::ServiceError;
use questledger::services::ledger_service::{self, BadgeGrant, CreditKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

// Helper to create a test database
async fn setup_test_db() -> DatabaseConnection {
    db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB")
}

async fn create_test_school(db: &DatabaseConnection, subdomain: &str) -> i32 {
    let now = chrono::Utc::now().to_rfc3339();
    let model = school::ActiveModel {
        name: Set(format!("School {}", subdomain)),
        subdomain: Set(subdomain.to_string()),
        is_active: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    model.insert(db).await.expect("Failed to create school").id
}

async fn create_test_account(
    db: &DatabaseConnection,
    school_id: i32,
    username: &str,
    balance: i64,
) -> i32 {
    let now = chrono::Utc::now().to_rfc3339();
    let model = account::ActiveModel {
        school_id: Set(school_id),
        username: Set(username.to_string()),
        password_hash: Set("$argon2id$dummy".to_string()),
        role: Set("student".to_string()),
        point_balance: Set(balance),
        experience: Set(balance),
        level: Set(ledger_service::level_for_experience(balance)),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    model.insert(db).await.expect("Failed to create account").id
}

async fn create_test_item(
    db: &DatabaseConnection,
    school_id: i32,
    name: &str,
    price: i64,
    stock: Option<i32>,
) -> i32 {
    let now = chrono::Utc::now().to_rfc3339();
    let model = item::ActiveModel {
        school_id: Set(school_id),
        name: Set(name.to_string()),
        description: Set(None),
        kind: Set("product".to_string()),
        price_points: Set(price),
        stock: Set(stock),
        max_per_account: Set(None),
        is_active: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    model.insert(db).await.expect("Failed to create item").id
}

async fn create_test_badge(db: &DatabaseConnection, school_id: i32, name: &str) -> i32 {
    let now = chrono::Utc::now().to_rfc3339();
    let model = questledger::models::badge::ActiveModel {
        school_id: Set(school_id),
        name: Set(name.to_string()),
        description: Set(None),
        icon: Set(None),
        required_level: Set(None),
        required_quests: Set(None),
        required_points: Set(Some(1)),
        is_active: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    model.insert(db).await.expect("Failed to create badge").id
}

#[tokio::test]
async fn credit_raises_balance_experience_and_level() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let account_id = create_test_account(&db, school_id, "ada", 0).await;

    let updated = ledger_service::credit(
        &db,
        school_id,
        account_id,
        150,
        CreditKind::Earn,
        account_id,
        "quest reward",
    )
    .await
    .expect("credit failed");

    assert_eq!(updated.point_balance, 150);
    assert_eq!(updated.experience, 150);
    assert_eq!(updated.level, 2); // level 2 starts at 100 XP
}

#[tokio::test]
async fn refund_credit_leaves_experience_alone() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let account_id = create_test_account(&db, school_id, "ada", 50).await;

    let updated = ledger_service::credit(
        &db,
        school_id,
        account_id,
        30,
        CreditKind::Refund,
        account_id,
        "refund",
    )
    .await
    .expect("credit failed");

    assert_eq!(updated.point_balance, 80);
    assert_eq!(updated.experience, 50);
}

#[tokio::test]
async fn credit_rejects_non_positive_amounts() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let account_id = create_test_account(&db, school_id, "ada", 0).await;

    let result =
        ledger_service::credit(&db, school_id, account_id, 0, CreditKind::Earn, account_id, "x")
            .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn debit_sequence_never_overdraws() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let account_id = create_test_account(&db, school_id, "ada", 100).await;

    // The check and the subtraction are one conditional statement, so
    // whatever the interleaving, successful debits can never exceed the
    // balance they were checked against.
    let mut succeeded = 0;
    for _ in 0..4 {
        if ledger_service::debit(&db, school_id, account_id, 40, account_id, "spend")
            .await
            .is_ok()
        {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 2);

    let acc = account::Entity::find_by_id(account_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(acc.point_balance, 20);
}

#[tokio::test]
async fn overdraw_fails_without_partial_debit() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let account_id = create_test_account(&db, school_id, "ada", 100).await;

    let result = ledger_service::debit(&db, school_id, account_id, 120, account_id, "spend").await;
    assert_eq!(result, Err(ServiceError::InsufficientFunds));

    let acc = account::Entity::find_by_id(account_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(acc.point_balance, 100);
}

#[tokio::test]
async fn debit_unknown_account_is_not_found() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;

    let result = ledger_service::debit(&db, school_id, 999, 10, 1, "spend").await;
    assert_eq!(result, Err(ServiceError::NotFound));
}

#[tokio::test]
async fn debit_is_scoped_to_the_tenant() {
    let db = setup_test_db().await;
    let school_a = create_test_school(&db, "alpha").await;
    let school_b = create_test_school(&db, "beta").await;
    let account_id = create_test_account(&db, school_a, "ada", 100).await;

    // Same account id, wrong school: indistinguishable from missing.
    let result = ledger_service::debit(&db, school_b, account_id, 10, account_id, "spend").await;
    assert_eq!(result, Err(ServiceError::NotFound));

    let acc = account::Entity::find_by_id(account_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(acc.point_balance, 100);
}

#[tokio::test]
async fn stock_floor_is_enforced() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let item_id = create_test_item(&db, school_id, "Pencil", 10, Some(2)).await;

    let updated = ledger_service::adjust_stock(&db, school_id, item_id, -1, 1, "purchase")
        .await
        .expect("adjust failed");
    assert_eq!(updated.stock, Some(1));

    let result = ledger_service::adjust_stock(&db, school_id, item_id, -2, 1, "purchase").await;
    assert_eq!(result, Err(ServiceError::InsufficientStock));

    let updated = ledger_service::adjust_stock(&db, school_id, item_id, -1, 1, "purchase")
        .await
        .expect("adjust failed");
    assert_eq!(updated.stock, Some(0));

    let result = ledger_service::adjust_stock(&db, school_id, item_id, -1, 1, "purchase").await;
    assert_eq!(result, Err(ServiceError::InsufficientStock));

    let updated = ledger_service::adjust_stock(&db, school_id, item_id, 3, 1, "restock")
        .await
        .expect("adjust failed");
    assert_eq!(updated.stock, Some(3));
}

#[tokio::test]
async fn unlimited_stock_passes_through() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let item_id = create_test_item(&db, school_id, "Pass", 10, None).await;

    let updated = ledger_service::adjust_stock(&db, school_id, item_id, -5, 1, "purchase")
        .await
        .expect("adjust failed");
    assert_eq!(updated.stock, None);

    // Nothing changed, so nothing was audited.
    let stock_audits = ledger_audit::Entity::find()
        .filter(ledger_audit::Column::EntityType.eq("stock"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(stock_audits, 0);
}

#[tokio::test]
async fn badge_grant_is_idempotent() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let account_id = create_test_account(&db, school_id, "ada", 10).await;
    let badge_id = create_test_badge(&db, school_id, "First steps").await;

    let first = ledger_service::grant_badge_once(&db, school_id, account_id, badge_id, account_id)
        .await
        .expect("grant failed");
    assert_eq!(first, BadgeGrant::Granted);

    let second = ledger_service::grant_badge_once(&db, school_id, account_id, badge_id, account_id)
        .await
        .expect("grant failed");
    assert_eq!(second, BadgeGrant::AlreadyGranted);

    let rows = questledger::models::account_badge::Entity::find()
        .count(&db)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    // Only the fresh grant was audited.
    let badge_audits = ledger_audit::Entity::find()
        .filter(ledger_audit::Column::EntityType.eq("badge"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(badge_audits, 1);
}

#[tokio::test]
async fn every_balance_mutation_is_audited() {
    let db = setup_test_db().await;
    let school_id = create_test_school(&db, "alpha").await;
    let account_id = create_test_account(&db, school_id, "ada", 0).await;

    ledger_service::credit(
        &db,
        school_id,
        account_id,
        100,
        CreditKind::Earn,
        account_id,
        "quest reward",
    )
    .await
    .unwrap();
    ledger_service::debit(&db, school_id, account_id, 30, account_id, "purchase")
        .await
        .unwrap();

    let audits = ledger_audit::Entity::find()
        .filter(ledger_audit::Column::EntityType.eq("balance"))
        .order_by_asc(ledger_audit::Column::Id)
        .all(&db)
        .await
        .unwrap();

    assert_eq!(audits.len(), 2);
    assert_eq!(audits[0].delta, 100);
    assert_eq!(audits[0].before_value, 0);
    assert_eq!(audits[0].after_value, 100);
    assert_eq!(audits[0].reason, "quest reward");
    assert_eq!(audits[1].delta, -30);
    assert_eq!(audits[1].before_value, 100);
    assert_eq!(audits[1].after_value, 70);
}
