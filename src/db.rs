use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub conn: DatabaseConnection,
    pub config: Config,
}

impl AppState {
    pub fn new(conn: DatabaseConnection, config: Config) -> Self {
        Self { conn, config }
    }
}

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    // Run migrations manually (simple SQL)
    run_migrations(&db).await?;

    Ok(db)
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Create schools table (tenant root)
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS schools (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            subdomain TEXT NOT NULL UNIQUE,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Create accounts table.
    // point_balance, experience and level are only ever written by the
    // ledger service; both counters must stay non-negative.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'student',
            point_balance INTEGER NOT NULL DEFAULT 0 CHECK (point_balance >= 0),
            experience INTEGER NOT NULL DEFAULT 0 CHECK (experience >= 0),
            level INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (school_id, username),
            FOREIGN KEY (school_id) REFERENCES schools(id) ON DELETE CASCADE
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Create quests table
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS quests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            points_award INTEGER NOT NULL CHECK (points_award > 0),
            validation_type TEXT NOT NULL DEFAULT 'manual',
            deadline TEXT,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (school_id) REFERENCES schools(id) ON DELETE CASCADE
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Create quest_submissions table
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS quest_submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            quest_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            comment TEXT,
            feedback TEXT,
            points_awarded INTEGER,
            submitted_at TEXT NOT NULL,
            decided_at TEXT,
            decided_by INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (quest_id) REFERENCES quests(id) ON DELETE CASCADE,
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        )
        "#
        .to_owned(),
    ))
    .await?;

    // At most one live (non-rejected) submission per account and quest.
    // Rejected rows stay out of the index so a resubmission can be
    // allowed by policy without rewriting history.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_submissions_one_live
        ON quest_submissions(account_id, quest_id)
        WHERE status != 'rejected'
        "#
        .to_owned(),
    ))
    .await?;

    // Create items table (marketplace products and reward catalog)
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            kind TEXT NOT NULL DEFAULT 'product',
            price_points INTEGER NOT NULL CHECK (price_points > 0),
            stock INTEGER CHECK (stock IS NULL OR stock >= 0),
            max_per_account INTEGER,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (school_id) REFERENCES schools(id) ON DELETE CASCADE
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Create purchases table
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS purchases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            reference TEXT NOT NULL UNIQUE,
            item_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            points_spent INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending_claim',
            claimed_at TEXT,
            claimed_by INTEGER,
            cancelled_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE,
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Create badges table
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS badges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            icon TEXT,
            required_level INTEGER,
            required_quests INTEGER,
            required_points INTEGER,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (school_id) REFERENCES schools(id) ON DELETE CASCADE
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Create account_badges table.
    // The UNIQUE pair is the concurrency control for badge grants: the
    // store rejects the second insert, evaluators never take locks.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS account_badges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            badge_id INTEGER NOT NULL,
            earned_at TEXT NOT NULL,
            UNIQUE (account_id, badge_id),
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE,
            FOREIGN KEY (badge_id) REFERENCES badges(id) ON DELETE CASCADE
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Create ledger_audit table (append-only)
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS ledger_audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            actor INTEGER NOT NULL,
            delta INTEGER NOT NULL,
            before_value INTEGER NOT NULL,
            after_value INTEGER NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#
        .to_owned(),
    ))
    .await?;

    // Migration: claimed_by on purchases arrived after the first release.
    // Adding a column that already exists fails, so we ignore the error
    // (simple migration strategy).
    let _ = db
        .execute(Statement::from_string(
            db.get_database_backend(),
            "ALTER TABLE purchases ADD COLUMN claimed_by INTEGER".to_owned(),
        ))
        .await;

    // Migration: per-badge icon asset path
    let _ = db
        .execute(Statement::from_string(
            db.get_database_backend(),
            "ALTER TABLE badges ADD COLUMN icon TEXT".to_owned(),
        ))
        .await;

    Ok(())
}
