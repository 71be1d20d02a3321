//! Business logic without the HTTP layer. Each service is a set of free
//! async functions over a sea-orm connection, in dependency order:
//! quest and redemption workflows sit on top of the ledger primitives.

pub mod badge_service;
pub mod ledger_service;
pub mod quest_service;
pub mod redemption_service;

use sea_orm::DbErr;

/// Error type for service operations.
///
/// Business-rule failures are terminal for the request and surface to the
/// caller verbatim. `Unavailable` is the only retriable variant, and only
/// at the ledger boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    Database(String),
    Unavailable(String),
    NotFound,
    Forbidden,
    InsufficientFunds,
    InsufficientStock,
    ItemInactive,
    QuotaExceeded,
    DuplicateSubmission,
    InvalidTransition(String),
    Validation(String),
}

impl From<DbErr> for ServiceError {
    fn from(e: DbErr) -> Self {
        match e {
            DbErr::Conn(err) => ServiceError::Unavailable(err.to_string()),
            DbErr::ConnectionAcquire(err) => ServiceError::Unavailable(err.to_string()),
            other => ServiceError::Database(other.to_string()),
        }
    }
}

/// Caller identity and tenant scope, extracted from the JWT at the API
/// boundary. Every query below is keyed by `school_id`; an id that exists
/// under another school is indistinguishable from one that does not exist.
#[derive(Debug, Clone, Copy)]
pub struct Scope {
    pub school_id: i32,
    pub account_id: i32,
    pub staff: bool,
}
