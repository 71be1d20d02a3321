use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only trail of every balance, stock and badge mutation.
/// Rows are written in the same transaction as the mutation they record
/// and are never updated or deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_audit")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub school_id: i32,
    pub entity_type: String, // 'balance', 'stock', 'badge'
    pub entity_id: i32,
    /// Account that triggered the mutation, 0 for system actions.
    pub actor: i32,
    pub delta: i64,
    pub before_value: i64,
    pub after_value: i64,
    pub reason: String,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
