use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub school_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub kind: String, // 'product' (marketplace), 'reward' (catalog)
    pub price_points: i64,
    /// NULL means unlimited supply.
    pub stock: Option<i32>,
    pub max_per_account: Option<i32>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::school::Entity",
        from = "Column::SchoolId",
        to = "super::school::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    School,
    #[sea_orm(has_many = "super::purchase::Entity")]
    Purchase,
}

impl Related<super::school::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::School.def()
    }
}

impl Related<super::purchase::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Purchase.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemDto {
    pub name: String,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub price_points: i64,
    pub stock: Option<i32>,
    pub max_per_account: Option<i32>,
    pub is_active: Option<bool>,
}
