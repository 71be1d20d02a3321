use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub school_id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String, // 'student', 'teacher', 'admin'
    pub point_balance: i64,
    pub experience: i64,
    pub level: i32,
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
    #[sea_orm(has_many = "super::quest_submission::Entity")]
    QuestSubmission,
    #[sea_orm(has_many = "super::purchase::Entity")]
    Purchase,
    #[sea_orm(has_many = "super::account_badge::Entity")]
    AccountBadge,
}

impl Related<super::school::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::School.def()
    }
}

impl Related<super::quest_submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QuestSubmission.def()
    }
}

impl Related<super::purchase::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Purchase.def()
    }
}

impl Related<super::account_badge::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccountBadge.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountDto {
    pub username: String,
    pub password: String,
    pub role: Option<String>,
}
