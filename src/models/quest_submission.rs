use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quest_submissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub school_id: i32,
    pub quest_id: i32,
    pub account_id: i32,
    pub status: String, // 'pending', 'approved', 'rejected'
    pub comment: Option<String>,
    pub feedback: Option<String>,
    /// Points credited on approval, snapshot of the quest award at that instant.
    pub points_awarded: Option<i64>,
    pub submitted_at: String,
    pub decided_at: Option<String>,
    pub decided_by: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::quest::Entity",
        from = "Column::QuestId",
        to = "super::quest::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Quest,
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Account,
}

impl Related<super::quest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Quest.def()
    }
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
