use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub school_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub points_award: i64,
    pub validation_type: String, // 'manual', 'auto'
    pub deadline: Option<String>,
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
    #[sea_orm(has_many = "super::quest_submission::Entity")]
    QuestSubmission,
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

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestDto {
    pub title: String,
    pub description: Option<String>,
    pub points_award: i64,
    pub validation_type: Option<String>,
    pub deadline: Option<String>,
    pub is_active: Option<bool>,
}
