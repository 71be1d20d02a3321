use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "badges")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub school_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub required_level: Option<i32>,
    pub required_quests: Option<i32>,
    /// Threshold on lifetime earned points (experience), so spending never
    /// un-satisfies a badge an account already qualified for.
    pub required_points: Option<i64>,
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
    #[sea_orm(has_many = "super::account_badge::Entity")]
    AccountBadge,
}

impl Related<super::school::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::School.def()
    }
}

impl Related<super::account_badge::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccountBadge.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Serialize, Deserialize)]
pub struct BadgeDto {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub required_level: Option<i32>,
    pub required_quests: Option<i32>,
    pub required_points: Option<i64>,
    pub is_active: Option<bool>,
}
