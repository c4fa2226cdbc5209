use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "film")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name_primary: String,
    pub name_secondary: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub year: i32,
    #[sea_orm(column_type = "Double")]
    pub rating: f64,
    pub assessments: i32,
    pub reviews: i32,
    pub age_limit: i32,
    pub duration: String,
    pub image: Option<String>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::trailer::Entity")]
    Trailer,
}

impl Related<super::trailer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trailer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
