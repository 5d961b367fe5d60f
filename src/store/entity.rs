//! The `values` table: one row per accepted submission.
use sea_orm::entity::prelude::*;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "values")]
pub struct Model {
    /// Surrogate key. The log itself is keyed by nothing; duplicates of `number` are expected.
    #[sea_orm(primary_key)]
    #[serde(skip)]
    pub id:     i32,
    pub number: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
