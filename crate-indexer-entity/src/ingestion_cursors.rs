//! `SeaORM` entity for the `ingestion_cursors` table (§6).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ingestion_cursors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub contest_id: String,
    pub chain_id: i64,
    pub contract_address: String,
    pub cursor_height: i64,
    pub cursor_log_index: i32,
    pub cursor_hash: Option<String>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
