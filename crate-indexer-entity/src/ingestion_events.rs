//! `SeaORM` entity for the `ingestion_events` table (§6).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use crate::sea_orm_active_enums::EventType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ingestion_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub contest_id: String,
    pub chain_id: i64,
    pub tx_hash: String,
    pub log_index: i32,
    pub block_number: i64,
    pub event_type: EventType,
    pub payload: Json,
    pub reorg_flag: bool,
    pub block_hash: String,
    pub occurred_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
