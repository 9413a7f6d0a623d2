//! `SeaORM` entity for the supplemental `ingestion_streams` table that backs
//! the registry (C3, §6).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use crate::sea_orm_active_enums::StreamState;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ingestion_streams")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub contest_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub chain_id: i64,
    pub registrar_address: String,
    pub other_addresses: Json,
    pub start_block: i64,
    pub state: StreamState,
    pub active_rpc: Option<String>,
    pub error_streak: i32,
    pub lag_blocks: i64,
    pub next_poll_at: Option<DateTimeUtc>,
    pub metadata: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
