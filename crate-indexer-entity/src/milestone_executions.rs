//! `SeaORM` entity for the `milestone_executions` table (§6, §4.9).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use crate::sea_orm_active_enums::MilestoneStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "milestone_executions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    #[sea_orm(unique)]
    pub idempotency_key: String,
    pub job_id: Option<i64>,
    pub contest_id: String,
    pub chain_id: i64,
    pub milestone: String,
    pub source_tx_hash: String,
    pub source_log_index: i32,
    pub source_block_number: i64,
    pub status: MilestoneStatus,
    pub attempts: i32,
    pub payload: Json,
    pub last_error: Option<Json>,
    pub actor_context: Option<Json>,
    pub completed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
