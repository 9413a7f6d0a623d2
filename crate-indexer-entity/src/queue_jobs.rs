//! `SeaORM` entity for the supplemental `queue_jobs` table backing the
//! durable queue (C8, §6).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use crate::sea_orm_active_enums::QueueJobState;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "queue_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub queue_name: String,
    pub payload: Json,
    pub attempt: i32,
    pub retry_limit: i32,
    pub enqueued_at: DateTimeUtc,
    pub available_at: DateTimeUtc,
    pub singleton_key: Option<String>,
    pub dedupe_key: Option<String>,
    pub priority: i32,
    pub state: QueueJobState,
    pub last_error: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
