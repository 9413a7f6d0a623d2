//! `SeaORM` entity for the `reconciliation_report_ledgers` table (§6, §4.10).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use crate::sea_orm_active_enums::ReportStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "reconciliation_report_ledgers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    #[sea_orm(unique)]
    pub idempotency_key: String,
    #[sea_orm(unique)]
    pub report_id: String,
    #[sea_orm(unique)]
    pub job_id: Option<i64>,
    pub contest_id: String,
    pub chain_id: i64,
    pub range_from_block: i64,
    pub range_to_block: i64,
    pub generated_at: DateTimeUtc,
    pub status: ReportStatus,
    pub attempts: i32,
    pub differences: Json,
    pub notifications: Json,
    pub payload: Json,
    pub actor_context: Option<Json>,
    pub last_error: Option<Json>,
    pub completed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
