//! `SeaORM` entity for the supplemental `audit_log` table backing the
//! control plane's append-only audit trail (C11, §3, §6).

use sea_orm::entity::prelude::*;
use serde_json::Value as Json;

use crate::sea_orm_active_enums::AuditAction;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub contest_id: String,
    pub chain_id: i64,
    pub action: AuditAction,
    pub actor: String,
    pub reason: Option<String>,
    pub occurred_at: DateTimeUtc,
    pub detail: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
