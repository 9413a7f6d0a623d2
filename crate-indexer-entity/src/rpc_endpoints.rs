//! `SeaORM` entity for the supplemental `rpc_endpoints` table that backs the
//! persisted RPC configuration read at startup (C2, §6).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "rpc_endpoints")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub chain_id: i64,
    pub endpoint_id: String,
    pub url: String,
    pub priority: i32,
    pub enabled: bool,
    pub fail_count: i32,
    pub last_success_at: Option<DateTimeUtc>,
    pub cooldown_until: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
