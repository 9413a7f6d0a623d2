//! Persisted per-stream status (C3/C12, §6 `ingestion_streams` table).
//!
//! The live loop upserts one row per stream after every tick so `/v1/indexer/status`
//! can answer without holding a reference into the running `tokio::task`s;
//! the upsert follows the same "load then write back inside one statement"
//! idiom as [`crate::writer`], without the lock-for-update since a single
//! owning task writes its own stream's row (§5).

use chrono::Utc;
use sea_orm::{ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde_json::Value as Json;

use entity::{ingestion_streams, sea_orm_active_enums::StreamState};

use crate::{errors::CoreError, model::StreamId};

#[allow(clippy::too_many_arguments)]
pub async fn upsert<C: ConnectionTrait>(
    db: &C,
    stream: &StreamId,
    registrar_address: &str,
    start_block: u64,
    state: StreamState,
    active_rpc: Option<String>,
    error_streak: i32,
    lag_blocks: u64,
) -> Result<(), CoreError> {
    let existing = ingestion_streams::Entity::find()
        .filter(ingestion_streams::Column::ContestId.eq(stream.contest_id.clone()))
        .filter(ingestion_streams::Column::ChainId.eq(stream.chain_id as i64))
        .one(db)
        .await?;

    let now = Utc::now();
    let model = ingestion_streams::ActiveModel {
        contest_id: ActiveValue::Set(stream.contest_id.clone()),
        chain_id: ActiveValue::Set(stream.chain_id as i64),
        registrar_address: ActiveValue::Set(registrar_address.to_string()),
        other_addresses: existing
            .as_ref()
            .map(|m| ActiveValue::Unchanged(m.other_addresses.clone()))
            .unwrap_or(ActiveValue::Set(Json::Array(vec![]))),
        start_block: ActiveValue::Set(start_block as i64),
        state: ActiveValue::Set(state),
        active_rpc: ActiveValue::Set(active_rpc),
        error_streak: ActiveValue::Set(error_streak),
        lag_blocks: ActiveValue::Set(lag_blocks as i64),
        next_poll_at: ActiveValue::Set(None),
        metadata: existing
            .as_ref()
            .map(|m| ActiveValue::Unchanged(m.metadata.clone()))
            .unwrap_or(ActiveValue::Set(Json::Object(Default::default()))),
        created_at: existing
            .as_ref()
            .map(|m| ActiveValue::Unchanged(m.created_at))
            .unwrap_or(ActiveValue::Set(now)),
        updated_at: ActiveValue::Set(now),
    };

    match existing {
        Some(_) => {
            ingestion_streams::Entity::update(model).exec(db).await?;
        }
        None => {
            ingestion_streams::Entity::insert(model).exec(db).await?;
        }
    }
    Ok(())
}

pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<ingestion_streams::Model>, CoreError> {
    Ok(ingestion_streams::Entity::find().all(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn upsert_inserts_when_no_row_exists() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results::<ingestion_streams::Model, _, _>([vec![]])
            .append_exec_results([sea_orm::MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let stream = StreamId::new("contest-1", 1);
        upsert(&db, &stream, "0xabc", 100, StreamState::Live, Some("p1".into()), 0, 5)
            .await
            .unwrap();
    }
}
