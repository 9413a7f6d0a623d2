//! Ingestion writer (C5, §4.5).
//!
//! Grounded on `interchain-indexer-logic/src/database.rs` and
//! `message_buffer/persistence.rs`'s transactional upsert idiom: an explicit
//! `DatabaseTransaction` is threaded through every step, the cursor row is
//! locked with `lock_exclusive()` (the teacher's raw-SQL `GREATEST`/`LEAST`
//! trick doesn't compose with the spec's "noop on regression" rule cleanly,
//! so the conditional advance is done in Rust after locking the row —
//! single-writer-per-stream per §5 makes this race-free) and per-row
//! duplicate-key inserts use `OnConflict::do_nothing()`.

use chrono::Utc;
use sea_orm::{
    ActiveValue, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect,
    TransactionTrait, sea_query::OnConflict,
};

use entity::{ingestion_cursors, ingestion_events, sea_orm_active_enums::EventType};

use crate::{
    errors::CoreError,
    model::{EventCursor, EventEnvelope, EventKind, StreamId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied {
        cursor_height: u64,
        cursor_log_index: u32,
    },
    Noop {
        cursor_height: u64,
        cursor_log_index: u32,
    },
}

/// Writes a batch of events and (optionally) advances the stream cursor
/// inside one transaction (§4.5 invariant C).
///
/// `advance_cursor = false` is how C7's replay engine reuses this writer
/// without perturbing the live cursor.
pub async fn write_batch<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    stream: &StreamId,
    contract_address: &str,
    events: &[EventEnvelope],
    advance_cursor: bool,
) -> Result<WriteOutcome, CoreError> {
    let tx = db.begin().await?;

    for event in events {
        insert_event_noop_on_conflict(&tx, stream, event).await?;
    }

    let current = ingestion_cursors::Entity::find()
        .filter(ingestion_cursors::Column::ContestId.eq(stream.contest_id.clone()))
        .filter(ingestion_cursors::Column::ChainId.eq(stream.chain_id as i64))
        .lock_exclusive()
        .one(&tx)
        .await?;

    let current_cursor = current
        .as_ref()
        .map(|m| EventCursor::new(m.cursor_height as u64, m.cursor_log_index as u32))
        .unwrap_or(EventCursor::GENESIS);

    let Some(last_cursor) = events.last().map(|e| e.cursor()) else {
        tx.commit().await?;
        return Ok(WriteOutcome::Noop {
            cursor_height: current_cursor.block_number,
            cursor_log_index: current_cursor.log_index,
        });
    };

    if !advance_cursor {
        tx.commit().await?;
        return Ok(WriteOutcome::Noop {
            cursor_height: current_cursor.block_number,
            cursor_log_index: current_cursor.log_index,
        });
    }

    if last_cursor <= current_cursor {
        if last_cursor.block_number == current_cursor.block_number
            && last_cursor.log_index < current_cursor.log_index
        {
            tracing::info!(
                stream = %stream,
                stored = %current_cursor,
                incoming = %last_cursor,
                "cursor ordering violation on replay, treated as noop"
            );
        }
        tx.commit().await?;
        return Ok(WriteOutcome::Noop {
            cursor_height: current_cursor.block_number,
            cursor_log_index: current_cursor.log_index,
        });
    }

    let model = ingestion_cursors::ActiveModel {
        id: current.as_ref().map(|m| ActiveValue::Unchanged(m.id)).unwrap_or(ActiveValue::NotSet),
        contest_id: ActiveValue::Set(stream.contest_id.clone()),
        chain_id: ActiveValue::Set(stream.chain_id as i64),
        contract_address: ActiveValue::Set(contract_address.to_string()),
        cursor_height: ActiveValue::Set(last_cursor.block_number as i64),
        cursor_log_index: ActiveValue::Set(last_cursor.log_index as i32),
        cursor_hash: ActiveValue::Set(events.last().map(|e| e.derived_at.block_hash.clone())),
        updated_at: ActiveValue::Set(Utc::now()),
    };

    match current {
        Some(_) => {
            ingestion_cursors::Entity::update(model).exec(&tx).await?;
        }
        None => {
            ingestion_cursors::Entity::insert(model).exec(&tx).await?;
        }
    }

    tx.commit().await?;

    Ok(WriteOutcome::Applied {
        cursor_height: last_cursor.block_number,
        cursor_log_index: last_cursor.log_index,
    })
}

async fn insert_event_noop_on_conflict<C: ConnectionTrait>(
    tx: &C,
    stream: &StreamId,
    event: &EventEnvelope,
) -> Result<(), CoreError> {
    let model = ingestion_events::ActiveModel {
        id: ActiveValue::NotSet,
        contest_id: ActiveValue::Set(stream.contest_id.clone()),
        chain_id: ActiveValue::Set(stream.chain_id as i64),
        tx_hash: ActiveValue::Set(event.tx_hash.clone()),
        log_index: ActiveValue::Set(event.log_index as i32),
        block_number: ActiveValue::Set(event.block_number as i64),
        event_type: ActiveValue::Set(event_type_to_entity(event.kind)),
        payload: ActiveValue::Set(event.payload.clone()),
        reorg_flag: ActiveValue::Set(event.reorg_flag),
        block_hash: ActiveValue::Set(event.derived_at.block_hash.clone()),
        occurred_at: ActiveValue::Set(event.derived_at.timestamp),
    };

    let result = ingestion_events::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([
                ingestion_events::Column::ChainId,
                ingestion_events::Column::TxHash,
                ingestion_events::Column::LogIndex,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec(tx)
        .await;

    match result {
        Ok(_) | Err(DbErr::RecordNotInserted) => Ok(()),
        Err(err) => Err(CoreError::from(err)),
    }
}

fn event_type_to_entity(kind: EventKind) -> EventType {
    match kind {
        EventKind::Registration => EventType::Registration,
        EventKind::Rebalance => EventType::Rebalance,
        EventKind::Settlement => EventType::Settlement,
        EventKind::Reward => EventType::Reward,
        EventKind::Redemption => EventType::Redemption,
        EventKind::Deployment => EventType::Deployment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DerivedAt;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn sample_event(block: u64, log_index: u32) -> EventEnvelope {
        EventEnvelope {
            kind: EventKind::Settlement,
            chain_id: 1,
            block_number: block,
            log_index,
            tx_hash: format!("0x{block:x}{log_index:x}"),
            payload: serde_json::json!({}),
            reorg_flag: false,
            derived_at: DerivedAt {
                block_number: block,
                block_hash: "0xblock".into(),
                timestamp: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn empty_batch_is_noop_without_touching_cursor() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results::<ingestion_cursors::Model, _, _>([vec![]])
            .into_connection();

        let stream = StreamId::new("contest-1", 1);
        let outcome = write_batch(&db, &stream, "0xabc", &[], true).await.unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Noop {
                cursor_height: 0,
                cursor_log_index: 0,
            }
        );
    }

    #[test]
    fn event_type_mapping_is_total() {
        for kind in [
            EventKind::Registration,
            EventKind::Rebalance,
            EventKind::Settlement,
            EventKind::Reward,
            EventKind::Redemption,
            EventKind::Deployment,
        ] {
            let _ = event_type_to_entity(kind);
        }
    }

    #[test]
    fn sample_event_cursor_matches_block_and_log_index() {
        let event = sample_event(10, 2);
        assert_eq!(event.cursor(), EventCursor::new(10, 2));
    }
}
