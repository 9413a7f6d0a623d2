//! Replay engine (C7, §4.7).
//!
//! Pulls a bounded block range through the same [`crate::gateway`] the live
//! loop uses, writes it through [`crate::writer`] with `advance_cursor =
//! false`, then hands the replayed events plus the persisted baseline to
//! [`crate::reconciliation`] via a single enqueued job — per the resolved
//! open question, the baseline is read from `ingestion_events` history, not
//! re-queried from the chain.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait};

use entity::ingestion_events;

use crate::{
    control_plane::ReplayRunner,
    errors::CoreError,
    gateway::{ChainGateway, PullRequest},
    model::{DerivedAt, EventCursor, EventEnvelope, EventKind, StreamId},
    queue::{self, PublishOptions, QUEUE_RECONCILE},
    registry::IngestionRegistry,
};

pub struct ReplayEngine<C> {
    db: Arc<C>,
    gateway: Arc<ChainGateway>,
    registry: Arc<IngestionRegistry>,
}

impl<C: ConnectionTrait + TransactionTrait> ReplayEngine<C> {
    pub fn new(db: Arc<C>, gateway: Arc<ChainGateway>, registry: Arc<IngestionRegistry>) -> Self {
        Self {
            db,
            gateway,
            registry,
        }
    }

    async fn pull_range(
        &self,
        stream: &StreamId,
        contract_address: alloy::primitives::Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventEnvelope>, CoreError> {
        let mut cursor = EventCursor::new(from_block.saturating_sub(1), u32::MAX);
        let mut events = Vec::new();

        loop {
            let result = self
                .gateway
                .pull_events(PullRequest {
                    chain_id: stream.chain_id,
                    contract_address,
                    cursor,
                    limit: 500,
                    to_block: Some(to_block),
                })
                .await
                .map_err(CoreError::from)?;

            if result.events.is_empty() {
                break;
            }

            cursor = result.next_cursor;
            let reached_bound = result.latest_block >= to_block || cursor.block_number >= to_block;
            events.extend(result.events);
            if reached_bound {
                break;
            }
        }

        Ok(events)
    }

    async fn load_baseline(
        &self,
        stream: &StreamId,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventEnvelope>, CoreError> {
        let rows = ingestion_events::Entity::find()
            .filter(ingestion_events::Column::ContestId.eq(stream.contest_id.clone()))
            .filter(ingestion_events::Column::ChainId.eq(stream.chain_id as i64))
            .filter(ingestion_events::Column::BlockNumber.gte(from_block as i64))
            .filter(ingestion_events::Column::BlockNumber.lte(to_block as i64))
            .all(self.db.as_ref())
            .await?;

        Ok(rows.into_iter().map(model_to_envelope).collect())
    }
}

fn model_to_envelope(model: ingestion_events::Model) -> EventEnvelope {
    EventEnvelope {
        kind: entity_event_type_to_kind(model.event_type),
        chain_id: model.chain_id as u64,
        block_number: model.block_number as u64,
        log_index: model.log_index as u32,
        tx_hash: model.tx_hash,
        payload: model.payload,
        reorg_flag: model.reorg_flag,
        derived_at: DerivedAt {
            block_number: model.block_number as u64,
            block_hash: model.block_hash,
            timestamp: model.occurred_at,
        },
    }
}

fn entity_event_type_to_kind(kind: entity::sea_orm_active_enums::EventType) -> EventKind {
    use entity::sea_orm_active_enums::EventType;
    match kind {
        EventType::Registration => EventKind::Registration,
        EventType::Rebalance => EventKind::Rebalance,
        EventType::Settlement => EventKind::Settlement,
        EventType::Reward => EventKind::Reward,
        EventType::Redemption => EventKind::Redemption,
        EventType::Deployment => EventKind::Deployment,
    }
}

#[async_trait::async_trait]
impl<C: ConnectionTrait + TransactionTrait + Send + Sync> ReplayRunner for ReplayEngine<C> {
    async fn run(
        &self,
        stream: &StreamId,
        from_block: u64,
        to_block: u64,
        reason: &str,
        actor: &str,
    ) -> Result<i64, CoreError> {
        let stream_config = self
            .registry
            .get(stream)
            .ok_or_else(|| CoreError::not_found(format!("unknown stream {stream}")))?;

        let contract_address: alloy::primitives::Address = stream_config
            .contract_address
            .parse()
            .map_err(|e| CoreError::internal(format!("invalid contract address on record: {e}")))?;

        let replayed = self
            .pull_range(stream, contract_address, from_block, to_block)
            .await?;

        // Baseline must be read before the replayed batch is written: once
        // `write_batch` inserts the replayed events into `ingestion_events`,
        // every one of them would show up in "previously persisted" too,
        // and `missing_event` discrepancies could never be detected.
        let baseline = self.load_baseline(stream, from_block, to_block).await?;

        crate::writer::write_batch(
            self.db.as_ref(),
            stream,
            &stream_config.contract_address,
            &replayed,
            false,
        )
        .await?;

        let report_id = format!(
            "replay:{}:{}:{}:{}:{}",
            stream.contest_id,
            stream.chain_id,
            from_block,
            to_block,
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );

        let payload = serde_json::json!({
            "reportId": report_id,
            "contestId": stream.contest_id,
            "chainId": stream.chain_id,
            "fromBlock": from_block,
            "toBlock": to_block,
            "reason": reason,
            "actor": actor,
            "replayed": replayed,
            "baseline": baseline,
        });

        let outcome = queue::dispatcher::publish(
            self.db.as_ref(),
            QUEUE_RECONCILE,
            payload,
            PublishOptions {
                dedupe_key: Some(report_id),
                ..Default::default()
            },
        )
        .await?;

        Ok(match outcome {
            queue::PublishOutcome::Enqueued { job_id }
            | queue::PublishOutcome::Deduplicated { job_id }
            | queue::PublishOutcome::SingletonDeferred { job_id } => job_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_to_envelope_roundtrips_fields() {
        let model = ingestion_events::Model {
            id: 1,
            contest_id: "c1".into(),
            chain_id: 1,
            tx_hash: "0xabc".into(),
            log_index: 2,
            block_number: 10,
            event_type: entity::sea_orm_active_enums::EventType::Settlement,
            payload: serde_json::json!({}),
            reorg_flag: false,
            block_hash: "0xblock".into(),
            occurred_at: Utc::now(),
        };
        let envelope = model_to_envelope(model);
        assert_eq!(envelope.cursor(), EventCursor::new(10, 2));
        assert_eq!(envelope.kind, EventKind::Settlement);
    }
}
