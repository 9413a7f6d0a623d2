//! Milestone processor (C9, §4.9).
//!
//! The ledger upsert follows the same "lock the row, decide the transition
//! in Rust, write it back" shape as [`crate::writer`]; the state machine in
//! §4.9 is small enough that encoding it in SQL would only hide it.
//!
//! Per the permissive-parser decision recorded in DESIGN.md, [`parse_payload`]
//! accepts both the flat field shape and a nested `sourceEvent` object; the
//! strict, flat-only parser from the original source is not implemented.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect,
    TransactionTrait,
};
use serde::Deserialize;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

use entity::{milestone_executions, sea_orm_active_enums::MilestoneStatus};

use crate::{
    errors::CoreError,
    metrics::MILESTONES_PROCESSED_TOTAL,
    model::MilestoneKind,
    queue::{self, PublishOptions, QUEUE_MILESTONE},
};

const DEFER_DELAY_SECONDS: i64 = 30;
const DEFAULT_MILESTONE_RETRY_LIMIT: i32 = 5;

#[derive(Debug, Clone, Deserialize)]
struct FlatFields {
    #[serde(alias = "contestId")]
    contest_id: Option<String>,
    #[serde(alias = "chainId")]
    chain_id: Option<u64>,
    milestone: Option<String>,
    #[serde(alias = "sourceTxHash")]
    source_tx_hash: Option<String>,
    #[serde(alias = "sourceLogIndex")]
    source_log_index: Option<u32>,
    #[serde(alias = "sourceBlockNumber")]
    source_block_number: Option<u64>,
    #[serde(default)]
    payload: Json,
    #[serde(alias = "sourceEvent")]
    source_event: Option<Box<FlatFields>>,
}

#[derive(Debug, Clone)]
pub struct MilestonePayload {
    pub contest_id: String,
    pub chain_id: u64,
    pub milestone: MilestoneKind,
    pub source_tx_hash: String,
    pub source_log_index: u32,
    pub source_block_number: u64,
    pub payload: Json,
}

/// Accepts both the flat shape and a nested `sourceEvent` object, preferring
/// top-level fields when both are present (§9 open question, permissive form).
pub fn parse_payload(raw: &Json) -> Result<MilestonePayload, CoreError> {
    let flat: FlatFields = serde_json::from_value(raw.clone())
        .map_err(|e| CoreError::input_invalid(format!("malformed milestone payload: {e}")))?;

    let nested = flat.source_event.as_deref();
    let field = |top: Option<&String>, nested: Option<&String>| -> Option<String> {
        top.cloned().or_else(|| nested.cloned())
    };

    let contest_id = field(flat.contest_id.as_ref(), nested.and_then(|n| n.contest_id.as_ref()))
        .ok_or_else(|| CoreError::input_invalid("missing contestId"))?;
    let chain_id = flat
        .chain_id
        .or_else(|| nested.and_then(|n| n.chain_id))
        .ok_or_else(|| CoreError::input_invalid("missing chainId"))?;
    let milestone_raw = field(flat.milestone.as_ref(), nested.and_then(|n| n.milestone.as_ref()))
        .ok_or_else(|| CoreError::input_invalid("missing milestone"))?;
    let milestone: MilestoneKind = milestone_raw
        .parse()
        .map_err(|_| CoreError::input_invalid(format!("unknown milestone kind: {milestone_raw}")))?;
    let source_tx_hash = field(
        flat.source_tx_hash.as_ref(),
        nested.and_then(|n| n.source_tx_hash.as_ref()),
    )
    .ok_or_else(|| CoreError::input_invalid("missing sourceTxHash"))?;
    let source_log_index = flat
        .source_log_index
        .or_else(|| nested.and_then(|n| n.source_log_index))
        .ok_or_else(|| CoreError::input_invalid("missing sourceLogIndex"))?;
    let source_block_number = flat
        .source_block_number
        .or_else(|| nested.and_then(|n| n.source_block_number))
        .ok_or_else(|| CoreError::input_invalid("missing sourceBlockNumber"))?;

    let payload = if flat.payload.is_null() {
        nested.map(|n| n.payload.clone()).unwrap_or(Json::Null)
    } else {
        flat.payload
    };

    Ok(MilestonePayload {
        contest_id,
        chain_id,
        milestone,
        source_tx_hash,
        source_log_index,
        source_block_number,
        payload,
    })
}

pub fn idempotency_key(payload: &MilestonePayload) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.contest_id.as_bytes());
    hasher.update(payload.chain_id.to_be_bytes());
    hasher.update(payload.milestone.as_str().as_bytes());
    hasher.update(payload.source_tx_hash.as_bytes());
    hasher.update(payload.source_log_index.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a contest's milestone processing is currently paused (§4.11).
#[async_trait]
pub trait ModeRegistry: Send + Sync {
    async fn is_paused(&self, contest_id: &str, chain_id: u64) -> bool;
}

/// The actual business side effect a milestone triggers. The spec treats
/// this as opaque beyond "runs inside the same transaction as the ledger
/// write" (§4.9 step 5).
#[async_trait]
pub trait MilestoneSideEffects: Send + Sync {
    async fn apply(
        &self,
        tx: &sea_orm::DatabaseTransaction,
        payload: &MilestonePayload,
    ) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneOutcome {
    Succeeded,
    Skipped,
    Deferred,
    Retrying,
    NeedsAttention,
}

fn allowed_transition(from: MilestoneStatus, to: MilestoneStatus) -> bool {
    use MilestoneStatus::*;
    matches!(
        (from, to),
        (Pending, Pending | InProgress | NeedsAttention)
            | (InProgress, InProgress | Succeeded | Retrying | NeedsAttention)
            | (Retrying, Retrying | InProgress | Succeeded | NeedsAttention)
            | (NeedsAttention, NeedsAttention | InProgress | Retrying)
            | (Succeeded, Succeeded)
    )
}

pub async fn process_milestone_job<C>(
    db: &C,
    mode_registry: &dyn ModeRegistry,
    side_effects: &dyn MilestoneSideEffects,
    raw_payload: Json,
) -> Result<MilestoneOutcome, CoreError>
where
    C: ConnectionTrait + TransactionTrait,
{
    let payload = parse_payload(&raw_payload)?;
    let key = idempotency_key(&payload);

    if mode_registry
        .is_paused(&payload.contest_id, payload.chain_id)
        .await
    {
        queue::dispatcher::publish(
            db,
            QUEUE_MILESTONE,
            raw_payload,
            PublishOptions {
                dedupe_key: Some(key),
                start_after: Some(Utc::now() + chrono::Duration::seconds(DEFER_DELAY_SECONDS)),
                ..Default::default()
            },
        )
        .await?;
        return Ok(MilestoneOutcome::Deferred);
    }

    let tx = db.begin().await?;

    let existing = milestone_executions::Entity::find()
        .filter(milestone_executions::Column::IdempotencyKey.eq(key.clone()))
        .lock_exclusive()
        .one(&tx)
        .await?;

    if let Some(row) = &existing {
        if row.status == MilestoneStatus::Succeeded {
            tx.commit().await?;
            MILESTONES_PROCESSED_TOTAL
                .with_label_values(&[payload.milestone.as_str(), "skipped"])
                .inc();
            return Ok(MilestoneOutcome::Skipped);
        }
    }

    let attempts = existing.as_ref().map(|r| r.attempts).unwrap_or(0);
    let current_status = existing
        .as_ref()
        .map(|r| r.status.clone())
        .unwrap_or(MilestoneStatus::Pending);
    let next_status = if attempts > 0 {
        MilestoneStatus::Retrying
    } else {
        MilestoneStatus::InProgress
    };

    if !allowed_transition(current_status, next_status.clone()) {
        tx.rollback().await?;
        return Err(CoreError::order_violation(format!(
            "illegal milestone transition {current_status:?} -> {next_status:?}"
        )));
    }

    upsert_ledger(
        &tx,
        existing.as_ref(),
        &payload,
        &key,
        next_status,
        attempts,
        None,
        None,
    )
    .await?;

    match side_effects.apply(&tx, &payload).await {
        Ok(()) => {
            finalize_ledger(&tx, &key, MilestoneStatus::Succeeded, attempts, None).await?;
            tx.commit().await?;
            MILESTONES_PROCESSED_TOTAL
                .with_label_values(&[payload.milestone.as_str(), "succeeded"])
                .inc();
            Ok(MilestoneOutcome::Succeeded)
        }
        Err(err) => {
            tx.rollback().await?;

            let next_attempts = attempts + 1;
            let terminal = if next_attempts < DEFAULT_MILESTONE_RETRY_LIMIT {
                MilestoneStatus::Retrying
            } else {
                MilestoneStatus::NeedsAttention
            };
            let detail = serde_json::json!({"message": err.message, "kind": format!("{:?}", err.kind)});

            // `tx` (and whatever row `upsert_ledger` wrote inside it, insert
            // or update) was just rolled back, so `existing` — read before
            // that write — is once again the true committed state. Upsert
            // against it rather than `finalize_ledger`'s find-then-update:
            // on a first delivery there is no committed row to find.
            let ledger_tx = db.begin().await?;
            upsert_ledger(
                &ledger_tx,
                existing.as_ref(),
                &payload,
                &key,
                terminal.clone(),
                next_attempts,
                None,
                Some(detail),
            )
            .await?;
            ledger_tx.commit().await?;

            let metric_label = if terminal == MilestoneStatus::NeedsAttention {
                "needs_attention"
            } else {
                "retrying"
            };
            MILESTONES_PROCESSED_TOTAL
                .with_label_values(&[payload.milestone.as_str(), metric_label])
                .inc();

            if terminal == MilestoneStatus::NeedsAttention {
                Ok(MilestoneOutcome::NeedsAttention)
            } else {
                Err(err)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upsert_ledger(
    tx: &sea_orm::DatabaseTransaction,
    existing: Option<&milestone_executions::Model>,
    payload: &MilestonePayload,
    key: &str,
    status: MilestoneStatus,
    attempts: i32,
    completed_at: Option<chrono::DateTime<Utc>>,
    last_error: Option<Json>,
) -> Result<(), CoreError> {
    let now = Utc::now();
    let model = milestone_executions::ActiveModel {
        id: existing
            .map(|m| ActiveValue::Unchanged(m.id))
            .unwrap_or(ActiveValue::NotSet),
        idempotency_key: ActiveValue::Set(key.to_string()),
        job_id: ActiveValue::Set(existing.and_then(|m| m.job_id)),
        contest_id: ActiveValue::Set(payload.contest_id.clone()),
        chain_id: ActiveValue::Set(payload.chain_id as i64),
        milestone: ActiveValue::Set(payload.milestone.as_str().to_string()),
        source_tx_hash: ActiveValue::Set(payload.source_tx_hash.clone()),
        source_log_index: ActiveValue::Set(payload.source_log_index as i32),
        source_block_number: ActiveValue::Set(payload.source_block_number as i64),
        status: ActiveValue::Set(status),
        attempts: ActiveValue::Set(attempts),
        payload: ActiveValue::Set(payload.payload.clone()),
        last_error: ActiveValue::Set(last_error),
        actor_context: ActiveValue::Set(existing.and_then(|m| m.actor_context.clone())),
        completed_at: ActiveValue::Set(completed_at),
        created_at: existing
            .map(|m| ActiveValue::Unchanged(m.created_at))
            .unwrap_or(ActiveValue::Set(now)),
        updated_at: ActiveValue::Set(now),
    };

    match existing {
        Some(_) => {
            milestone_executions::Entity::update(model).exec(tx).await?;
        }
        None => {
            milestone_executions::Entity::insert(model).exec(tx).await?;
        }
    }
    Ok(())
}

async fn finalize_ledger<C: ConnectionTrait>(
    db: &C,
    key: &str,
    status: MilestoneStatus,
    attempts: i32,
    last_error: Option<Json>,
) -> Result<(), CoreError> {
    let existing = milestone_executions::Entity::find()
        .filter(milestone_executions::Column::IdempotencyKey.eq(key))
        .one(db)
        .await?
        .ok_or_else(|| CoreError::internal("milestone ledger row vanished mid-transaction"))?;

    let completed_at = (status == MilestoneStatus::Succeeded).then(Utc::now);

    let model = milestone_executions::ActiveModel {
        id: ActiveValue::Unchanged(existing.id),
        status: ActiveValue::Set(status),
        attempts: ActiveValue::Set(attempts),
        last_error: ActiveValue::Set(last_error),
        completed_at: ActiveValue::Set(completed_at),
        updated_at: ActiveValue::Set(Utc::now()),
        ..Default::default()
    };
    milestone_executions::Entity::update(model).exec(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_payload() {
        let raw = serde_json::json!({
            "contestId": "c1",
            "chainId": 1,
            "milestone": "settled",
            "sourceTxHash": "0xabc",
            "sourceLogIndex": 2,
            "sourceBlockNumber": 100,
            "payload": {"amount": 5}
        });
        let parsed = parse_payload(&raw).unwrap();
        assert_eq!(parsed.contest_id, "c1");
        assert_eq!(parsed.milestone, MilestoneKind::Settled);
    }

    #[test]
    fn parses_nested_source_event_payload() {
        let raw = serde_json::json!({
            "milestone": "reward_ready",
            "sourceEvent": {
                "contestId": "c2",
                "chainId": 2,
                "sourceTxHash": "0xdef",
                "sourceLogIndex": 0,
                "sourceBlockNumber": 50
            }
        });
        let parsed = parse_payload(&raw).unwrap();
        assert_eq!(parsed.contest_id, "c2");
        assert_eq!(parsed.chain_id, 2);
        assert_eq!(parsed.milestone, MilestoneKind::RewardReady);
    }

    #[test]
    fn rejects_payload_missing_required_field() {
        let raw = serde_json::json!({"milestone": "settled"});
        assert!(parse_payload(&raw).is_err());
    }

    #[test]
    fn idempotency_key_is_stable_for_same_fields() {
        let payload = MilestonePayload {
            contest_id: "c1".into(),
            chain_id: 1,
            milestone: MilestoneKind::Settled,
            source_tx_hash: "0xabc".into(),
            source_log_index: 2,
            source_block_number: 100,
            payload: serde_json::json!({}),
        };
        let a = idempotency_key(&payload);
        let b = idempotency_key(&payload);
        assert_eq!(a, b);
    }

    #[test]
    fn state_machine_forbids_succeeded_to_in_progress() {
        assert!(!allowed_transition(
            MilestoneStatus::Succeeded,
            MilestoneStatus::InProgress
        ));
        assert!(allowed_transition(
            MilestoneStatus::Retrying,
            MilestoneStatus::Succeeded
        ));
    }
}
