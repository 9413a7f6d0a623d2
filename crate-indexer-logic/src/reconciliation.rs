//! Reconciliation processor (C10, §4.10).
//!
//! Mirrors [`crate::milestone`]'s ledger-upsert-then-transition shape, with
//! discrepancy detection computed in-process from the two event sets rather
//! than in SQL — the symmetric difference is small (bounded by a replay
//! block range) and easier to reason about as plain Rust.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use entity::{reconciliation_report_ledgers, sea_orm_active_enums::ReportStatus};

use crate::{
    errors::CoreError, metrics::RECONCILIATION_DISCREPANCIES_TOTAL, model::EventEnvelope,
};

#[derive(Debug, Clone)]
pub struct ReconciliationJob {
    pub report_id: String,
    pub job_id: Option<i64>,
    pub contest_id: String,
    pub chain_id: u64,
    pub from_block: u64,
    pub to_block: u64,
    pub replayed: Vec<EventEnvelope>,
    pub baseline: Option<Vec<EventEnvelope>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscrepancyKind {
    MissingEvent,
    PayloadMismatch,
}

#[derive(Debug, Clone)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub tx_hash: String,
    pub log_index: u32,
}

/// A single notification dispatch target. The spec keeps the actual
/// channel fan-out (email/webhook/Slack) external; this crate ships one
/// logging/metrics-only implementation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, report_id: &str, discrepancies: &[Discrepancy]);
}

pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, report_id: &str, discrepancies: &[Discrepancy]) {
        for d in discrepancies {
            tracing::warn!(
                report_id,
                kind = ?d.kind,
                tx_hash = %d.tx_hash,
                log_index = d.log_index,
                "reconciliation discrepancy"
            );
        }
    }
}

pub fn idempotency_key(job: &ReconciliationJob) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job.report_id.as_bytes());
    hasher.update(job.contest_id.as_bytes());
    hasher.update(job.chain_id.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Symmetric difference over (txHash,logIndex,payload) between the replayed
/// events and the persisted baseline (§4.10 step 4).
pub fn compute_discrepancies(replayed: &[EventEnvelope], baseline: &[EventEnvelope]) -> Vec<Discrepancy> {
    let baseline_by_key: HashMap<(String, u32), &EventEnvelope> = baseline
        .iter()
        .map(|e| ((e.tx_hash.clone(), e.log_index), e))
        .collect();
    let replayed_by_key: HashMap<(String, u32), &EventEnvelope> = replayed
        .iter()
        .map(|e| ((e.tx_hash.clone(), e.log_index), e))
        .collect();

    let mut discrepancies = Vec::new();

    for (key, event) in &replayed_by_key {
        match baseline_by_key.get(key) {
            None => discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::MissingEvent,
                tx_hash: key.0.clone(),
                log_index: key.1,
            }),
            Some(baseline_event) if baseline_event.payload != event.payload => {
                discrepancies.push(Discrepancy {
                    kind: DiscrepancyKind::PayloadMismatch,
                    tx_hash: key.0.clone(),
                    log_index: key.1,
                })
            }
            Some(_) => {}
        }
    }

    for key in baseline_by_key.keys() {
        if !replayed_by_key.contains_key(key) {
            discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::MissingEvent,
                tx_hash: key.0.clone(),
                log_index: key.1,
            });
        }
    }

    discrepancies
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Resolved,
    NeedsAttention,
    Skipped,
}

pub async fn process_reconciliation_job<C: ConnectionTrait>(
    db: &C,
    job: ReconciliationJob,
    sink: &dyn NotificationSink,
) -> Result<ReconciliationOutcome, CoreError> {
    let key = idempotency_key(&job);

    let existing = reconciliation_report_ledgers::Entity::find()
        .filter(reconciliation_report_ledgers::Column::IdempotencyKey.eq(key.clone()))
        .lock_exclusive()
        .one(db)
        .await?;

    // A non-terminal ledger means a prior delivery of this same report is
    // still being worked; a re-delivery must not clobber it mid-flight.
    if let Some(row) = &existing {
        if matches!(row.status, ReportStatus::PendingReview | ReportStatus::InReview) {
            return Ok(ReconciliationOutcome::Skipped);
        }
    }

    let discrepancies = match &job.baseline {
        None => Vec::new(),
        Some(baseline) => compute_discrepancies(&job.replayed, baseline),
    };

    if !discrepancies.is_empty() {
        RECONCILIATION_DISCREPANCIES_TOTAL
            .with_label_values(&["total"])
            .inc_by(discrepancies.len() as u64);
        sink.notify(&job.report_id, &discrepancies).await;
    }

    let status = if discrepancies.is_empty() {
        ReportStatus::Resolved
    } else {
        ReportStatus::NeedsAttention
    };

    let differences: Vec<Json> = discrepancies
        .iter()
        .map(|d| {
            serde_json::json!({
                "kind": format!("{:?}", d.kind),
                "txHash": d.tx_hash,
                "logIndex": d.log_index,
            })
        })
        .collect();

    let now = Utc::now();
    let completed_at = (status == ReportStatus::Resolved).then_some(now);

    let model = reconciliation_report_ledgers::ActiveModel {
        id: existing
            .as_ref()
            .map(|m| ActiveValue::Unchanged(m.id))
            .unwrap_or(ActiveValue::NotSet),
        idempotency_key: ActiveValue::Set(key),
        report_id: ActiveValue::Set(job.report_id.clone()),
        job_id: ActiveValue::Set(job.job_id),
        contest_id: ActiveValue::Set(job.contest_id.clone()),
        chain_id: ActiveValue::Set(job.chain_id as i64),
        range_from_block: ActiveValue::Set(job.from_block as i64),
        range_to_block: ActiveValue::Set(job.to_block as i64),
        generated_at: existing
            .as_ref()
            .map(|m| ActiveValue::Unchanged(m.generated_at))
            .unwrap_or(ActiveValue::Set(now)),
        status: ActiveValue::Set(status),
        attempts: ActiveValue::Set(existing.as_ref().map(|m| m.attempts + 1).unwrap_or(1)),
        differences: ActiveValue::Set(Json::Array(differences)),
        notifications: ActiveValue::Set(serde_json::json!({"dispatched": discrepancies.len()})),
        payload: ActiveValue::Set(existing.as_ref().map(|m| m.payload.clone()).unwrap_or(Json::Null)),
        actor_context: ActiveValue::Set(existing.as_ref().and_then(|m| m.actor_context.clone())),
        last_error: ActiveValue::Set(None),
        completed_at: ActiveValue::Set(completed_at),
        created_at: existing
            .as_ref()
            .map(|m| ActiveValue::Unchanged(m.created_at))
            .unwrap_or(ActiveValue::Set(now)),
        updated_at: ActiveValue::Set(now),
    };

    match existing {
        Some(_) => {
            reconciliation_report_ledgers::Entity::update(model).exec(db).await?;
        }
        None => {
            reconciliation_report_ledgers::Entity::insert(model).exec(db).await?;
        }
    }

    Ok(if status == ReportStatus::Resolved {
        ReconciliationOutcome::Resolved
    } else {
        ReconciliationOutcome::NeedsAttention
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DerivedAt, EventKind};

    fn envelope(tx: &str, log_index: u32, payload: Json) -> EventEnvelope {
        EventEnvelope {
            kind: EventKind::Settlement,
            chain_id: 1,
            block_number: 10,
            log_index,
            tx_hash: tx.into(),
            payload,
            reorg_flag: false,
            derived_at: DerivedAt {
                block_number: 10,
                block_hash: "0xblock".into(),
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn no_baseline_difference_yields_empty_discrepancies() {
        let a = envelope("0x1", 0, serde_json::json!({"x": 1}));
        let discrepancies = compute_discrepancies(&[a.clone()], &[a]);
        assert!(discrepancies.is_empty());
    }

    #[test]
    fn missing_from_baseline_is_flagged() {
        let replayed = envelope("0x1", 0, serde_json::json!({}));
        let discrepancies = compute_discrepancies(&[replayed], &[]);
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].kind, DiscrepancyKind::MissingEvent);
    }

    #[test]
    fn payload_mismatch_is_flagged() {
        let replayed = envelope("0x1", 0, serde_json::json!({"x": 2}));
        let baseline = envelope("0x1", 0, serde_json::json!({"x": 1}));
        let discrepancies = compute_discrepancies(&[replayed], &[baseline]);
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].kind, DiscrepancyKind::PayloadMismatch);
    }

    #[test]
    fn missing_from_replayed_is_flagged() {
        let baseline = envelope("0x2", 1, serde_json::json!({}));
        let discrepancies = compute_discrepancies(&[], &[baseline]);
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].tx_hash, "0x2");
    }
}
