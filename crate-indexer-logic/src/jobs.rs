//! Queue job handlers wiring [`crate::milestone`] and [`crate::reconciliation`]
//! into the [`crate::queue::worker::JobHandler`] trait (C8/C9/C10).
//!
//! Grounded on `eth-bytecode-db-extractors`'s pattern of one `JobHandler`
//! struct per queue, holding only the collaborators its processor needs.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, TransactionTrait};

use crate::{
    errors::CoreError,
    milestone::{self, MilestoneSideEffects, ModeRegistry},
    model::EventEnvelope,
    queue::{ClaimedJob, JobHandler},
    reconciliation::{self, NotificationSink, ReconciliationJob},
};

/// No business side effect beyond the ledger write. The spec treats the
/// actual settlement/reward/redemption action as opaque (§4.9 step 5); a
/// real deployment substitutes its own [`MilestoneSideEffects`] impl.
pub struct NoopMilestoneSideEffects;

#[async_trait]
impl MilestoneSideEffects for NoopMilestoneSideEffects {
    async fn apply(
        &self,
        _tx: &sea_orm::DatabaseTransaction,
        _payload: &milestone::MilestonePayload,
    ) -> Result<(), CoreError> {
        Ok(())
    }
}

pub struct MilestoneJobHandler<C> {
    db: Arc<C>,
    mode_registry: Arc<dyn ModeRegistry>,
    side_effects: Arc<dyn MilestoneSideEffects>,
}

impl<C> MilestoneJobHandler<C> {
    pub fn new(
        db: Arc<C>,
        mode_registry: Arc<dyn ModeRegistry>,
        side_effects: Arc<dyn MilestoneSideEffects>,
    ) -> Self {
        Self {
            db,
            mode_registry,
            side_effects,
        }
    }
}

#[async_trait]
impl<C> JobHandler for MilestoneJobHandler<C>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync,
{
    async fn handle(&self, job: ClaimedJob) -> Result<(), CoreError> {
        milestone::process_milestone_job(
            self.db.as_ref(),
            self.mode_registry.as_ref(),
            self.side_effects.as_ref(),
            job.payload,
        )
        .await
        .map(|_outcome| ())
    }
}

pub struct ReconciliationJobHandler<C> {
    db: Arc<C>,
    sink: Arc<dyn NotificationSink>,
}

impl<C> ReconciliationJobHandler<C> {
    pub fn new(db: Arc<C>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { db, sink }
    }
}

#[async_trait]
impl<C> JobHandler for ReconciliationJobHandler<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn handle(&self, job: ClaimedJob) -> Result<(), CoreError> {
        let raw = job.payload;
        let report_id = raw["reportId"]
            .as_str()
            .ok_or_else(|| CoreError::input_invalid("reconciliation job missing reportId"))?
            .to_string();
        let contest_id = raw["contestId"]
            .as_str()
            .ok_or_else(|| CoreError::input_invalid("reconciliation job missing contestId"))?
            .to_string();
        let chain_id = raw["chainId"]
            .as_u64()
            .ok_or_else(|| CoreError::input_invalid("reconciliation job missing chainId"))?;
        let from_block = raw["fromBlock"]
            .as_u64()
            .ok_or_else(|| CoreError::input_invalid("reconciliation job missing fromBlock"))?;
        let to_block = raw["toBlock"]
            .as_u64()
            .ok_or_else(|| CoreError::input_invalid("reconciliation job missing toBlock"))?;
        let replayed: Vec<EventEnvelope> = serde_json::from_value(raw["replayed"].clone())
            .map_err(|e| CoreError::input_invalid(format!("malformed replayed events: {e}")))?;
        let baseline: Vec<EventEnvelope> = serde_json::from_value(raw["baseline"].clone())
            .map_err(|e| CoreError::input_invalid(format!("malformed baseline events: {e}")))?;

        let reconciliation_job = ReconciliationJob {
            report_id,
            job_id: Some(job.id),
            contest_id,
            chain_id,
            from_block,
            to_block,
            replayed,
            baseline: Some(baseline),
        };

        reconciliation::process_reconciliation_job(self.db.as_ref(), reconciliation_job, self.sink.as_ref())
            .await
            .map(|_outcome| ())
    }
}
