//! Control plane (C11, §4.11).
//!
//! "Authenticated" is an external collaborator contract per §1 — these
//! functions accept an already-resolved `actor: String` and perform no
//! authentication of their own; a real deployment mounts auth middleware in
//! `crate-indexer-server` in front of the routes that call into this module.
//!
//! The in-memory mode registry is a `parking_lot::RwLock<HashSet<...>>`
//! rather than a database table, following the registry's own
//! swap-the-snapshot style (§4.3 port note) — pause/resume is a hot path
//! the milestone processor consults on every job.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sea_orm::{ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde_json::Value as Json;

use entity::{
    audit_log, milestone_executions,
    sea_orm_active_enums::{AuditAction, MilestoneStatus},
};

use crate::{
    errors::CoreError,
    milestone::ModeRegistry,
    model::{MilestoneKind, StreamId},
    queue::{self, PublishOptions, QUEUE_MILESTONE},
};

#[derive(Default)]
pub struct InMemoryModeRegistry {
    paused: RwLock<HashSet<StreamId>>,
}

impl InMemoryModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_paused(&self, stream: StreamId, paused: bool) {
        let mut guard = self.paused.write();
        if paused {
            guard.insert(stream);
        } else {
            guard.remove(&stream);
        }
    }
}

#[async_trait]
impl ModeRegistry for InMemoryModeRegistry {
    async fn is_paused(&self, contest_id: &str, chain_id: u64) -> bool {
        self.paused
            .read()
            .contains(&StreamId::new(contest_id, chain_id))
    }
}

/// Delegate for C11's `replay` operation; implemented by [`crate::replay::ReplayEngine`].
#[async_trait]
pub trait ReplayRunner: Send + Sync {
    async fn run(
        &self,
        stream: &StreamId,
        from_block: u64,
        to_block: u64,
        reason: &str,
        actor: &str,
    ) -> Result<i64, CoreError>;
}

pub struct ControlPlane<C> {
    db: Arc<C>,
    mode_registry: Arc<InMemoryModeRegistry>,
    replay_runner: Arc<dyn ReplayRunner>,
}

impl<C: ConnectionTrait> ControlPlane<C> {
    pub fn new(
        db: Arc<C>,
        mode_registry: Arc<InMemoryModeRegistry>,
        replay_runner: Arc<dyn ReplayRunner>,
    ) -> Self {
        Self {
            db,
            mode_registry,
            replay_runner,
        }
    }

    pub async fn pause(&self, stream: StreamId, actor: &str, reason: Option<&str>) -> Result<(), CoreError> {
        self.mode_registry.set_paused(stream.clone(), true);
        self.audit(&stream, AuditAction::Pause, actor, reason, Json::Null)
            .await
    }

    pub async fn resume(&self, stream: StreamId, actor: &str, reason: Option<&str>) -> Result<(), CoreError> {
        self.mode_registry.set_paused(stream.clone(), false);
        self.audit(&stream, AuditAction::Resume, actor, reason, Json::Null)
            .await
    }

    /// Re-enqueues a `needs_attention`/`retrying` milestone by its source
    /// coordinates (§4.11). 404s when no ledger row matches.
    pub async fn retry(
        &self,
        stream: StreamId,
        milestone: MilestoneKind,
        source_tx_hash: &str,
        source_log_index: u32,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<(), CoreError> {
        let row = milestone_executions::Entity::find()
            .filter(milestone_executions::Column::ContestId.eq(stream.contest_id.clone()))
            .filter(milestone_executions::Column::ChainId.eq(stream.chain_id as i64))
            .filter(milestone_executions::Column::Milestone.eq(milestone.as_str()))
            .filter(milestone_executions::Column::SourceTxHash.eq(source_tx_hash))
            .filter(milestone_executions::Column::SourceLogIndex.eq(source_log_index as i32))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| CoreError::not_found("milestone ledger entry not found"))?;

        if row.status == MilestoneStatus::Succeeded {
            return Err(CoreError::conflict("milestone already succeeded"));
        }

        let reset = milestone_executions::ActiveModel {
            id: ActiveValue::Unchanged(row.id),
            status: ActiveValue::Set(MilestoneStatus::Retrying),
            last_error: ActiveValue::Set(None),
            updated_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        milestone_executions::Entity::update(reset).exec(self.db.as_ref()).await?;

        queue::dispatcher::publish(
            self.db.as_ref(),
            QUEUE_MILESTONE,
            row.payload.clone(),
            PublishOptions {
                dedupe_key: Some(format!("retry:{}:{}", row.idempotency_key, Utc::now().timestamp())),
                ..Default::default()
            },
        )
        .await?;

        self.audit(
            &stream,
            AuditAction::Retry,
            actor,
            reason,
            serde_json::json!({"milestone": milestone.as_str(), "sourceTxHash": source_tx_hash, "sourceLogIndex": source_log_index}),
        )
        .await
    }

    /// Schedules a bounded replay via [`ReplayRunner`] and returns the
    /// resulting reconciliation job id (§4.7, §4.11).
    pub async fn replay(
        &self,
        stream: StreamId,
        from_block: u64,
        to_block: u64,
        reason: &str,
        actor: &str,
    ) -> Result<i64, CoreError> {
        if from_block > to_block {
            return Err(CoreError::input_invalid("fromBlock must be <= toBlock"));
        }

        let job_id = self
            .replay_runner
            .run(&stream, from_block, to_block, reason, actor)
            .await?;

        self.audit(
            &stream,
            AuditAction::Replay,
            actor,
            Some(reason),
            serde_json::json!({"fromBlock": from_block, "toBlock": to_block, "jobId": job_id}),
        )
        .await?;

        Ok(job_id)
    }

    async fn audit(
        &self,
        stream: &StreamId,
        action: AuditAction,
        actor: &str,
        reason: Option<&str>,
        detail: Json,
    ) -> Result<(), CoreError> {
        let model = audit_log::ActiveModel {
            id: ActiveValue::NotSet,
            contest_id: ActiveValue::Set(stream.contest_id.clone()),
            chain_id: ActiveValue::Set(stream.chain_id as i64),
            action: ActiveValue::Set(action),
            actor: ActiveValue::Set(actor.to_string()),
            reason: ActiveValue::Set(reason.map(str::to_string)),
            occurred_at: ActiveValue::Set(Utc::now()),
            detail: ActiveValue::Set(detail),
        };
        audit_log::Entity::insert(model).exec(self.db.as_ref()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pause_then_resume_clears_mode() {
        let registry = InMemoryModeRegistry::new();
        let stream = StreamId::new("c1", 1);
        registry.set_paused(stream.clone(), true);
        assert!(registry.is_paused(&stream.contest_id, stream.chain_id).await);
        registry.set_paused(stream.clone(), false);
        assert!(!registry.is_paused(&stream.contest_id, stream.chain_id).await);
    }
}
