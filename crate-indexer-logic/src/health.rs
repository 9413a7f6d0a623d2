//! Health snapshot (C12, §4.12).
//!
//! Shape mirrors the spec's JSON health response exactly so
//! `crate-indexer-server`'s `/healthz` route can serialize it unchanged.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::Serialize;

use entity::{queue_jobs, sea_orm_active_enums::QueueJobState};

use crate::errors::CoreError;

#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub name: String,
    pub pending: u64,
    pub delayed: u64,
    pub failed: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub mode: &'static str,
    pub timestamp: DateTime<Utc>,
    pub queues: Vec<QueueHealth>,
    pub active_alerts: Vec<String>,
}

/// Counts jobs by state per queue and reports the most recent failure as an
/// active alert; `last_success_at` is left `None` here since the queue
/// tables don't retain completed rows' terminal timestamps (§3 schema) — a
/// real deployment wires this from the metrics gauge updated on `mark_success`.
pub async fn snapshot<C: ConnectionTrait>(db: &C, queue_names: &[&str]) -> Result<HealthSnapshot, CoreError> {
    let mut queues = Vec::with_capacity(queue_names.len());
    let mut active_alerts = Vec::new();

    for &name in queue_names {
        let pending = queue_jobs::Entity::find()
            .filter(queue_jobs::Column::QueueName.eq(name))
            .filter(queue_jobs::Column::State.eq(QueueJobState::Created))
            .filter(queue_jobs::Column::AvailableAt.lte(Utc::now()))
            .count(db)
            .await?;

        let delayed = queue_jobs::Entity::find()
            .filter(queue_jobs::Column::QueueName.eq(name))
            .filter(queue_jobs::Column::State.eq(QueueJobState::Created))
            .filter(queue_jobs::Column::AvailableAt.gt(Utc::now()))
            .count(db)
            .await?;

        let failed_row = queue_jobs::Entity::find()
            .filter(queue_jobs::Column::QueueName.eq(name))
            .filter(queue_jobs::Column::State.eq(QueueJobState::Failed))
            .one(db)
            .await?;

        let failed = queue_jobs::Entity::find()
            .filter(queue_jobs::Column::QueueName.eq(name))
            .filter(queue_jobs::Column::State.eq(QueueJobState::Failed))
            .count(db)
            .await?;

        let last_error = failed_row
            .as_ref()
            .and_then(|m| m.last_error.clone())
            .map(|v| v.to_string());

        if failed > 0 {
            active_alerts.push(format!("{name}: {failed} failed job(s)"));
        }

        queues.push(QueueHealth {
            name: name.to_string(),
            pending,
            delayed,
            failed,
            last_success_at: None,
            last_error,
        });
    }

    let mode = decide_mode(&active_alerts);

    Ok(HealthSnapshot {
        mode,
        timestamp: Utc::now(),
        queues,
        active_alerts,
    })
}

fn decide_mode(active_alerts: &[String]) -> &'static str {
    if active_alerts.is_empty() {
        "healthy"
    } else {
        "degraded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_alerts_is_healthy() {
        assert_eq!(decide_mode(&[]), "healthy");
    }

    #[test]
    fn any_alert_marks_degraded() {
        assert_eq!(decide_mode(&["indexer.milestone: 1 failed job(s)".to_string()]), "degraded");
    }
}
