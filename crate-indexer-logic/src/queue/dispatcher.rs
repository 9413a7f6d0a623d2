//! Durable queue publish/claim primitives (C8, §4.8).
//!
//! Grounded on `eth-bytecode-db-extractors/job-queue::functions`'s
//! `next_job_id_with_filter` — a raw-SQL `UPDATE ... WHERE id = (SELECT ...
//! FOR UPDATE SKIP LOCKED) RETURNING ...` — extended with the columns §6
//! requires: `singleton_key`, `dedupe_key`, `available_at`, `priority`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveValue, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, QueryFilter,
    QueryOrder, Statement,
};
use serde_json::Value as Json;

use entity::{queue_jobs, sea_orm_active_enums::QueueJobState};

use crate::errors::CoreError;

const DEDUPE_WINDOW: ChronoDuration = ChronoDuration::hours(24);

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub dedupe_key: Option<String>,
    pub singleton_key: Option<String>,
    pub start_after: Option<DateTime<Utc>>,
    pub priority: i32,
    pub retry_limit: i32,
}

impl PublishOptions {
    pub fn with_retry_limit(mut self, retry_limit: i32) -> Self {
        self.retry_limit = retry_limit;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Enqueued { job_id: i64 },
    Deduplicated { job_id: i64 },
    SingletonDeferred { job_id: i64 },
}

/// Enqueues a job, honoring `dedupeKey` (a second publish within the
/// retention window is a noop) and `singletonKey` (at most one non-terminal
/// job per key) per §4.8.
pub async fn publish<C: ConnectionTrait>(
    db: &C,
    queue_name: &str,
    payload: Json,
    options: PublishOptions,
) -> Result<PublishOutcome, CoreError> {
    if let Some(dedupe_key) = &options.dedupe_key {
        if let Some(existing) = find_recent_by_dedupe_key(db, dedupe_key).await? {
            return Ok(PublishOutcome::Deduplicated { job_id: existing });
        }
    }

    if let Some(singleton_key) = &options.singleton_key {
        if let Some(existing) = find_non_terminal_by_singleton_key(db, singleton_key).await? {
            return Ok(PublishOutcome::SingletonDeferred { job_id: existing });
        }
    }

    let now = Utc::now();
    let model = queue_jobs::ActiveModel {
        id: ActiveValue::NotSet,
        queue_name: ActiveValue::Set(queue_name.to_string()),
        payload: ActiveValue::Set(payload),
        attempt: ActiveValue::Set(0),
        retry_limit: ActiveValue::Set(options.retry_limit.max(1)),
        enqueued_at: ActiveValue::Set(now),
        available_at: ActiveValue::Set(options.start_after.unwrap_or(now)),
        singleton_key: ActiveValue::Set(options.singleton_key),
        dedupe_key: ActiveValue::Set(options.dedupe_key),
        priority: ActiveValue::Set(options.priority),
        state: ActiveValue::Set(QueueJobState::Created),
        last_error: ActiveValue::Set(None),
    };

    let inserted = queue_jobs::Entity::insert(model).exec(db).await?;
    Ok(PublishOutcome::Enqueued {
        job_id: inserted.last_insert_id,
    })
}

async fn find_recent_by_dedupe_key<C: ConnectionTrait>(
    db: &C,
    dedupe_key: &str,
) -> Result<Option<i64>, CoreError> {
    let since = Utc::now() - DEDUPE_WINDOW;
    let existing = queue_jobs::Entity::find()
        .filter(queue_jobs::Column::DedupeKey.eq(dedupe_key))
        .filter(queue_jobs::Column::EnqueuedAt.gte(since))
        .order_by_desc(queue_jobs::Column::EnqueuedAt)
        .one(db)
        .await?;
    Ok(existing.map(|m| m.id))
}

async fn find_non_terminal_by_singleton_key<C: ConnectionTrait>(
    db: &C,
    singleton_key: &str,
) -> Result<Option<i64>, CoreError> {
    let existing = queue_jobs::Entity::find()
        .filter(queue_jobs::Column::SingletonKey.eq(singleton_key))
        .filter(
            queue_jobs::Column::State
                .is_in([QueueJobState::Created, QueueJobState::Active]),
        )
        .one(db)
        .await?;
    Ok(existing.map(|m| m.id))
}

#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: i64,
    pub queue_name: String,
    pub payload: Json,
    pub attempt: i32,
    pub retry_limit: i32,
    pub enqueued_at: DateTime<Utc>,
    pub singleton_key: Option<String>,
}

/// Atomically claims the highest-priority, earliest-enqueued ready job for
/// `queue_name`, or `None` if the queue is empty.
pub async fn claim_next<C: ConnectionTrait>(
    db: &C,
    queue_name: &str,
) -> Result<Option<ClaimedJob>, CoreError> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        r#"
            UPDATE queue_jobs
            SET state = 'active', attempt = attempt + 1
            WHERE id = (
                SELECT id FROM queue_jobs
                WHERE queue_name = $1
                  AND state = 'created'
                  AND available_at <= now()
                ORDER BY priority DESC, enqueued_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, queue_name, payload, attempt, retry_limit, enqueued_at, singleton_key
        "#,
        [queue_name.into()],
    );

    let Some(row) = db.query_one(stmt).await? else {
        return Ok(None);
    };

    Ok(Some(ClaimedJob {
        id: row.try_get_by("id").map_err(CoreError::from)?,
        queue_name: row.try_get_by("queue_name").map_err(CoreError::from)?,
        payload: row.try_get_by("payload").map_err(CoreError::from)?,
        attempt: row.try_get_by("attempt").map_err(CoreError::from)?,
        retry_limit: row.try_get_by("retry_limit").map_err(CoreError::from)?,
        enqueued_at: row.try_get_by("enqueued_at").map_err(CoreError::from)?,
        singleton_key: row.try_get_by("singleton_key").ok(),
    }))
}

pub async fn mark_success<C: ConnectionTrait>(db: &C, job_id: i64) -> Result<(), CoreError> {
    update_terminal_state(db, job_id, QueueJobState::Completed, None).await
}

pub async fn mark_failed<C: ConnectionTrait>(
    db: &C,
    job_id: i64,
    last_error: Json,
) -> Result<(), CoreError> {
    update_terminal_state(db, job_id, QueueJobState::Failed, Some(last_error)).await
}

/// Reverts a job to `created` with a backoff delay so a worker picks it up
/// again (§4.8 "retried up to retryLimit with exponential backoff").
pub async fn mark_retry<C: ConnectionTrait>(
    db: &C,
    job_id: i64,
    retry_after: ChronoDuration,
    last_error: Json,
) -> Result<(), CoreError> {
    let model = queue_jobs::ActiveModel {
        id: ActiveValue::Unchanged(job_id),
        state: ActiveValue::Set(QueueJobState::Created),
        available_at: ActiveValue::Set(Utc::now() + retry_after),
        last_error: ActiveValue::Set(Some(last_error)),
        ..Default::default()
    };
    queue_jobs::Entity::update(model).exec(db).await?;
    Ok(())
}

async fn update_terminal_state<C: ConnectionTrait>(
    db: &C,
    job_id: i64,
    state: QueueJobState,
    last_error: Option<Json>,
) -> Result<(), CoreError> {
    let model = queue_jobs::ActiveModel {
        id: ActiveValue::Unchanged(job_id),
        state: ActiveValue::Set(state),
        last_error: ActiveValue::Set(last_error),
        ..Default::default()
    };
    queue_jobs::Entity::update(model).exec(db).await?;
    Ok(())
}

/// Exponential backoff for queue retries, matching the live loop's
/// `min(interval * 2^streak, cap)` shape (§4.6).
pub fn retry_backoff(attempt: i32) -> ChronoDuration {
    let capped_attempt = attempt.clamp(0, 10);
    let seconds = 2_i64.saturating_pow(capped_attempt as u32).min(300);
    ChronoDuration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_is_capped_at_five_minutes() {
        assert_eq!(retry_backoff(0), ChronoDuration::seconds(1));
        assert_eq!(retry_backoff(20), ChronoDuration::seconds(300));
    }
}
