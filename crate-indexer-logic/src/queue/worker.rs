//! Queue worker pool (C8, §4.8 `registerWorker`).
//!
//! One `tokio::task` per configured concurrency slot, each polling
//! [`super::dispatcher::claim_next`] on an interval with jittered backoff
//! when the queue is empty — the async analogue of the teacher's
//! `spawn_configured_indexers` one-task-per-unit pattern.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use sea_orm::ConnectionTrait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::CoreError,
    metrics::QUEUE_JOB_DURATION_SECONDS,
    queue::dispatcher::{self, ClaimedJob},
};

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: ClaimedJob) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub empty_poll_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            empty_poll_backoff: Duration::from_millis(500),
        }
    }
}

/// Spawns `config.concurrency` polling tasks for `queue_name`. Each returned
/// handle exits once `cancellation` fires.
pub fn register_worker<C>(
    db: Arc<C>,
    queue_name: String,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    cancellation: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    (0..config.concurrency)
        .map(|slot| {
            let db = db.clone();
            let queue_name = queue_name.clone();
            let handler = handler.clone();
            let cancellation = cancellation.clone();
            tokio::spawn(async move {
                tracing::info!(queue = %queue_name, slot, "queue worker started");
                worker_loop(db, queue_name, handler, config, cancellation).await;
            })
        })
        .collect()
}

async fn worker_loop<C: ConnectionTrait>(
    db: Arc<C>,
    queue_name: String,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    cancellation: CancellationToken,
) {
    loop {
        if cancellation.is_cancelled() {
            return;
        }

        match dispatcher::claim_next(db.as_ref(), &queue_name).await {
            Ok(Some(job)) => process_one(db.as_ref(), &queue_name, job, handler.as_ref()).await,
            Ok(None) => {
                let jitter = rand::rng().random_range(0..config.empty_poll_backoff.as_millis() as u64 + 1);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(jitter)) => {}
                    _ = cancellation.cancelled() => return,
                }
            }
            Err(err) => {
                tracing::error!(queue = %queue_name, error = %err, "failed to claim job");
                tokio::select! {
                    _ = tokio::time::sleep(config.empty_poll_backoff) => {}
                    _ = cancellation.cancelled() => return,
                }
            }
        }
    }
}

async fn process_one<C: ConnectionTrait>(
    db: &C,
    queue_name: &str,
    job: ClaimedJob,
    handler: &dyn JobHandler,
) {
    let job_id = job.id;
    let attempt = job.attempt;
    let retry_limit = job.retry_limit;
    let timer = std::time::Instant::now();

    let outcome = handler.handle(job).await;
    let elapsed = timer.elapsed().as_secs_f64();

    match outcome {
        Ok(()) => {
            QUEUE_JOB_DURATION_SECONDS
                .with_label_values(&[queue_name, "success"])
                .observe(elapsed);
            if let Err(err) = dispatcher::mark_success(db, job_id).await {
                tracing::error!(queue = queue_name, job_id, error = %err, "failed to mark job success");
            }
        }
        Err(err) if err.kind.is_retryable() && attempt < retry_limit => {
            QUEUE_JOB_DURATION_SECONDS
                .with_label_values(&[queue_name, "retry"])
                .observe(elapsed);
            let backoff = dispatcher::retry_backoff(attempt);
            let detail = serde_json::json!({"message": err.message, "kind": format!("{:?}", err.kind)});
            if let Err(err) = dispatcher::mark_retry(db, job_id, backoff, detail).await {
                tracing::error!(queue = queue_name, job_id, error = %err, "failed to mark job retry");
            }
        }
        Err(err) => {
            QUEUE_JOB_DURATION_SECONDS
                .with_label_values(&[queue_name, "failure"])
                .observe(elapsed);
            let detail = serde_json::json!({"message": err.message, "kind": format!("{:?}", err.kind)});
            if let Err(err) = dispatcher::mark_failed(db, job_id, detail).await {
                tracing::error!(queue = queue_name, job_id, error = %err, "failed to mark job failed");
            }
        }
    }
}
