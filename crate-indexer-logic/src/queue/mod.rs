//! Durable job dispatcher & queue (C8, §4.8).

pub mod dispatcher;
pub mod worker;

pub use dispatcher::{ClaimedJob, PublishOptions, PublishOutcome};
pub use worker::{JobHandler, WorkerConfig, register_worker};

pub const QUEUE_MILESTONE: &str = "indexer.milestone";
pub const QUEUE_RECONCILE: &str = "indexer.reconcile";
