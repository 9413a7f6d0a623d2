//! Prometheus metrics (C12, §4.12).
//!
//! Grounded on `interchain-indexer-logic::metrics`/`message_buffer::metrics`'s
//! `lazy_static!` + `register_*_vec!` style. Labels are kept low-cardinality:
//! `stream_id`/`chain_id`/`endpoint_id` identify a small, bounded set of
//! configured streams and endpoints, never unbounded values like tx hashes.

use lazy_static::lazy_static;
use prometheus::{
    GaugeVec, HistogramVec, IntCounterVec, register_gauge_vec, register_histogram_vec,
    register_int_counter_vec,
};

lazy_static! {
    /// Current cursor position per stream (§4.12 `ingestion_lag`).
    pub static ref INGESTION_CURSOR_BLOCK: GaugeVec = register_gauge_vec!(
        "crate_indexer_ingestion_cursor_block",
        "last confirmed block number per stream",
        &["stream_id"],
    )
    .unwrap();

    /// Chain head minus cursor, in blocks.
    pub static ref INGESTION_LAG_BLOCKS: GaugeVec = register_gauge_vec!(
        "crate_indexer_ingestion_lag_blocks",
        "blocks between chain head and stream cursor",
        &["stream_id"],
    )
    .unwrap();

    /// Ticks per stream, bucketed by outcome: ok, empty, error.
    pub static ref INGESTION_TICK_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crate_indexer_ingestion_tick_total",
        "ingestion loop ticks per stream",
        &["stream_id", "outcome"],
    )
    .unwrap();

    /// Events written per stream per tick (bucketed, §4.12 `ingestion_batch_size`).
    pub static ref INGESTION_EVENTS_WRITTEN: HistogramVec = register_histogram_vec!(
        "crate_indexer_ingestion_events_written",
        "events persisted in a single tick",
        &["stream_id"],
        vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 200.0, 400.0]
    )
    .unwrap();

    /// Tick wall-clock duration in milliseconds (§4.12 `ingestion_batch_duration_ms`).
    pub static ref INGESTION_BATCH_DURATION_MS: HistogramVec = register_histogram_vec!(
        "crate_indexer_ingestion_batch_duration_ms",
        "wall-clock duration of a single ingestion tick",
        &["stream_id"],
        vec![100.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0]
    )
    .unwrap();

    /// RPC endpoint switches, keyed by chain/from/to.
    pub static ref RPC_SWITCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crate_indexer_rpc_switch_total",
        "RPC endpoint failovers",
        &["chain_id", "from", "to"],
    )
    .unwrap();

    /// RPC call failures, keyed by the classified reason.
    pub static ref RPC_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crate_indexer_rpc_failures_total",
        "RPC call failures by reason",
        &["reason"],
    )
    .unwrap();

    /// Queue depth per job kind, by status.
    pub static ref QUEUE_DEPTH: GaugeVec = register_gauge_vec!(
        "crate_indexer_queue_depth",
        "queued jobs by kind and status",
        &["kind", "status"],
    )
    .unwrap();

    /// Job processing duration in seconds, by kind and outcome.
    pub static ref QUEUE_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "crate_indexer_queue_job_duration_seconds",
        "job handler duration",
        &["kind", "outcome"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// Milestones processed, by kind and terminal status.
    pub static ref MILESTONES_PROCESSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crate_indexer_milestones_processed_total",
        "milestone executions reaching a terminal status",
        &["kind", "status"],
    )
    .unwrap();

    /// Reconciliation discrepancies found, by report kind.
    pub static ref RECONCILIATION_DISCREPANCIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crate_indexer_reconciliation_discrepancies_total",
        "discrepancies recorded by the reconciliation processor",
        &["kind"],
    )
    .unwrap();
}
