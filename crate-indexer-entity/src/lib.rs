pub mod audit_log;
pub mod ingestion_cursors;
pub mod ingestion_events;
pub mod ingestion_streams;
pub mod manual;
pub mod milestone_executions;
pub mod queue_jobs;
pub mod reconciliation_report_ledgers;
pub mod rpc_endpoints;
pub mod sea_orm_active_enums;
