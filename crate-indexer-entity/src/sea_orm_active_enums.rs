//! `SeaORM` active enums backing the Postgres `ENUM` columns used across
//! the indexer schema.

use sea_orm::entity::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "event_type")]
pub enum EventType {
    #[sea_orm(string_value = "registration")]
    Registration,
    #[sea_orm(string_value = "rebalance")]
    Rebalance,
    #[sea_orm(string_value = "settlement")]
    Settlement,
    #[sea_orm(string_value = "reward")]
    Reward,
    #[sea_orm(string_value = "redemption")]
    Redemption,
    #[sea_orm(string_value = "deployment")]
    Deployment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "stream_state")]
pub enum StreamState {
    #[sea_orm(string_value = "live")]
    Live,
    #[sea_orm(string_value = "replay")]
    Replay,
    #[sea_orm(string_value = "paused")]
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "milestone_status"
)]
pub enum MilestoneStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "retrying")]
    Retrying,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "needs_attention")]
    NeedsAttention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "report_status")]
pub enum ReportStatus {
    #[sea_orm(string_value = "pending_review")]
    PendingReview,
    #[sea_orm(string_value = "in_review")]
    InReview,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "needs_attention")]
    NeedsAttention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "queue_job_state")]
pub enum QueueJobState {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "audit_action")]
pub enum AuditAction {
    #[sea_orm(string_value = "pause")]
    Pause,
    #[sea_orm(string_value = "resume")]
    Resume,
    #[sea_orm(string_value = "retry")]
    Retry,
    #[sea_orm(string_value = "replay")]
    Replay,
    #[sea_orm(string_value = "mode_change")]
    ModeChange,
}
