use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        create_enums(manager).await?;
        create_ingestion_streams(manager).await?;
        create_rpc_endpoints(manager).await?;
        create_ingestion_cursors(manager).await?;
        create_ingestion_events(manager).await?;
        create_milestone_executions(manager).await?;
        create_reconciliation_report_ledgers(manager).await?;
        create_queue_jobs(manager).await?;
        create_audit_log(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(AuditLog::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(QueueJobs::Table).to_owned()).await?;
        manager
            .drop_table(Table::drop().table(ReconciliationReportLedgers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MilestoneExecutions::Table).to_owned())
            .await?;
        manager.drop_table(Table::drop().table(IngestionEvents::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(IngestionCursors::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(RpcEndpoints::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(IngestionStreams::Table).to_owned()).await?;
        drop_enums(manager).await?;
        Ok(())
    }
}

async fn create_enums(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_type(
            extension::postgres::Type::create()
                .as_enum(Alias::new("event_type"))
                .values([
                    Alias::new("registration"),
                    Alias::new("rebalance"),
                    Alias::new("settlement"),
                    Alias::new("reward"),
                    Alias::new("redemption"),
                    Alias::new("deployment"),
                ])
                .to_owned(),
        )
        .await?;
    manager
        .create_type(
            extension::postgres::Type::create()
                .as_enum(Alias::new("stream_state"))
                .values([Alias::new("live"), Alias::new("replay"), Alias::new("paused")])
                .to_owned(),
        )
        .await?;
    manager
        .create_type(
            extension::postgres::Type::create()
                .as_enum(Alias::new("milestone_status"))
                .values([
                    Alias::new("pending"),
                    Alias::new("in_progress"),
                    Alias::new("retrying"),
                    Alias::new("succeeded"),
                    Alias::new("needs_attention"),
                ])
                .to_owned(),
        )
        .await?;
    manager
        .create_type(
            extension::postgres::Type::create()
                .as_enum(Alias::new("report_status"))
                .values([
                    Alias::new("pending_review"),
                    Alias::new("in_review"),
                    Alias::new("resolved"),
                    Alias::new("needs_attention"),
                ])
                .to_owned(),
        )
        .await?;
    manager
        .create_type(
            extension::postgres::Type::create()
                .as_enum(Alias::new("queue_job_state"))
                .values([
                    Alias::new("created"),
                    Alias::new("active"),
                    Alias::new("completed"),
                    Alias::new("failed"),
                ])
                .to_owned(),
        )
        .await?;
    manager
        .create_type(
            extension::postgres::Type::create()
                .as_enum(Alias::new("audit_action"))
                .values([
                    Alias::new("pause"),
                    Alias::new("resume"),
                    Alias::new("retry"),
                    Alias::new("replay"),
                    Alias::new("mode_change"),
                ])
                .to_owned(),
        )
        .await?;
    Ok(())
}

async fn drop_enums(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    for name in [
        "audit_action",
        "queue_job_state",
        "report_status",
        "milestone_status",
        "stream_state",
        "event_type",
    ] {
        manager
            .drop_type(extension::postgres::Type::drop().name(Alias::new(name)).to_owned())
            .await?;
    }
    Ok(())
}

async fn create_ingestion_streams(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(IngestionStreams::Table)
                .if_not_exists()
                .col(ColumnDef::new(IngestionStreams::ContestId).string().not_null())
                .col(ColumnDef::new(IngestionStreams::ChainId).big_integer().not_null())
                .col(ColumnDef::new(IngestionStreams::RegistrarAddress).string().not_null())
                .col(
                    ColumnDef::new(IngestionStreams::OtherAddresses)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'{}'::jsonb")),
                )
                .col(ColumnDef::new(IngestionStreams::StartBlock).big_integer().not_null())
                .col(
                    ColumnDef::new(IngestionStreams::State)
                        .custom(Alias::new("stream_state"))
                        .not_null()
                        .default("live"),
                )
                .col(ColumnDef::new(IngestionStreams::ActiveRpc).string())
                .col(
                    ColumnDef::new(IngestionStreams::ErrorStreak)
                        .integer()
                        .not_null()
                        .default(0),
                )
                .col(
                    ColumnDef::new(IngestionStreams::LagBlocks)
                        .big_integer()
                        .not_null()
                        .default(0),
                )
                .col(ColumnDef::new(IngestionStreams::NextPollAt).timestamp_with_time_zone())
                .col(
                    ColumnDef::new(IngestionStreams::Metadata)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'{}'::jsonb")),
                )
                .col(
                    ColumnDef::new(IngestionStreams::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .col(
                    ColumnDef::new(IngestionStreams::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .primary_key(
                    Index::create()
                        .col(IngestionStreams::ContestId)
                        .col(IngestionStreams::ChainId),
                )
                .to_owned(),
        )
        .await
}

async fn create_rpc_endpoints(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(RpcEndpoints::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(RpcEndpoints::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key(),
                )
                .col(ColumnDef::new(RpcEndpoints::ChainId).big_integer().not_null())
                .col(ColumnDef::new(RpcEndpoints::EndpointId).string().not_null())
                .col(ColumnDef::new(RpcEndpoints::Url).string().not_null())
                .col(ColumnDef::new(RpcEndpoints::Priority).integer().not_null())
                .col(ColumnDef::new(RpcEndpoints::Enabled).boolean().not_null().default(true))
                .col(ColumnDef::new(RpcEndpoints::FailCount).integer().not_null().default(0))
                .col(ColumnDef::new(RpcEndpoints::LastSuccessAt).timestamp_with_time_zone())
                .col(ColumnDef::new(RpcEndpoints::CooldownUntil).timestamp_with_time_zone())
                .index(
                    Index::create()
                        .unique()
                        .col(RpcEndpoints::ChainId)
                        .col(RpcEndpoints::EndpointId),
                )
                .to_owned(),
        )
        .await
}

async fn create_ingestion_cursors(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(IngestionCursors::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(IngestionCursors::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key(),
                )
                .col(ColumnDef::new(IngestionCursors::ContestId).string().not_null())
                .col(ColumnDef::new(IngestionCursors::ChainId).big_integer().not_null())
                .col(ColumnDef::new(IngestionCursors::ContractAddress).string().not_null())
                .col(
                    ColumnDef::new(IngestionCursors::CursorHeight)
                        .big_integer()
                        .not_null()
                        .default(0),
                )
                .col(
                    ColumnDef::new(IngestionCursors::CursorLogIndex)
                        .integer()
                        .not_null()
                        .default(0),
                )
                .col(ColumnDef::new(IngestionCursors::CursorHash).string())
                .col(
                    ColumnDef::new(IngestionCursors::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .index(
                    Index::create()
                        .unique()
                        .col(IngestionCursors::ChainId)
                        .col(IngestionCursors::ContractAddress),
                )
                .to_owned(),
        )
        .await
}

async fn create_ingestion_events(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(IngestionEvents::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(IngestionEvents::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key(),
                )
                .col(ColumnDef::new(IngestionEvents::ContestId).string().not_null())
                .col(ColumnDef::new(IngestionEvents::ChainId).big_integer().not_null())
                .col(ColumnDef::new(IngestionEvents::TxHash).string().not_null())
                .col(ColumnDef::new(IngestionEvents::LogIndex).integer().not_null())
                .col(ColumnDef::new(IngestionEvents::BlockNumber).big_integer().not_null())
                .col(
                    ColumnDef::new(IngestionEvents::EventType)
                        .custom(Alias::new("event_type"))
                        .not_null(),
                )
                .col(
                    ColumnDef::new(IngestionEvents::Payload)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'{}'::jsonb")),
                )
                .col(
                    ColumnDef::new(IngestionEvents::ReorgFlag)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .col(ColumnDef::new(IngestionEvents::BlockHash).string().not_null())
                .col(
                    ColumnDef::new(IngestionEvents::OccurredAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .index(
                    Index::create()
                        .unique()
                        .col(IngestionEvents::ChainId)
                        .col(IngestionEvents::TxHash)
                        .col(IngestionEvents::LogIndex),
                )
                .index(
                    Index::create()
                        .col(IngestionEvents::ContestId)
                        .col(IngestionEvents::ChainId)
                        .col(IngestionEvents::BlockNumber)
                        .col(IngestionEvents::LogIndex),
                )
                .to_owned(),
        )
        .await
}

async fn create_milestone_executions(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(MilestoneExecutions::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(MilestoneExecutions::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key(),
                )
                .col(
                    ColumnDef::new(MilestoneExecutions::IdempotencyKey)
                        .string()
                        .not_null()
                        .unique_key(),
                )
                .col(ColumnDef::new(MilestoneExecutions::JobId).big_integer())
                .col(ColumnDef::new(MilestoneExecutions::ContestId).string().not_null())
                .col(ColumnDef::new(MilestoneExecutions::ChainId).big_integer().not_null())
                .col(ColumnDef::new(MilestoneExecutions::Milestone).string().not_null())
                .col(ColumnDef::new(MilestoneExecutions::SourceTxHash).string().not_null())
                .col(ColumnDef::new(MilestoneExecutions::SourceLogIndex).integer().not_null())
                .col(
                    ColumnDef::new(MilestoneExecutions::SourceBlockNumber)
                        .big_integer()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(MilestoneExecutions::Status)
                        .custom(Alias::new("milestone_status"))
                        .not_null()
                        .default("pending"),
                )
                .col(ColumnDef::new(MilestoneExecutions::Attempts).integer().not_null().default(0))
                .col(
                    ColumnDef::new(MilestoneExecutions::Payload)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'{}'::jsonb")),
                )
                .col(ColumnDef::new(MilestoneExecutions::LastError).json_binary())
                .col(ColumnDef::new(MilestoneExecutions::ActorContext).json_binary())
                .col(ColumnDef::new(MilestoneExecutions::CompletedAt).timestamp_with_time_zone())
                .col(
                    ColumnDef::new(MilestoneExecutions::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .col(
                    ColumnDef::new(MilestoneExecutions::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .to_owned(),
        )
        .await
}

async fn create_reconciliation_report_ledgers(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(ReconciliationReportLedgers::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key(),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::IdempotencyKey)
                        .string()
                        .not_null()
                        .unique_key(),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::ReportId)
                        .string()
                        .not_null()
                        .unique_key(),
                )
                .col(ColumnDef::new(ReconciliationReportLedgers::JobId).big_integer().unique_key())
                .col(ColumnDef::new(ReconciliationReportLedgers::ContestId).string().not_null())
                .col(ColumnDef::new(ReconciliationReportLedgers::ChainId).big_integer().not_null())
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::RangeFromBlock)
                        .big_integer()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::RangeToBlock)
                        .big_integer()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::GeneratedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::Status)
                        .custom(Alias::new("report_status"))
                        .not_null()
                        .default("pending_review"),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::Attempts)
                        .integer()
                        .not_null()
                        .default(0),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::Differences)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'[]'::jsonb")),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::Notifications)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'[]'::jsonb")),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::Payload)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'{}'::jsonb")),
                )
                .col(ColumnDef::new(ReconciliationReportLedgers::ActorContext).json_binary())
                .col(ColumnDef::new(ReconciliationReportLedgers::LastError).json_binary())
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::CompletedAt)
                        .timestamp_with_time_zone(),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .col(
                    ColumnDef::new(ReconciliationReportLedgers::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .to_owned(),
        )
        .await
}

async fn create_queue_jobs(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(QueueJobs::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(QueueJobs::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key(),
                )
                .col(ColumnDef::new(QueueJobs::QueueName).string().not_null())
                .col(
                    ColumnDef::new(QueueJobs::Payload)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'{}'::jsonb")),
                )
                .col(ColumnDef::new(QueueJobs::Attempt).integer().not_null().default(0))
                .col(ColumnDef::new(QueueJobs::RetryLimit).integer().not_null().default(5))
                .col(
                    ColumnDef::new(QueueJobs::EnqueuedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .col(
                    ColumnDef::new(QueueJobs::AvailableAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .col(ColumnDef::new(QueueJobs::SingletonKey).string())
                .col(ColumnDef::new(QueueJobs::DedupeKey).string())
                .col(ColumnDef::new(QueueJobs::Priority).integer().not_null().default(0))
                .col(
                    ColumnDef::new(QueueJobs::State)
                        .custom(Alias::new("queue_job_state"))
                        .not_null()
                        .default("created"),
                )
                .col(ColumnDef::new(QueueJobs::LastError).json_binary())
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name("idx_queue_jobs_claim")
                .table(QueueJobs::Table)
                .col(QueueJobs::QueueName)
                .col(QueueJobs::State)
                .col(QueueJobs::AvailableAt)
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name("idx_queue_jobs_dedupe_key")
                .table(QueueJobs::Table)
                .col(QueueJobs::DedupeKey)
                .to_owned(),
        )
        .await
}

async fn create_audit_log(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(AuditLog::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(AuditLog::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key(),
                )
                .col(ColumnDef::new(AuditLog::ContestId).string().not_null())
                .col(ColumnDef::new(AuditLog::ChainId).big_integer().not_null())
                .col(
                    ColumnDef::new(AuditLog::Action)
                        .custom(Alias::new("audit_action"))
                        .not_null(),
                )
                .col(ColumnDef::new(AuditLog::Actor).string().not_null())
                .col(ColumnDef::new(AuditLog::Reason).string())
                .col(
                    ColumnDef::new(AuditLog::OccurredAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .col(
                    ColumnDef::new(AuditLog::Detail)
                        .json_binary()
                        .not_null()
                        .default(Expr::cust("'{}'::jsonb")),
                )
                .to_owned(),
        )
        .await
}

#[derive(DeriveIden)]
enum IngestionStreams {
    Table,
    ContestId,
    ChainId,
    RegistrarAddress,
    OtherAddresses,
    StartBlock,
    State,
    ActiveRpc,
    ErrorStreak,
    LagBlocks,
    NextPollAt,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RpcEndpoints {
    Table,
    Id,
    ChainId,
    EndpointId,
    Url,
    Priority,
    Enabled,
    FailCount,
    LastSuccessAt,
    CooldownUntil,
}

#[derive(DeriveIden)]
enum IngestionCursors {
    Table,
    Id,
    ContestId,
    ChainId,
    ContractAddress,
    CursorHeight,
    CursorLogIndex,
    CursorHash,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum IngestionEvents {
    Table,
    Id,
    ContestId,
    ChainId,
    TxHash,
    LogIndex,
    BlockNumber,
    EventType,
    Payload,
    ReorgFlag,
    BlockHash,
    OccurredAt,
}

#[derive(DeriveIden)]
enum MilestoneExecutions {
    Table,
    Id,
    IdempotencyKey,
    JobId,
    ContestId,
    ChainId,
    Milestone,
    SourceTxHash,
    SourceLogIndex,
    SourceBlockNumber,
    Status,
    Attempts,
    Payload,
    LastError,
    ActorContext,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ReconciliationReportLedgers {
    Table,
    Id,
    IdempotencyKey,
    ReportId,
    JobId,
    ContestId,
    ChainId,
    RangeFromBlock,
    RangeToBlock,
    GeneratedAt,
    Status,
    Attempts,
    Differences,
    Notifications,
    Payload,
    ActorContext,
    LastError,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum QueueJobs {
    Table,
    Id,
    QueueName,
    Payload,
    Attempt,
    RetryLimit,
    EnqueuedAt,
    AvailableAt,
    SingletonKey,
    DedupeKey,
    Priority,
    State,
    LastError,
}

#[derive(DeriveIden)]
enum AuditLog {
    Table,
    Id,
    ContestId,
    ChainId,
    Action,
    Actor,
    Reason,
    OccurredAt,
    Detail,
}
