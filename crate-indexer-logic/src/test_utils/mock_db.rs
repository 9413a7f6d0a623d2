use chrono::Utc;
use entity::{ingestion_cursors, ingestion_streams, rpc_endpoints, sea_orm_active_enums::StreamState};
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};

pub async fn fill_mock_indexer_database(db: &DatabaseConnection) {
    let now = Utc::now();

    ingestion_streams::Entity::insert_many([
        ingestion_streams::ActiveModel {
            contest_id: Set("contest-alpha".to_string()),
            chain_id: Set(1),
            registrar_address: Set("0x0000000000000000000000000000000000000001".to_string()),
            other_addresses: Set(serde_json::json!([])),
            start_block: Set(1_000),
            state: Set(StreamState::Live),
            active_rpc: Set(Some("test-endpoint".to_string())),
            error_streak: Set(0),
            lag_blocks: Set(3),
            next_poll_at: Set(None),
            metadata: Set(serde_json::json!({})),
            created_at: Set(now),
            updated_at: Set(now),
        },
        ingestion_streams::ActiveModel {
            contest_id: Set("contest-beta".to_string()),
            chain_id: Set(100),
            registrar_address: Set("0x0000000000000000000000000000000000000002".to_string()),
            other_addresses: Set(serde_json::json!([])),
            start_block: Set(2_000),
            state: Set(StreamState::Paused),
            active_rpc: Set(None),
            error_streak: Set(5),
            lag_blocks: Set(0),
            next_poll_at: Set(None),
            metadata: Set(serde_json::json!({})),
            created_at: Set(now),
            updated_at: Set(now),
        },
    ])
    .exec(db)
    .await
    .unwrap();

    ingestion_cursors::Entity::insert_many([
        ingestion_cursors::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            contest_id: Set("contest-alpha".to_string()),
            chain_id: Set(1),
            contract_address: Set("0x0000000000000000000000000000000000000001".to_string()),
            cursor_height: Set(1_200),
            cursor_log_index: Set(4),
            cursor_hash: Set(Some("0xdeadbeef".to_string())),
            updated_at: Set(now),
        },
        ingestion_cursors::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            contest_id: Set("contest-beta".to_string()),
            chain_id: Set(100),
            contract_address: Set("0x0000000000000000000000000000000000000002".to_string()),
            cursor_height: Set(2_000),
            cursor_log_index: Set(0),
            cursor_hash: Set(None),
            updated_at: Set(now),
        },
    ])
    .exec(db)
    .await
    .unwrap();

    rpc_endpoints::Entity::insert_many([
        rpc_endpoints::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            chain_id: Set(1),
            endpoint_id: Set("test-endpoint".to_string()),
            url: Set("http://localhost:8545".to_string()),
            priority: Set(0),
            enabled: Set(true),
            fail_count: Set(0),
            last_success_at: Set(Some(now)),
            cooldown_until: Set(None),
        },
        rpc_endpoints::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            chain_id: Set(100),
            endpoint_id: Set("flaky-endpoint".to_string()),
            url: Set("http://localhost:8546".to_string()),
            priority: Set(1),
            enabled: Set(false),
            fail_count: Set(5),
            last_success_at: Set(None),
            cooldown_until: Set(Some(now)),
        },
    ])
    .exec(db)
    .await
    .unwrap();
}
