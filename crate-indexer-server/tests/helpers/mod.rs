use std::{path::PathBuf, time::Duration};

use blockscout_service_launcher::{test_database::TestDbGuard, test_server};
use crate_indexer_server::Settings;
use reqwest::Url;
use tokio::time::timeout;

pub async fn init_db(db_prefix: &str, test_name: &str) -> TestDbGuard {
    let db_name = format!("{db_prefix}_{test_name}");
    TestDbGuard::new::<migration::Migrator>(db_name.as_str()).await
}

/// Builds settings for an in-process server pointed at the fixture
/// `config/streams.json`, with metrics/tracing disabled the way the
/// teacher's own test helper silences them.
pub async fn init_indexer_server<F>(db_url: String, settings_setup: F) -> Url
where
    F: Fn(Settings) -> Settings,
{
    let (settings, base) = {
        let mut settings = Settings::default(db_url);
        let (server_settings, base) = test_server::get_test_server_settings();
        settings.server = server_settings;
        settings.metrics.enabled = false;
        settings.tracing.enabled = false;
        settings.jaeger.enabled = false;

        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let workspace_root = manifest_dir.parent().unwrap();
        settings.streams_config = workspace_root.join("config/streams.json");

        (settings_setup(settings), base)
    };

    tokio::spawn(async move { crate_indexer_server::run(settings).await });

    let client = reqwest::Client::new();
    let healthz = base.join("healthz").unwrap();
    let wait_healthy = async {
        loop {
            if client.get(healthz.clone()).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    if timeout(Duration::from_secs(10), wait_healthy).await.is_err() {
        panic!("server did not start in time");
    }

    base
}
