//! Service configuration (§6 Configuration).
//!
//! Layered the way `interchain-indexer-server::settings::Settings` is: a
//! TOML file plus `CONTEST_INDEXER__<FIELD>` env var overrides via
//! [`ConfigSettings::build`]. `DatabaseSettings` is hand-rolled rather than
//! imported from `blockscout_service_launcher::database`, since that module
//! only exposes `initialize_postgres` in the pinned launcher version, not a
//! settings struct — see DESIGN.md.

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use blockscout_service_launcher::{
    launcher::{ConfigSettings, HttpServerSettings, MetricsSettings, ServerSettings},
    tracing::{JaegerSettings, TracingSettings},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// JSON file listing the streams the live loop and replay engine track
    /// (C3's `IngestionRegistry::load` source).
    pub streams_config: PathBuf,

    /// `{topic0: eventKind}` map the log decoder consults (§4.4 port note).
    #[serde(default = "default_event_topics")]
    pub event_topics_json: String,

    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub rpc: RpcSettings,
    #[serde(default)]
    pub ingestion: IngestionSettings,

    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "CONTEST_INDEXER";
}

fn default_event_topics() -> String {
    "{}".to_string()
}

impl Settings {
    pub fn default(database_url: String) -> Self {
        Self {
            streams_config: PathBuf::from("config/streams.json"),
            event_topics_json: default_event_topics(),
            database: DatabaseSettings {
                url: database_url,
                pg_boss_url: None,
                create_database: false,
                run_migrations: false,
            },
            rpc: Default::default(),
            ingestion: Default::default(),
            server: ServerSettings {
                http: HttpServerSettings {
                    addr: SocketAddr::from_str("0.0.0.0:4005").unwrap(),
                    ..Default::default()
                },
                ..Default::default()
            },
            metrics: Default::default(),
            tracing: Default::default(),
            jaeger: Default::default(),
        }
    }
}

/// Folds `PG_BOSS_URL` into the primary database connection per the §6 port
/// note: the durable queue and the event tables share one Postgres instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    pub url: String,
    pub pg_boss_url: Option<String>,
    pub create_database: bool,
    pub run_migrations: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            pg_boss_url: None,
            create_database: false,
            run_migrations: false,
        }
    }
}

impl DatabaseSettings {
    /// The URL the queue dispatcher/workers connect through; falls back to
    /// the primary connection when unset (§6).
    pub fn queue_url(&self) -> &str {
        self.pg_boss_url.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RpcSettings {
    /// Raw `INDEXER_EVENT_RPCS` JSON array, parsed by
    /// `crate_indexer_logic::rpc_pool::parse_rpc_endpoints_json` at startup.
    pub endpoints_json: String,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            endpoints_json: "[]".to_string(),
            failure_threshold: 3,
            cooldown_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IngestionSettings {
    pub poll_interval_ms: u64,
    pub max_batch: usize,
    pub registry_refresh_ms: u64,
    pub stream_failure_threshold: u32,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 6_000,
            max_batch: 200,
            registry_refresh_ms: 60_000,
            stream_failure_threshold: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_matches_port_note() {
        assert_eq!(Settings::SERVICE_NAME, "CONTEST_INDEXER");
    }

    #[test]
    fn queue_url_falls_back_to_primary_database() {
        let settings = DatabaseSettings {
            url: "postgres://primary".into(),
            pg_boss_url: None,
            create_database: false,
            run_migrations: false,
        };
        assert_eq!(settings.queue_url(), "postgres://primary");
    }

    #[test]
    fn queue_url_prefers_pg_boss_url_when_set() {
        let settings = DatabaseSettings {
            url: "postgres://primary".into(),
            pg_boss_url: Some("postgres://queue".into()),
            create_database: false,
            run_migrations: false,
        };
        assert_eq!(settings.queue_url(), "postgres://queue");
    }
}
