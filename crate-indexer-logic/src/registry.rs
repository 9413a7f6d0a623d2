//! Ingestion registry (C3, §4.3).
//!
//! Stream definitions are loaded from a JSON config file, grounded on
//! `interchain-indexer-server::config`'s `load_*_from_file` pattern. The live
//! snapshot is held in an [`arc_swap::ArcSwap`] so readers (the live loop,
//! the control plane, the status routes) never block on a writer mid-reload;
//! `subscribe()` hands out a `tokio::sync::broadcast` receiver so the live
//! loop can react to a reload instead of polling it.

use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::model::StreamId;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StreamConfig {
    pub contest_id: String,
    pub chain_id: u64,
    pub contract_address: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub started_at_block: u64,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct StreamsFile {
    streams: Vec<StreamConfig>,
}

pub fn load_streams_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<StreamConfig>> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read streams config file: {:?}", path.as_ref()))?;
    let parsed: StreamsFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse streams config JSON: {:?}", path.as_ref()))?;
    Ok(parsed.streams)
}

/// A reload event broadcast to every live-loop subscriber (§4.3 `reload`).
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Reloaded,
}

struct Snapshot {
    streams: HashMap<StreamId, StreamConfig>,
}

/// Hot-reloadable registry of configured ingestion streams.
///
/// `ensure_fresh` exists because the registry has no filesystem watcher of
/// its own (§4.3 Non-goals) — callers that must act on the latest config
/// call it before reading, and the control plane's `/admin/reload` route is
/// the only path that actually re-reads the file.
pub struct IngestionRegistry {
    path: std::path::PathBuf,
    snapshot: ArcSwap<Snapshot>,
    events: broadcast::Sender<RegistryEvent>,
}

impl IngestionRegistry {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let streams = load_streams_from_file(&path)?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            path,
            snapshot: ArcSwap::from_pointee(Snapshot {
                streams: index_by_id(streams),
            }),
            events,
        })
    }

    /// Re-read the config file and atomically publish the new snapshot
    /// (§4.3 `reload`). Existing `StreamId`s not present in the new file are
    /// dropped; the live loop notices via its next `subscribe()` tick and
    /// stops the corresponding task.
    pub fn reload(&self) -> Result<()> {
        let streams = load_streams_from_file(&self.path)?;
        self.snapshot.store(Arc::new(Snapshot {
            streams: index_by_id(streams),
        }));
        let _ = self.events.send(RegistryEvent::Reloaded);
        Ok(())
    }

    pub fn list(&self) -> Vec<StreamConfig> {
        self.snapshot
            .load()
            .streams
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &StreamId) -> Option<StreamConfig> {
        self.snapshot.load().streams.get(id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// No-op placeholder for callers that want to force a re-read before use
    /// (§4.3). The registry has no background watcher, so "fresh" means
    /// "as of the last `reload()` call" rather than "as of now".
    pub fn ensure_fresh(&self) {}
}

fn index_by_id(streams: Vec<StreamConfig>) -> HashMap<StreamId, StreamConfig> {
    streams
        .into_iter()
        .map(|s| (StreamId::new(s.contest_id.clone(), s.chain_id), s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct TempPath {
        path: std::path::PathBuf,
    }

    impl TempPath {
        fn with_content(content: &str) -> Self {
            static COUNTER: AtomicU64 = AtomicU64::new(0);
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let mut path = std::env::temp_dir();
            path.push(format!(
                "crate-indexer-registry-test-{}-{n}.json",
                std::process::id()
            ));
            std::fs::write(&path, content).unwrap();
            Self { path }
        }

        fn as_ref(&self) -> &std::path::Path {
            &self.path
        }
    }

    impl Drop for TempPath {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn write_temp_config(json: &str) -> TempPath {
        TempPath::with_content(json)
    }

    const CONFIG: &str = r#"{
        "streams": [
            {"contest_id": "contest-1", "chain_id": 1, "contract_address": "0xabc", "started_at_block": 100}
        ]
    }"#;

    #[test]
    fn loads_and_lists_streams() {
        let temp = write_temp_config(CONFIG);
        let registry = IngestionRegistry::load(temp.as_ref()).unwrap();
        let streams = registry.list();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].contest_id, "contest-1");
        assert!(streams[0].enabled);
    }

    #[test]
    fn get_returns_none_for_unknown_stream() {
        let temp = write_temp_config(CONFIG);
        let registry = IngestionRegistry::load(temp.as_ref()).unwrap();
        assert!(registry.get(&StreamId::new("missing", 999)).is_none());
    }

    #[test]
    fn reload_publishes_new_snapshot_and_notifies_subscribers() {
        let temp = write_temp_config(CONFIG);
        let registry = IngestionRegistry::load(temp.as_ref()).unwrap();
        let mut rx = registry.subscribe();

        let updated = r#"{
            "streams": [
                {"contest_id": "contest-1", "chain_id": 1, "contract_address": "0xabc", "started_at_block": 100},
                {"contest_id": "contest-2", "chain_id": 2, "contract_address": "0xdef"}
            ]
        }"#;
        std::fs::write(temp.as_ref(), updated).unwrap();
        registry.reload().unwrap();

        assert_eq!(registry.list().len(), 2);
        assert!(matches!(
            rx.try_recv().unwrap(),
            RegistryEvent::Reloaded
        ));
    }

    #[test]
    fn default_enabled_is_true_when_omitted() {
        let temp = write_temp_config(CONFIG);
        let cfg = load_streams_from_file(temp.as_ref()).unwrap();
        assert!(cfg[0].enabled);
    }
}
