//! RPC endpoint manager (C2, §4.2).
//!
//! Grounded on `interchain-indexer-logic::provider_layers`'s layered
//! transport pool (per-node `parking_lot::RwLock<NodeState>`, priority
//! failover, cooldown-based recovery). Unlike the teacher, this manager is a
//! plain data structure rather than a `tower::Service` wrapped around the
//! `alloy` transport: C4 calls `select_endpoint`/`report_success`/
//! `report_failure` explicitly around each RPC attempt, so the
//! retryable/non-retryable classification the spec requires stays visible
//! to the caller instead of being swallowed inside a transparent retry
//! layer.

use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sea_orm::{sea_query::OnConflict, ActiveValue, ConnectionTrait, EntityTrait};
use serde::Deserialize;

use entity::rpc_endpoints;

use crate::{
    errors::CoreError,
    metrics::{RPC_FAILURES_TOTAL, RPC_SWITCH_TOTAL},
};

#[derive(Debug, Clone, Deserialize)]
pub struct RpcEndpointConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_endpoint_enabled")]
    pub enabled: bool,
}

fn default_endpoint_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct RpcChainConfig {
    #[serde(rename = "chainId")]
    chain_id: u64,
    endpoints: Vec<RpcEndpointConfig>,
}

/// Parses the `INDEXER_EVENT_RPCS` env var JSON: `[{chainId,endpoints:[...]}…]`
/// into the `chain_id -> endpoints` map `RpcEndpointManager::new` expects.
pub fn parse_rpc_endpoints_json(raw: &str) -> anyhow::Result<HashMap<u64, Vec<RpcEndpointConfig>>> {
    let chains: Vec<RpcChainConfig> = serde_json::from_str(raw)?;
    if chains.iter().any(|c| c.endpoints.is_empty()) {
        anyhow::bail!("INDEXER_EVENT_RPCS: every chain must list at least one endpoint");
    }
    Ok(chains.into_iter().map(|c| (c.chain_id, c.endpoints)).collect())
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct EndpointState {
    config: RpcEndpointConfig,
    fail_count: u32,
    last_success_at: Option<DateTime<Utc>>,
    cooldown_until: Option<SystemTime>,
}

impl EndpointState {
    fn is_cooling(&self, now: SystemTime) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

#[derive(Debug, Clone)]
pub struct SelectedEndpoint {
    pub endpoint_id: String,
    pub url: String,
    /// Set when every endpoint on the chain was cooling and we fell back to
    /// the one with the nearest `cooldownUntil` (§4.2 tie-break rule).
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub chain_id: u64,
    pub endpoint_id: String,
    pub url: String,
    pub priority: u32,
    pub enabled: bool,
    pub fail_count: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub cooling: bool,
}

struct SwitchRecord {
    chain_id: u64,
    from: String,
    to: String,
    #[allow(dead_code)]
    reason: String,
}

/// Shared, mutex-guarded RPC endpoint pool for every configured chain.
///
/// The URL list is immutable after load (§5); only per-endpoint counters and
/// cooldowns mutate, guarded by a single `parking_lot::RwLock` per chain to
/// keep contention local to one chain's pool.
pub struct RpcEndpointManager {
    chains: HashMap<u64, RwLock<Vec<EndpointState>>>,
    config: PoolConfig,
}

impl RpcEndpointManager {
    pub fn new(endpoints: HashMap<u64, Vec<RpcEndpointConfig>>, config: PoolConfig) -> Self {
        let chains = endpoints
            .into_iter()
            .map(|(chain_id, configs)| {
                let mut states: Vec<EndpointState> = configs
                    .into_iter()
                    .map(|config| EndpointState {
                        config,
                        fail_count: 0,
                        last_success_at: None,
                        cooldown_until: None,
                    })
                    .collect();
                states.sort_by(|a, b| {
                    a.config
                        .priority
                        .cmp(&b.config.priority)
                        .then_with(|| a.config.id.cmp(&b.config.id))
                });
                (chain_id, RwLock::new(states))
            })
            .collect();
        Self { chains, config }
    }

    pub fn select_endpoint(&self, chain_id: u64) -> Result<SelectedEndpoint, CoreError> {
        let Some(lock) = self.chains.get(&chain_id) else {
            return Err(CoreError::not_found(format!(
                "no RPC pool configured for chain {chain_id}"
            )));
        };
        let states = lock.read();
        let now = SystemTime::now();

        if let Some(state) = states
            .iter()
            .find(|s| s.config.enabled && !s.is_cooling(now))
        {
            return Ok(SelectedEndpoint {
                endpoint_id: state.config.id.clone(),
                url: state.config.url.clone(),
                degraded: false,
            });
        }

        // All enabled endpoints are cooling: fall back to whichever comes
        // back online soonest and treat it as a degraded success path.
        let fallback = states
            .iter()
            .filter(|s| s.config.enabled)
            .min_by_key(|s| s.cooldown_until.unwrap_or(now));

        match fallback {
            Some(state) => {
                tracing::warn!(
                    chain_id,
                    endpoint_id = %state.config.id,
                    "all RPC endpoints cooling down, using degraded fallback"
                );
                Ok(SelectedEndpoint {
                    endpoint_id: state.config.id.clone(),
                    url: state.config.url.clone(),
                    degraded: true,
                })
            }
            None => Err(CoreError::chain_unavailable(format!(
                "NO_ENDPOINT_AVAILABLE for chain {chain_id}"
            ))),
        }
    }

    pub fn report_success(&self, chain_id: u64, endpoint_id: &str) {
        let Some(lock) = self.chains.get(&chain_id) else {
            return;
        };
        let mut states = lock.write();
        if let Some(state) = states.iter_mut().find(|s| s.config.id == endpoint_id) {
            state.fail_count = 0;
            state.last_success_at = Some(Utc::now());
            state.cooldown_until = None;
        }
    }

    pub fn report_failure(&self, chain_id: u64, endpoint_id: &str, reason: &str) {
        RPC_FAILURES_TOTAL.with_label_values(&[reason]).inc();

        let switch = {
            let Some(lock) = self.chains.get(&chain_id) else {
                return;
            };
            let mut states = lock.write();
            let Some(index) = states.iter().position(|s| s.config.id == endpoint_id) else {
                return;
            };
            states[index].fail_count += 1;

            if states[index].fail_count < self.config.failure_threshold {
                return;
            }

            states[index].cooldown_until = Some(SystemTime::now() + self.config.cooldown);
            states[index].fail_count = 0;

            let next = states
                .iter()
                .filter(|s| s.config.id != endpoint_id && s.config.enabled && !s.is_cooling(SystemTime::now()))
                .min_by_key(|s| s.config.priority);

            next.map(|n| SwitchRecord {
                chain_id,
                from: endpoint_id.to_string(),
                to: n.config.id.clone(),
                reason: reason.to_string(),
            })
        };

        if let Some(switch) = switch {
            tracing::warn!(
                chain_id = switch.chain_id,
                from = %switch.from,
                to = %switch.to,
                "RPC endpoint switch"
            );
            RPC_SWITCH_TOTAL
                .with_label_values(&[&chain_id.to_string(), &switch.from, &switch.to])
                .inc();
        }
    }

    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let now = SystemTime::now();
        self.chains
            .iter()
            .flat_map(|(chain_id, lock)| {
                lock.read()
                    .iter()
                    .map(|state| EndpointSnapshot {
                        chain_id: *chain_id,
                        endpoint_id: state.config.id.clone(),
                        url: state.config.url.clone(),
                        priority: state.config.priority,
                        enabled: state.config.enabled,
                        fail_count: state.fail_count,
                        last_success_at: state.last_success_at,
                        cooling: state.is_cooling(now),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Flushes the in-memory snapshot into `rpc_endpoints` for observability
    /// (§6): the row is never read back to make routing decisions, only to
    /// answer status queries against a database a caller can join against.
    pub async fn persist_snapshot<C: ConnectionTrait>(&self, db: &C) -> Result<(), CoreError> {
        let rows: Vec<rpc_endpoints::ActiveModel> = self
            .snapshot()
            .into_iter()
            .map(|e| rpc_endpoints::ActiveModel {
                id: ActiveValue::NotSet,
                chain_id: ActiveValue::Set(e.chain_id as i64),
                endpoint_id: ActiveValue::Set(e.endpoint_id),
                url: ActiveValue::Set(e.url),
                priority: ActiveValue::Set(e.priority as i32),
                enabled: ActiveValue::Set(e.enabled),
                fail_count: ActiveValue::Set(e.fail_count as i32),
                last_success_at: ActiveValue::Set(e.last_success_at),
                cooldown_until: ActiveValue::Set(if e.cooling { Some(Utc::now()) } else { None }),
            })
            .collect();

        if rows.is_empty() {
            return Ok(());
        }

        rpc_endpoints::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::columns([rpc_endpoints::Column::ChainId, rpc_endpoints::Column::EndpointId])
                    .update_columns([
                        rpc_endpoints::Column::Url,
                        rpc_endpoints::Column::Priority,
                        rpc_endpoints::Column::Enabled,
                        rpc_endpoints::Column::FailCount,
                        rpc_endpoints::Column::LastSuccessAt,
                        rpc_endpoints::Column::CooldownUntil,
                    ])
                    .to_owned(),
            )
            .exec(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(threshold: u32, cooldown: Duration) -> RpcEndpointManager {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            1,
            vec![
                RpcEndpointConfig {
                    id: "p1".into(),
                    url: "http://p1".into(),
                    priority: 0,
                    enabled: true,
                },
                RpcEndpointConfig {
                    id: "p2".into(),
                    url: "http://p2".into(),
                    priority: 1,
                    enabled: true,
                },
            ],
        );
        RpcEndpointManager::new(
            endpoints,
            PoolConfig {
                failure_threshold: threshold,
                cooldown,
            },
        )
    }

    #[test]
    fn selects_lowest_priority_first() {
        let manager = manager(3, Duration::from_secs(60));
        let selected = manager.select_endpoint(1).unwrap();
        assert_eq!(selected.endpoint_id, "p1");
        assert!(!selected.degraded);
    }

    #[test]
    fn switches_after_failure_threshold_s2() {
        // Scenario S2: P1 fails 3 times with ECONNRESET, selectEndpoint
        // returns P2, one switch recorded, P1 cools down.
        let manager = manager(3, Duration::from_millis(60_000));
        for _ in 0..3 {
            manager.report_failure(1, "p1", "ECONNRESET");
        }
        let selected = manager.select_endpoint(1).unwrap();
        assert_eq!(selected.endpoint_id, "p2");
    }

    #[test]
    fn no_endpoint_available_when_all_disabled() {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            7,
            vec![RpcEndpointConfig {
                id: "only".into(),
                url: "http://only".into(),
                priority: 0,
                enabled: false,
            }],
        );
        let manager = RpcEndpointManager::new(endpoints, PoolConfig::default());
        let err = manager.select_endpoint(7).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::ChainUnavailable);
    }

    #[test]
    fn unknown_chain_is_not_found() {
        let manager = manager(3, Duration::from_secs(60));
        let err = manager.select_endpoint(999).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::NotFound);
    }

    #[test]
    fn report_success_clears_fail_count_and_cooldown() {
        let manager = manager(2, Duration::from_millis(50_000));
        manager.report_failure(1, "p1", "timeout");
        manager.report_success(1, "p1");
        let snap = manager
            .snapshot()
            .into_iter()
            .find(|e| e.endpoint_id == "p1")
            .unwrap();
        assert_eq!(snap.fail_count, 0);
        assert!(!snap.cooling);
    }

    #[test]
    fn degraded_fallback_when_all_cooling() {
        let manager = manager(1, Duration::from_secs(60));
        manager.report_failure(1, "p1", "timeout");
        manager.report_failure(1, "p2", "timeout");
        let selected = manager.select_endpoint(1).unwrap();
        assert!(selected.degraded);
    }

    #[tokio::test]
    async fn persist_snapshot_upserts_every_endpoint() {
        let manager = manager(3, Duration::from_secs(60));
        let db = sea_orm::MockDatabase::new(sea_orm::DatabaseBackend::Postgres)
            .append_exec_results([sea_orm::MockExecResult { last_insert_id: 0, rows_affected: 2 }])
            .into_connection();
        manager.persist_snapshot(&db).await.unwrap();
    }

    #[tokio::test]
    async fn persist_snapshot_is_noop_for_empty_pool() {
        let manager = RpcEndpointManager::new(HashMap::new(), PoolConfig::default());
        let db = sea_orm::MockDatabase::new(sea_orm::DatabaseBackend::Postgres).into_connection();
        manager.persist_snapshot(&db).await.unwrap();
    }
}
