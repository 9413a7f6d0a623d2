//! Chain gateway adapter (C4, §4.4).
//!
//! Grounded on `interchain-indexer-logic/src/indexers/avalanche/mod.rs`'s use
//! of `alloy::providers::Provider` + `alloy::rpc::types::Filter` to build an
//! `eth_getLogs` query. Unlike the teacher's always-on `LogStreamBuilder`
//! loop, this gateway exposes a single `pull_events` call that C6 and C7
//! invoke explicitly per tick/replay so ordering and cursor bounds stay in
//! the caller's control.
//!
//! Decoding a raw `alloy::rpc::types::Log` into an [`EventEnvelope`] is
//! delegated to a [`LogDecoder`] the caller supplies: the spec's Non-goals
//! exclude smart-contract semantics beyond the envelope shape, so this
//! module never hardcodes an ABI.

use std::{sync::Arc, time::Duration};

use alloy::{
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Filter, Log},
};
use alloy_json_rpc::RpcError;
use tokio::time::timeout;

use crate::{
    errors::CoreError,
    model::{EventCursor, EventEnvelope},
    rpc_pool::RpcEndpointManager,
};

#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    pub max_batch_size: usize,
    pub max_block_span: u64,
    pub pull_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 200,
            max_block_span: 2_000,
            pull_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Retryable,
    NonRetryable,
    NonRetryableFatal,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?} on endpoint {endpoint_id}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub endpoint_id: String,
    pub message: String,
}

impl From<GatewayError> for CoreError {
    fn from(err: GatewayError) -> Self {
        match err.kind {
            GatewayErrorKind::Retryable => CoreError::chain_unavailable(err.message),
            _ => CoreError::input_invalid(err.message),
        }
    }
}

/// Turns a raw log into the canonical envelope shape. The spec treats
/// contract ABIs as out of scope; a real deployment supplies one decoder per
/// contract family.
pub trait LogDecoder: Send + Sync {
    fn decode(&self, log: &Log, chain_id: u64) -> Option<EventEnvelope>;
}

#[derive(Debug, Clone)]
pub struct PullRequest {
    pub chain_id: u64,
    pub contract_address: Address,
    pub cursor: EventCursor,
    pub limit: usize,
    /// Upper block bound for replay (§4.7); `None` for the live loop, which
    /// always scans up to the chain head.
    pub to_block: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PullResult {
    pub events: Vec<EventEnvelope>,
    pub next_cursor: EventCursor,
    pub latest_block: u64,
    pub rpc_endpoint_id: String,
}

pub struct ChainGateway {
    rpc_pool: Arc<RpcEndpointManager>,
    decoder: Arc<dyn LogDecoder>,
    config: GatewayConfig,
}

impl ChainGateway {
    pub fn new(rpc_pool: Arc<RpcEndpointManager>, decoder: Arc<dyn LogDecoder>, config: GatewayConfig) -> Self {
        Self {
            rpc_pool,
            decoder,
            config,
        }
    }

    /// Pulls events strictly after `request.cursor`, sorted and bounded by
    /// `request.limit` (§4.4). Returns the unchanged cursor when no new
    /// events are found — the writer only advances on a non-empty batch.
    pub async fn pull_events(&self, request: PullRequest) -> Result<PullResult, GatewayError> {
        let selected = self
            .rpc_pool
            .select_endpoint(request.chain_id)
            .map_err(|err| GatewayError {
                kind: GatewayErrorKind::NonRetryableFatal,
                endpoint_id: "none".into(),
                message: err.message,
            })?;

        let provider = build_provider(&selected.url).map_err(|err| GatewayError {
            kind: GatewayErrorKind::NonRetryableFatal,
            endpoint_id: selected.endpoint_id.clone(),
            message: err,
        })?;

        let result = timeout(self.config.pull_timeout, self.pull_once(&provider, &request)).await;

        match result {
            Ok(Ok(pulled)) => {
                self.rpc_pool
                    .report_success(request.chain_id, &selected.endpoint_id);
                Ok(PullResult {
                    rpc_endpoint_id: selected.endpoint_id,
                    ..pulled
                })
            }
            Ok(Err(kind)) => {
                let reason = format!("{kind:?}");
                self.rpc_pool
                    .report_failure(request.chain_id, &selected.endpoint_id, &reason);
                Err(GatewayError {
                    kind,
                    endpoint_id: selected.endpoint_id,
                    message: reason,
                })
            }
            Err(_) => {
                self.rpc_pool
                    .report_failure(request.chain_id, &selected.endpoint_id, "timeout");
                Err(GatewayError {
                    kind: GatewayErrorKind::Retryable,
                    endpoint_id: selected.endpoint_id,
                    message: "pull_events timed out".into(),
                })
            }
        }
    }

    async fn pull_once(
        &self,
        provider: &DynProvider,
        request: &PullRequest,
    ) -> Result<PullResult, GatewayErrorKind> {
        let latest_block = provider
            .get_block_number()
            .await
            .map_err(classify_transport_error)?;

        if latest_block < request.cursor.block_number {
            return Ok(PullResult {
                events: Vec::new(),
                next_cursor: request.cursor,
                latest_block,
                rpc_endpoint_id: String::new(),
            });
        }

        let mut to_block = latest_block.min(request.cursor.block_number + self.config.max_block_span);
        if let Some(bound) = request.to_block {
            to_block = to_block.min(bound);
        }

        let filter = Filter::new()
            .address(request.contract_address)
            .from_block(request.cursor.block_number)
            .to_block(to_block);

        let logs = provider
            .get_logs(&filter)
            .await
            .map_err(classify_transport_error)?;

        let mut events: Vec<EventEnvelope> = logs
            .iter()
            .filter_map(|log| self.decoder.decode(log, request.chain_id))
            .filter(|event| event.cursor() > request.cursor)
            .collect();
        events.sort();
        events.truncate(request.limit.min(self.config.max_batch_size));

        let next_cursor = events.last().map(|e| e.cursor()).unwrap_or(request.cursor);

        Ok(PullResult {
            events,
            next_cursor,
            latest_block,
            rpc_endpoint_id: String::new(),
        })
    }
}

fn build_provider(url: &str) -> Result<DynProvider, String> {
    let parsed = url.parse().map_err(|e| format!("invalid RPC url: {e}"))?;
    Ok(ProviderBuilder::new().connect_http(parsed).erased())
}

fn classify_transport_error<E: std::fmt::Display>(err: RpcError<E>) -> GatewayErrorKind {
    match &err {
        RpcError::Transport(_) | RpcError::NullResp => GatewayErrorKind::Retryable,
        RpcError::ErrorResp(payload) => match payload.code {
            -32001 | 401 | 403 => GatewayErrorKind::NonRetryableFatal,
            -32000 => GatewayErrorKind::NonRetryableFatal,
            _ => GatewayErrorKind::NonRetryable,
        },
        RpcError::SerError(_) | RpcError::DeserError { .. } => GatewayErrorKind::NonRetryable,
        _ => GatewayErrorKind::NonRetryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_pool::{PoolConfig, RpcEndpointConfig};
    use std::collections::HashMap;

    struct NoopDecoder;
    impl LogDecoder for NoopDecoder {
        fn decode(&self, _log: &Log, _chain_id: u64) -> Option<EventEnvelope> {
            None
        }
    }

    fn gateway() -> ChainGateway {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            1,
            vec![RpcEndpointConfig {
                id: "p1".into(),
                url: "http://127.0.0.1:1".into(),
                priority: 0,
                enabled: true,
            }],
        );
        let pool = Arc::new(RpcEndpointManager::new(endpoints, PoolConfig::default()));
        ChainGateway::new(pool, Arc::new(NoopDecoder), GatewayConfig::default())
    }

    #[test]
    fn classify_error_resp_unauthorized_is_fatal() {
        let payload = alloy_json_rpc::ErrorPayload {
            code: 401,
            message: "unauthorized".into(),
            data: None,
        };
        let err: RpcError<String> = RpcError::ErrorResp(payload);
        assert_eq!(classify_transport_error(err), GatewayErrorKind::NonRetryableFatal);
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_failure_to_pool() {
        let gateway = gateway();
        let request = PullRequest {
            chain_id: 1,
            contract_address: Address::ZERO,
            cursor: EventCursor::GENESIS,
            limit: 10,
            to_block: None,
        };
        let err = gateway.pull_events(request).await.unwrap_err();
        assert_eq!(err.endpoint_id, "p1");
        let snap = gateway
            .rpc_pool
            .snapshot()
            .into_iter()
            .find(|e| e.endpoint_id == "p1")
            .unwrap();
        assert_eq!(snap.fail_count, 1);
    }
}
