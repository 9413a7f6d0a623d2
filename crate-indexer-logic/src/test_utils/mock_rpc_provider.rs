use std::time::Duration;

use alloy::{
    providers::{DynProvider, ProviderBuilder},
    transports::mock::Asserter,
};

use crate::rpc_pool::{PoolConfig, RpcEndpointConfig};

/// A single-endpoint config with a deterministic id, for tests that don't
/// care about failover between multiple RPCs.
pub fn create_test_endpoint() -> RpcEndpointConfig {
    RpcEndpointConfig {
        id: "test-endpoint".to_string(),
        url: "http://localhost".to_string(), // unused in mock mode
        priority: 0,
        enabled: true,
    }
}

pub fn create_test_endpoint_with_id(id: u32) -> RpcEndpointConfig {
    let mut cfg = create_test_endpoint();
    cfg.id = format!("test-endpoint-{id}");
    cfg
}

pub fn create_test_pool_config() -> PoolConfig {
    PoolConfig {
        failure_threshold: 3,
        cooldown: Duration::from_millis(50),
    }
}

/// Builds a `DynProvider` backed by an `Asserter`, returning the asserter so
/// the test can push expected responses into it before calling the gateway.
pub fn create_mock_provider_with_asserter() -> (Asserter, DynProvider) {
    let asserter = Asserter::new();
    let provider = ProviderBuilder::new()
        .connect_mocked_client(asserter.clone())
        .erased();
    (asserter, provider)
}
