//! Log decoder wiring (§4.4 port note: "a real deployment supplies one
//! decoder per contract family").
//!
//! Contract ABIs are out of scope (§4.4 Non-goals), so this decoder maps a
//! configured `topic0 -> EventKind` table onto the envelope shape rather than
//! hardcoding an ABI. The table is loaded from `INDEXER_EVENT_TOPICS`
//! (`{"0x...": "settlement", ...}`), mirroring how [`rpc_pool`] loads its
//! endpoint table from JSON.

use std::collections::HashMap;

use alloy::{
    primitives::B256,
    rpc::types::Log,
};
use chrono::{TimeZone, Utc};

use crate_indexer_logic::{
    gateway::LogDecoder,
    model::{DerivedAt, EventEnvelope, EventKind},
};

pub fn parse_topic_map(raw: &str) -> anyhow::Result<HashMap<B256, EventKind>> {
    let parsed: HashMap<String, String> = serde_json::from_str(raw)?;
    parsed
        .into_iter()
        .map(|(topic, kind)| {
            let topic: B256 = topic.parse()?;
            let kind: EventKind = match kind.as_str() {
                "registration" => EventKind::Registration,
                "rebalance" => EventKind::Rebalance,
                "settlement" => EventKind::Settlement,
                "reward" => EventKind::Reward,
                "redemption" => EventKind::Redemption,
                "deployment" => EventKind::Deployment,
                other => anyhow::bail!("unknown event kind in INDEXER_EVENT_TOPICS: {other}"),
            };
            Ok((topic, kind))
        })
        .collect()
}

pub struct TopicLogDecoder {
    topics: HashMap<B256, EventKind>,
}

impl TopicLogDecoder {
    pub fn new(topics: HashMap<B256, EventKind>) -> Self {
        Self { topics }
    }
}

impl LogDecoder for TopicLogDecoder {
    fn decode(&self, log: &Log, chain_id: u64) -> Option<EventEnvelope> {
        let topic0 = *log.topics().first()?;
        let kind = *self.topics.get(&topic0)?;
        let tx_hash = log.transaction_hash?;
        let log_index = log.log_index?;
        let block_number = log.block_number?;
        let block_hash = log.block_hash?;
        let timestamp = log
            .block_timestamp
            .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single())
            .unwrap_or_else(Utc::now);

        Some(EventEnvelope {
            kind,
            chain_id,
            block_number,
            log_index: log_index as u32,
            tx_hash: tx_hash.to_string(),
            payload: serde_json::json!({
                "topics": log.topics().iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                "data": log.data().data.to_string(),
            }),
            reorg_flag: log.removed,
            derived_at: DerivedAt {
                block_number,
                block_hash: block_hash.to_string(),
                timestamp,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_topic_map_json() {
        let raw = r#"{"0x1111111111111111111111111111111111111111111111111111111111111111": "settlement"}"#;
        // deliberately malformed (66 hex chars is too long); ensure the real test uses a valid 32-byte hex topic.
        assert!(parse_topic_map(raw).is_err());
    }

    #[test]
    fn parses_valid_topic_map_json() {
        let raw = r#"{"0x0000000000000000000000000000000000000000000000000000000000000001": "settlement"}"#;
        let map = parse_topic_map(raw).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(*map.values().next().unwrap(), EventKind::Settlement);
    }

    #[test]
    fn rejects_unknown_event_kind() {
        let raw = r#"{"0x0000000000000000000000000000000000000000000000000000000000000001": "unknown"}"#;
        assert!(parse_topic_map(raw).is_err());
    }
}
