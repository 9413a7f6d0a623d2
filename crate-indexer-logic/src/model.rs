//! Canonical event/cursor/stream types shared by every component (C1, §4.1).
//!
//! Block numbers are `u64` internally and string-encoded at JSON boundaries
//! (see [`stringified_u64`]) so they survive round-trips through JavaScript
//! callers without losing precision past the 53-bit float mantissa.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `u64` string-encoded at JSON boundaries; plug in with
/// `#[serde(with = "stringified_u64")]`.
pub mod stringified_u64 {
    use serde::{Deserializer, Serializer};
    use serde_with::{DeserializeAs, DisplayFromStr, SerializeAs};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DisplayFromStr::serialize_as(value, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        DisplayFromStr::deserialize_as(deserializer)
    }
}

/// The kind of on-chain event observed in a log (§3 `EventEnvelope.type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Registration,
    Rebalance,
    Settlement,
    Reward,
    Redemption,
    Deployment,
}

impl EventKind {
    /// Event kinds the live loop derives a milestone from (§4.6 step 4).
    pub fn milestone(self) -> Option<MilestoneKind> {
        match self {
            EventKind::Settlement => Some(MilestoneKind::Settled),
            EventKind::Reward => Some(MilestoneKind::RewardReady),
            EventKind::Redemption => Some(MilestoneKind::RedemptionReady),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Registration => "registration",
            EventKind::Rebalance => "rebalance",
            EventKind::Settlement => "settlement",
            EventKind::Reward => "reward",
            EventKind::Redemption => "redemption",
            EventKind::Deployment => "deployment",
        }
    }
}

/// A business-visible milestone derived from an event (§4.6, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Settled,
    RewardReady,
    RedemptionReady,
}

impl MilestoneKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneKind::Settled => "settled",
            MilestoneKind::RewardReady => "reward_ready",
            MilestoneKind::RedemptionReady => "redemption_ready",
        }
    }
}

impl std::str::FromStr for MilestoneKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "settled" => Ok(MilestoneKind::Settled),
            "reward_ready" => Ok(MilestoneKind::RewardReady),
            "redemption_ready" => Ok(MilestoneKind::RedemptionReady),
            other => Err(anyhow::anyhow!("unknown milestone kind: {other}")),
        }
    }
}

/// A monotone progress marker on a stream (§3 `EventCursor`).
///
/// Ordering is the lexicographic pair `(block_number, log_index)`, derived
/// directly so callers get `<`/`>=` comparisons for free when enforcing the
/// non-decreasing invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventCursor {
    pub block_number: u64,
    pub log_index: u32,
}

impl EventCursor {
    pub const GENESIS: EventCursor = EventCursor {
        block_number: 0,
        log_index: 0,
    };

    pub fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }

    /// True when advancing from `self` to `next` is a legal, non-regressing
    /// step (§4.5 invariant B).
    pub fn advances_to(&self, next: &EventCursor) -> bool {
        next >= self
    }
}

impl std::fmt::Display for EventCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.block_number, self.log_index)
    }
}

/// Chain-provenance metadata captured alongside an envelope (§3 `derivedAt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedAt {
    pub block_number: u64,
    pub block_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// One log observed on chain (§3 `EventEnvelope`).
///
/// Equality is defined by `(chain_id, tx_hash, log_index)` per §4.1, not by
/// structural equality of every field — two envelopes re-derived for the
/// same log (e.g. during replay) compare equal even if `payload` differs in
/// field ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub kind: EventKind,
    pub chain_id: u64,
    pub block_number: u64,
    pub log_index: u32,
    pub tx_hash: String,
    pub payload: serde_json::Value,
    pub reorg_flag: bool,
    pub derived_at: DerivedAt,
}

impl EventEnvelope {
    pub fn cursor(&self) -> EventCursor {
        EventCursor::new(self.block_number, self.log_index)
    }
}

impl PartialEq for EventEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id
            && self.tx_hash == other.tx_hash
            && self.log_index == other.log_index
    }
}
impl Eq for EventEnvelope {}

impl PartialOrd for EventEnvelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for EventEnvelope {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cursor().cmp(&other.cursor())
    }
}

/// The tuple `(contestId, chainId)` identifying a tracked stream (GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    pub contest_id: String,
    pub chain_id: u64,
}

impl StreamId {
    pub fn new(contest_id: impl Into<String>, chain_id: u64) -> Self {
        Self {
            contest_id: contest_id.into(),
            chain_id,
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.contest_id, self.chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_orders_lexicographically() {
        let a = EventCursor::new(100, 5);
        let b = EventCursor::new(100, 6);
        let c = EventCursor::new(101, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(a.advances_to(&b));
        assert!(!b.advances_to(&a));
    }

    #[test]
    fn envelope_equality_ignores_payload_and_reorg_flag() {
        let base = EventEnvelope {
            kind: EventKind::Settlement,
            chain_id: 1,
            block_number: 10,
            log_index: 2,
            tx_hash: "0xabc".into(),
            payload: serde_json::json!({"a": 1}),
            reorg_flag: false,
            derived_at: DerivedAt {
                block_number: 10,
                block_hash: "0xblock".into(),
                timestamp: Utc::now(),
            },
        };
        let mut replay = base.clone();
        replay.payload = serde_json::json!({"a": 2});
        replay.reorg_flag = true;
        assert_eq!(base, replay);
    }

    #[test]
    fn event_kind_milestone_mapping_matches_spec() {
        assert_eq!(EventKind::Settlement.milestone(), Some(MilestoneKind::Settled));
        assert_eq!(EventKind::Reward.milestone(), Some(MilestoneKind::RewardReady));
        assert_eq!(
            EventKind::Redemption.milestone(),
            Some(MilestoneKind::RedemptionReady)
        );
        assert_eq!(EventKind::Registration.milestone(), None);
        assert_eq!(EventKind::Rebalance.milestone(), None);
        assert_eq!(EventKind::Deployment.milestone(), None);
    }
}
