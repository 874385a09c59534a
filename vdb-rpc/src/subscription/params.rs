//! Subscription filter specifications. Filters reach the engine as one
//! tagged record with explicit sections per payload kind; two subscriptions
//! with an identical RLP fingerprint share a type bucket and are filtered
//! once per payload.

use alloy_primitives::{keccak256, Address, B256};
use alloy_rlp::RlpEncodable;
use serde::Deserialize;

use super::payload::{ConvertedPayload, IpldsResponse, LogMeta, StateNodeIpld, StorageNodeIpld};

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, Deserialize)]
#[serde(default)]
pub struct HeaderFilterSpec {
    pub off: bool,
    pub uncles: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, Deserialize)]
#[serde(default)]
pub struct TxFilterSpec {
    pub off: bool,
    pub src: Vec<String>,
    pub dst: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, Deserialize)]
#[serde(default)]
pub struct ReceiptFilterSpec {
    pub off: bool,
    pub log_addresses: Vec<String>,
    pub topics: Vec<Vec<String>>,
    pub match_txs: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, Deserialize)]
#[serde(default)]
pub struct StateFilterSpec {
    pub off: bool,
    pub addresses: Vec<String>,
    pub intermediate_nodes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, Deserialize)]
#[serde(default)]
pub struct StorageFilterSpec {
    pub off: bool,
    pub addresses: Vec<String>,
    pub storage_keys: Vec<String>,
    pub intermediate_nodes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, Deserialize)]
#[serde(default)]
pub struct SubscriptionParams {
    pub backfill: bool,
    pub backfill_only: bool,
    /// First block of interest; clamped to the index's range.
    pub start: u64,
    /// Last block of interest; 0 means open-ended.
    pub end: u64,
    pub header_filter: HeaderFilterSpec,
    pub tx_filter: TxFilterSpec,
    pub receipt_filter: ReceiptFilterSpec,
    pub state_filter: StateFilterSpec,
    pub storage_filter: StorageFilterSpec,
}

fn hex_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn contains_hex(set: &[String], value: &str) -> bool {
    set.iter().any(|candidate| hex_eq(candidate, value))
}

fn leaf_key_of(address: &str) -> Option<String> {
    let parsed: Address = address.parse().ok()?;
    Some(format!("{:#x}", keccak256(parsed)))
}

impl ReceiptFilterSpec {
    /// Position `i` matches when the log's topic `i` is in `topics[i]`; an
    /// absent or empty position matches anything.
    fn log_matches(&self, log: &LogMeta) -> bool {
        if !self.log_addresses.is_empty() && !contains_hex(&self.log_addresses, &log.address) {
            return false;
        }
        for (position, set) in self.topics.iter().enumerate() {
            if set.is_empty() {
                continue;
            }
            match log.topics.get(position) {
                Some(topic) if contains_hex(set, topic) => {}
                _ => return false,
            }
        }
        true
    }
}

impl SubscriptionParams {
    /// The subscription type: the keccak hash of the RLP-serialized filter
    /// specification.
    pub fn type_hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// Applies every filter section to one converted payload, producing the
    /// response body delivered to the bucket.
    pub fn filter(&self, payload: &ConvertedPayload) -> IpldsResponse {
        let mut response = IpldsResponse {
            block_number: payload.block_number,
            ..Default::default()
        };

        if !self.header_filter.off {
            response.headers.push(payload.header_rlp.clone());
            if self.header_filter.uncles {
                response.uncles = payload.uncles.clone();
            }
        }

        let mut matched_tx_hashes = Vec::new();
        if !self.tx_filter.off {
            for tx in &payload.transactions {
                let src_ok =
                    self.tx_filter.src.is_empty() || contains_hex(&self.tx_filter.src, &tx.src);
                let dst_ok =
                    self.tx_filter.dst.is_empty() || contains_hex(&self.tx_filter.dst, &tx.dst);
                if src_ok && dst_ok {
                    matched_tx_hashes.push(tx.hash.clone());
                    response.transactions.push(tx.data.clone());
                }
            }
        }

        if !self.receipt_filter.off {
            for receipt in &payload.receipts {
                let by_logs = receipt
                    .logs
                    .iter()
                    .any(|log| self.receipt_filter.log_matches(log));
                let by_tx = self.receipt_filter.match_txs
                    && contains_hex(&matched_tx_hashes, &receipt.tx_hash);
                let unrestricted = self.receipt_filter.log_addresses.is_empty()
                    && self.receipt_filter.topics.iter().all(Vec::is_empty)
                    && !self.receipt_filter.match_txs;
                if unrestricted || by_logs || by_tx {
                    response.receipts.push(receipt.data.clone());
                }
            }
        }

        if !self.state_filter.off {
            let keys: Vec<String> = self
                .state_filter
                .addresses
                .iter()
                .filter_map(|address| leaf_key_of(address))
                .collect();
            for node in &payload.state_nodes {
                if !self.state_filter.intermediate_nodes && node.node_type != 2 {
                    continue;
                }
                if !keys.is_empty() && !contains_hex(&keys, &node.state_leaf_key) {
                    continue;
                }
                response.state_nodes.push(StateNodeIpld {
                    leaf_key: node.state_leaf_key.clone(),
                    data: node.data.clone(),
                });
            }
        }

        if !self.storage_filter.off {
            let keys: Vec<String> = self
                .storage_filter
                .addresses
                .iter()
                .filter_map(|address| leaf_key_of(address))
                .collect();
            for node in &payload.storage_nodes {
                if !self.storage_filter.intermediate_nodes && node.node_type != 2 {
                    continue;
                }
                if !keys.is_empty() && !contains_hex(&keys, &node.state_leaf_key) {
                    continue;
                }
                if !self.storage_filter.storage_keys.is_empty()
                    && !contains_hex(&self.storage_filter.storage_keys, &node.storage_leaf_key)
                {
                    continue;
                }
                response.storage_nodes.push(StorageNodeIpld {
                    state_leaf_key: node.state_leaf_key.clone(),
                    storage_leaf_key: node.storage_leaf_key.clone(),
                    data: node.data.clone(),
                });
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::payload::{ReceiptPayload, TxPayload};

    fn payload_with_logs(logs: Vec<LogMeta>) -> ConvertedPayload {
        ConvertedPayload {
            block_number: 7,
            block_hash: "0xabc".into(),
            total_difficulty: "1".into(),
            header_rlp: vec![0xc0],
            uncles: vec![],
            transactions: vec![TxPayload {
                hash: "0xt1".into(),
                index: 0,
                src: "0xaaaa".into(),
                dst: "0xbbbb".into(),
                data: vec![1],
            }],
            receipts: vec![ReceiptPayload {
                tx_hash: "0xt1".into(),
                data: vec![2],
                logs,
            }],
            state_nodes: vec![],
            storage_nodes: vec![],
        }
    }

    #[test]
    fn identical_params_share_a_type_hash() {
        let a = SubscriptionParams::default();
        let b = SubscriptionParams::default();
        assert_eq!(a.type_hash(), b.type_hash());

        let c = SubscriptionParams {
            start: 5,
            ..Default::default()
        };
        assert_ne!(a.type_hash(), c.type_hash());
    }

    #[test]
    fn topic_matrix_matches_positionally() {
        let spec = ReceiptFilterSpec {
            topics: vec![
                vec!["0x04".into(), "0x05".into()],
                vec!["0x06".into(), "0x07".into()],
            ],
            ..Default::default()
        };
        let hit = LogMeta {
            address: "0xdead".into(),
            topics: vec!["0x04".into(), "0x06".into()],
        };
        let miss = LogMeta {
            address: "0xdead".into(),
            topics: vec!["0x04".into(), "0x09".into()],
        };
        assert!(spec.log_matches(&hit));
        assert!(!spec.log_matches(&miss));
    }

    #[test]
    fn restrictive_topics_drop_receipts() {
        let params = SubscriptionParams {
            receipt_filter: ReceiptFilterSpec {
                topics: vec![vec!["0x04".into()], vec!["0x07".into()]],
                ..Default::default()
            },
            ..Default::default()
        };
        let payload = payload_with_logs(vec![LogMeta {
            address: "0xdead".into(),
            topics: vec!["0x04".into(), "0x06".into()],
        }]);
        assert!(params.filter(&payload).receipts.is_empty());
    }

    #[test]
    fn unrestricted_receipt_filter_passes_everything() {
        let params = SubscriptionParams::default();
        let payload = payload_with_logs(vec![]);
        assert_eq!(params.filter(&payload).receipts.len(), 1);
    }
}
