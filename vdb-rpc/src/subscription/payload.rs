//! Payload shapes on both sides of the engine: the converted payloads the
//! indexer pushes in, and the RLP response bodies fanned out to subscribers.

use alloy_rlp::RlpEncodable;

pub const EMPTY_FLAG: u8 = 0;
pub const BACK_FILL_COMPLETE_FLAG: u8 = 1;

/// What a subscriber receives. `data` is the RLP of an [`IpldsResponse`];
/// the sentinel closing a backfill carries no data and the completion flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPayload {
    pub data: Vec<u8>,
    pub err: String,
    pub flag: u8,
    pub height: i64,
}

impl SubscriptionPayload {
    pub fn from_response(response: &IpldsResponse) -> Self {
        Self {
            data: alloy_rlp::encode(response),
            err: String::new(),
            flag: EMPTY_FLAG,
            height: response.block_number as i64,
        }
    }

    pub fn backfill_complete() -> Self {
        Self {
            flag: BACK_FILL_COMPLETE_FLAG,
            ..Default::default()
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            err: message,
            ..Default::default()
        }
    }
}

/// One transaction inside a converted payload.
#[derive(Debug, Clone)]
pub struct TxPayload {
    pub hash: String,
    pub index: u64,
    pub src: String,
    pub dst: String,
    pub data: Vec<u8>,
}

/// Address/topic context of one log, used by receipt filtering.
#[derive(Debug, Clone)]
pub struct LogMeta {
    pub address: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReceiptPayload {
    pub tx_hash: String,
    pub data: Vec<u8>,
    pub logs: Vec<LogMeta>,
}

#[derive(Debug, Clone)]
pub struct StateNodePayload {
    pub state_leaf_key: String,
    pub node_type: i32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct StorageNodePayload {
    pub state_leaf_key: String,
    pub storage_leaf_key: String,
    pub node_type: i32,
    pub data: Vec<u8>,
}

/// A freshly ingested block as the indexer hands it over: every IPLD already
/// converted, plus the metadata the filters select on.
#[derive(Debug, Clone)]
pub struct ConvertedPayload {
    pub block_number: u64,
    pub block_hash: String,
    pub total_difficulty: String,
    pub header_rlp: Vec<u8>,
    pub uncles: Vec<Vec<u8>>,
    pub transactions: Vec<TxPayload>,
    pub receipts: Vec<ReceiptPayload>,
    pub state_nodes: Vec<StateNodePayload>,
    pub storage_nodes: Vec<StorageNodePayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable)]
pub struct StateNodeIpld {
    pub leaf_key: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable)]
pub struct StorageNodeIpld {
    pub state_leaf_key: String,
    pub storage_leaf_key: String,
    pub data: Vec<u8>,
}

/// The filter-defined response body, RLP-encoded into
/// [`SubscriptionPayload::data`].
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable)]
pub struct IpldsResponse {
    pub block_number: u64,
    pub headers: Vec<Vec<u8>>,
    pub uncles: Vec<Vec<u8>>,
    pub transactions: Vec<Vec<u8>>,
    pub receipts: Vec<Vec<u8>>,
    pub state_nodes: Vec<StateNodeIpld>,
    pub storage_nodes: Vec<StorageNodeIpld>,
}

impl IpldsResponse {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
            && self.uncles.is_empty()
            && self.transactions.is_empty()
            && self.receipts.is_empty()
            && self.state_nodes.is_empty()
            && self.storage_nodes.is_empty()
    }
}
