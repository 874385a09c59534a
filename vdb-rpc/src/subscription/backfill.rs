//! Historical payload materialization: the per-block retrieval behind a
//! subscription backfill, assembled from the index and the block store.

use vdb_index::{IndexStore, IpldStore, ReceiptFilter, StateFilter, StorageFilter, TxFilter};
use vdb_state::Result;

use super::{
    params::SubscriptionParams,
    payload::{IpldsResponse, StateNodeIpld, StorageNodeIpld},
};

/// The slice of the index a backfill iterates. The engine depends on this
/// seam rather than the concrete store so tests can feed canned blocks.
pub trait BackfillSource: Send + Sync + 'static {
    fn first_block_number(&self) -> Result<i64>;
    fn last_block_number(&self) -> Result<i64>;
    /// Responses for every header at a height that match the filter; empty
    /// responses are dropped by the caller.
    fn backfill_block(
        &self,
        params: &SubscriptionParams,
        number: u64,
    ) -> Result<Vec<IpldsResponse>>;
}

/// The real source: CID rows from the index, raw bytes from the block store.
pub struct IndexBackfill {
    index: IndexStore,
    ipld: IpldStore,
}

impl IndexBackfill {
    pub fn new(index: IndexStore) -> Self {
        let ipld = IpldStore::from_index(&index);
        Self { index, ipld }
    }
}

fn topics_array(topics: &[Vec<String>]) -> [Vec<String>; 4] {
    let mut array: [Vec<String>; 4] = Default::default();
    for (position, set) in topics.iter().take(4).enumerate() {
        array[position] = set.clone();
    }
    array
}

impl BackfillSource for IndexBackfill {
    fn first_block_number(&self) -> Result<i64> {
        self.index.first_block_number()
    }

    fn last_block_number(&self) -> Result<i64> {
        self.index.last_block_number()
    }

    fn backfill_block(
        &self,
        params: &SubscriptionParams,
        number: u64,
    ) -> Result<Vec<IpldsResponse>> {
        let headers = self.index.headers_by_number(number)?;
        let mut responses = Vec::with_capacity(headers.len());

        for header in headers {
            let mut response = IpldsResponse {
                block_number: number,
                ..Default::default()
            };

            if !params.header_filter.off {
                let header_ipld = self.index.header_ipld_by_hash(&header.block_hash)?;
                response.headers.push(header_ipld.data);
                if params.header_filter.uncles {
                    for uncle in self.index.uncle_iplds_by_block_hash(&header.block_hash)? {
                        response.uncles.push(uncle.data);
                    }
                }
            }

            let mut tx_hashes = Vec::new();
            if !params.tx_filter.off {
                let filter = TxFilter {
                    off: false,
                    src: params.tx_filter.src.clone(),
                    dst: params.tx_filter.dst.clone(),
                };
                let txs = self
                    .index
                    .tx_cids_by_header_id(&header.block_hash, number, &filter)?;
                let keys: Vec<String> = txs.iter().map(|tx| tx.mh_key.clone()).collect();
                let mut blocks = self.ipld.get_many(&keys)?;
                for tx in txs {
                    tx_hashes.push(tx.tx_hash.clone());
                    if let Some(data) = blocks.remove(&tx.mh_key) {
                        response.transactions.push(data.to_vec());
                    }
                }
            }

            if !params.receipt_filter.off {
                let filter = ReceiptFilter {
                    off: false,
                    log_addresses: params.receipt_filter.log_addresses.clone(),
                    topics: topics_array(&params.receipt_filter.topics),
                    match_txs: params.receipt_filter.match_txs,
                };
                let receipts = self.index.receipt_cids_by_filter(
                    &filter,
                    None,
                    Some(&header.block_hash),
                    &tx_hashes,
                )?;
                let keys: Vec<String> =
                    receipts.iter().map(|rct| rct.leaf_mh_key.clone()).collect();
                let mut blocks = self.ipld.get_many(&keys)?;
                for receipt in receipts {
                    if let Some(data) = blocks.remove(&receipt.leaf_mh_key) {
                        response.receipts.push(data.to_vec());
                    }
                }
            }

            if !params.state_filter.off {
                let filter = StateFilter {
                    off: false,
                    addresses: params.state_filter.addresses.clone(),
                    intermediate_nodes: params.state_filter.intermediate_nodes,
                };
                let nodes = self.index.state_cids_by_filter(&filter, &header.block_hash)?;
                let keys: Vec<String> = nodes.iter().map(|node| node.mh_key.clone()).collect();
                let mut blocks = self.ipld.get_many(&keys)?;
                for node in nodes {
                    if let Some(data) = blocks.remove(&node.mh_key) {
                        response.state_nodes.push(StateNodeIpld {
                            leaf_key: node.state_leaf_key.clone().unwrap_or_default(),
                            data: data.to_vec(),
                        });
                    }
                }
            }

            if !params.storage_filter.off {
                let filter = StorageFilter {
                    off: false,
                    addresses: params.storage_filter.addresses.clone(),
                    storage_keys: params.storage_filter.storage_keys.clone(),
                    intermediate_nodes: params.storage_filter.intermediate_nodes,
                };
                let nodes = self
                    .index
                    .storage_cids_by_filter(&filter, &header.block_hash)?;
                let keys: Vec<String> = nodes.iter().map(|node| node.mh_key.clone()).collect();
                let mut blocks = self.ipld.get_many(&keys)?;
                for node in nodes {
                    if let Some(data) = blocks.remove(&node.mh_key) {
                        response.storage_nodes.push(StorageNodeIpld {
                            state_leaf_key: node.state_leaf_key.clone().unwrap_or_default(),
                            storage_leaf_key: node.storage_leaf_key.clone().unwrap_or_default(),
                            data: data.to_vec(),
                        });
                    }
                }
            }

            if !response.is_empty() {
                responses.push(response);
            }
        }

        Ok(responses)
    }
}
