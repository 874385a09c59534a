use std::sync::Arc;

use alloy_consensus::{Header, Transaction as _, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Bytes, Log, B256, U256};
use alloy_rlp::Decodable;
use revm::primitives::{
    BlockEnv, CfgEnvWithHandlerCfg, EnvWithHandlerCfg, TransactTo, TxEnv,
};
use tracing::debug;
use vdb_index::{IndexStore, IpldStore, ReceiptFilter};
use vdb_state::{BlockRef, Error, GroupCache, GroupCacheConfig, Result, StateReader};

use crate::config::EvmConfig;

/// A transaction reassembled from its IPLD, with index context.
#[derive(Debug, Clone)]
pub struct TxData {
    pub hash: B256,
    pub index: u64,
    pub cid: String,
    pub envelope: TxEnvelope,
    pub raw: Bytes,
}

/// A block reassembled from the index: decoded header plus ordered decoded
/// transactions. The header carries the parent linkage; uncles and receipts
/// are materialized lazily by their own lookups.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub hash: B256,
    pub cid: String,
    pub header: Header,
    pub transactions: Vec<TxData>,
}

/// A receipt reassembled from its IPLD, in transaction order.
#[derive(Debug, Clone)]
pub struct ReceiptData {
    pub cid: String,
    pub tx_index: u64,
    pub envelope: alloy_consensus::ReceiptEnvelope,
    pub raw: Bytes,
}

/// A log flattened out of a block's receipts with its position context.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub log: Log,
    pub tx_index: u64,
    pub log_index: u64,
    pub tx_hash: B256,
}

/// Where a canonical transaction lives.
#[derive(Debug, Clone, Copy)]
pub struct TxLocation {
    pub block_hash: B256,
    pub block_number: u64,
    pub index: u64,
}

/// The host surface the EVM, tracer and RPC layer call into: canonical
/// header/block/receipt lookup plus state views scoped to a block.
#[derive(Clone)]
pub struct Backend {
    index: IndexStore,
    ipld: IpldStore,
    cache: Arc<GroupCache>,
    config: EvmConfig,
}

fn parse_hash(hash: &str) -> Result<B256> {
    hash.parse()
        .map_err(|_| Error::internal(format!("malformed hash in index: {hash}")))
}

fn hash_str(hash: &B256) -> String {
    format!("{hash:#x}")
}

/// Receipt IPLDs are stored either as the raw typed receipt or wrapped in
/// the receipt-trie leaf node; accept both.
fn decode_receipt_ipld(data: &[u8]) -> Result<alloy_consensus::ReceiptEnvelope> {
    if let Ok(envelope) = alloy_consensus::ReceiptEnvelope::decode_2718(&mut &data[..]) {
        return Ok(envelope);
    }
    let value = vdb_state::decode::decode_storage_leaf(data)
        .map_err(|_| Error::invariant("receipt ipld is neither raw nor a trie leaf"))?;
    alloy_consensus::ReceiptEnvelope::decode_2718(&mut value.as_ref())
        .map_err(|e| Error::invariant(format!("receipt rlp: {e}")))
}

impl Backend {
    pub fn new(index: IndexStore, config: EvmConfig, cache_config: &GroupCacheConfig) -> Self {
        let ipld = IpldStore::from_index(&index);
        let cache = GroupCache::group(cache_config);
        Self {
            index,
            ipld,
            cache,
            config,
        }
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    pub fn ipld(&self) -> &IpldStore {
        &self.ipld
    }

    pub fn config(&self) -> &EvmConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain.chain_id
    }

    pub fn latest_block_number(&self) -> Result<u64> {
        Ok(self.index.last_block_number()? as u64)
    }

    /// Canonical resolution of any block reference, including the `latest`
    /// tag and numeric tags.
    pub fn resolve_ref(&self, at: BlockRef) -> Result<vdb_state::ResolvedBlock> {
        use vdb_state::StateSource;
        self.index.resolve_block(at)
    }

    pub fn header_by_hash(&self, hash: B256) -> Result<Header> {
        let ipld = self.index.header_ipld_by_hash(&hash_str(&hash))?;
        Header::decode(&mut ipld.data.as_slice())
            .map_err(|e| Error::invariant(format!("header rlp: {e}")))
    }

    pub fn header_by_number(&self, number: u64) -> Result<Header> {
        let hash = self
            .index
            .canonical_hash(number)?
            .ok_or(Error::NotFound)?;
        self.header_by_hash(parse_hash(&hash)?)
    }

    pub fn header_by_ref(&self, at: BlockRef) -> Result<(B256, Header)> {
        let resolved = self.resolve_ref(at)?;
        Ok((resolved.hash, self.header_by_hash(resolved.hash)?))
    }

    pub fn block_by_hash(&self, hash: B256) -> Result<BlockData> {
        debug!(%hash, "assembling block");
        let assembled = self.index.header_and_tx_cids_by_hash(&hash_str(&hash), None)?;
        let header = Header::decode(&mut assembled.header_ipld.as_slice())
            .map_err(|e| Error::invariant(format!("header rlp: {e}")))?;

        let mut transactions = Vec::with_capacity(assembled.transactions.len());
        for tx in assembled.transactions {
            let envelope = TxEnvelope::decode_2718(&mut tx.data.as_slice())
                .map_err(|e| Error::invariant(format!("transaction rlp: {e}")))?;
            transactions.push(TxData {
                hash: parse_hash(&tx.tx_hash)?,
                index: tx.index as u64,
                cid: tx.cid,
                envelope,
                raw: Bytes::from(tx.data),
            });
        }

        Ok(BlockData {
            hash,
            cid: assembled.header.cid,
            header,
            transactions,
        })
    }

    pub fn block_by_number(&self, number: u64) -> Result<BlockData> {
        let hash = self
            .index
            .canonical_hash(number)?
            .ok_or(Error::NotFound)?;
        self.block_by_hash(parse_hash(&hash)?)
    }

    pub fn block_by_ref(&self, at: BlockRef) -> Result<BlockData> {
        let resolved = self.resolve_ref(at)?;
        self.block_by_hash(resolved.hash)
    }

    /// Receipts of a block, ordered by transaction index.
    pub fn receipts_by_block_hash(&self, hash: B256) -> Result<Vec<ReceiptData>> {
        let iplds = self.index.receipt_iplds_by_block_hash(&hash_str(&hash))?;
        iplds
            .into_iter()
            .enumerate()
            .map(|(tx_index, ipld)| {
                let envelope = decode_receipt_ipld(&ipld.data)?;
                Ok(ReceiptData {
                    cid: ipld.cid,
                    tx_index: tx_index as u64,
                    envelope,
                    raw: Bytes::from(ipld.data),
                })
            })
            .collect()
    }

    /// All logs of a block in `(tx_index, log_index)` order, flattened from
    /// its receipts.
    pub fn logs_by_block_hash(&self, hash: B256) -> Result<Vec<LogEntry>> {
        let block = self.block_by_hash(hash)?;
        let receipts = self.receipts_by_block_hash(hash)?;
        let mut entries = Vec::new();
        let mut log_index = 0u64;
        for receipt in &receipts {
            let tx_hash = block
                .transactions
                .get(receipt.tx_index as usize)
                .map(|tx| tx.hash)
                .unwrap_or_default();
            for log in receipt.envelope.logs() {
                entries.push(LogEntry {
                    log: log.clone(),
                    tx_index: receipt.tx_index,
                    log_index,
                    tx_hash,
                });
                log_index += 1;
            }
        }
        Ok(entries)
    }

    pub fn td_by_hash(&self, hash: B256) -> Result<U256> {
        let header = self.index.header_by_hash(&hash_str(&hash))?;
        header
            .td
            .0
            .parse()
            .map_err(|_| Error::internal(format!("malformed td in index: {}", header.td)))
    }

    /// Locates a transaction in its canonical block.
    pub fn transaction_location(&self, tx_hash: B256) -> Result<TxLocation> {
        let record = self.index.tx_cid_by_hash(&hash_str(&tx_hash), None)?;
        Ok(TxLocation {
            block_hash: parse_hash(&record.header_id)?,
            block_number: record.block_number.as_u64()?,
            index: record.index as u64,
        })
    }

    /// A state view scoped to the referenced block.
    pub fn state_at(&self, at: BlockRef) -> Result<StateReader<IndexStore>> {
        StateReader::new(self.index.clone(), self.cache.clone(), at)
    }

    /// The state a block's transactions executed against: its parent's.
    pub fn state_at_parent_of(&self, block: &BlockData) -> Result<StateReader<IndexStore>> {
        if block.header.number == 0 {
            return self.state_at(BlockRef::Hash(block.hash));
        }
        self.state_at(BlockRef::Hash(block.header.parent_hash))
    }

    /// Fills a [`TxEnv`] from a decoded chain transaction for replay.
    pub fn tx_env(&self, tx: &TxData) -> Result<TxEnv> {
        let sender = tx
            .envelope
            .recover_signer()
            .map_err(|e| Error::invariant(format!("transaction signature: {e}")))?;
        let mut env = TxEnv::default();
        env.caller = sender;
        env.gas_limit = tx.envelope.gas_limit();
        env.gas_price = U256::from(tx.envelope.max_fee_per_gas());
        env.gas_priority_fee = tx
            .envelope
            .max_priority_fee_per_gas()
            .map(U256::from);
        env.transact_to = match tx.envelope.to() {
            Some(to) => TransactTo::Call(to),
            None => TransactTo::Create,
        };
        env.value = tx.envelope.value();
        env.data = tx.envelope.input().clone();
        env.nonce = Some(tx.envelope.nonce());
        env.chain_id = tx.envelope.chain_id();
        Ok(env)
    }

    /// The execution environment for replaying under a block's own header.
    pub fn call_env_for_header(&self, header: &Header, tx: TxEnv) -> EnvWithHandlerCfg {
        let spec_id = self.config.chain.spec_id(header.number);
        let mut cfg = CfgEnvWithHandlerCfg::new_with_spec_id(Default::default(), spec_id);
        cfg.chain_id = self.config.chain.chain_id;
        let block = BlockEnv {
            number: U256::from(header.number),
            coinbase: header.beneficiary,
            timestamp: U256::from(header.timestamp),
            gas_limit: U256::from(header.gas_limit),
            basefee: U256::from(header.base_fee_per_gas.unwrap_or_default()),
            difficulty: header.difficulty,
            prevrandao: Some(header.mix_hash),
            ..Default::default()
        };
        EnvWithHandlerCfg::new_with_cfg_env(cfg, block, tx)
    }

    /// Uncle headers of a block, decoded from their IPLDs.
    pub fn uncles_by_block_hash(&self, hash: B256) -> Result<Vec<(String, Header)>> {
        let iplds = self.index.uncle_iplds_by_block_hash(&hash_str(&hash))?;
        iplds
            .into_iter()
            .map(|ipld| {
                let header = Header::decode(&mut ipld.data.as_slice())
                    .map_err(|e| Error::invariant(format!("uncle rlp: {e}")))?;
                Ok((ipld.cid, header))
            })
            .collect()
    }

    /// The filtered-logs retrieval, passed through for the RPC layer.
    pub fn filtered_logs(
        &self,
        filter: &ReceiptFilter,
        block_hash: Option<B256>,
        block_number: Option<u64>,
    ) -> Result<Vec<vdb_index::LogResult>> {
        let hash = block_hash.map(|hash| hash_str(&hash));
        self.index
            .filtered_logs(filter, hash.as_deref(), block_number)
    }
}
