//! JSON response shapes for the `eth` namespace: hex-prefixed quantities,
//! fixed-width hex data, and the block/transaction/receipt/log objects the
//! JSON-RPC wire format expects.

use alloy_consensus::{Header, Transaction as _, TxEnvelope, TxReceipt};
use alloy_primitives::{B256, U256};
use alloy_rlp::Encodable;
use serde::Serialize;
use vdb_evm::{BlockData, ReceiptData, TxData};
use vdb_index::LogResult;
use vdb_state::{Error, Proof, Result};

use crate::eth_json_types::{BigQuantity, EthAddress, EthHash, Quantity, UnformattedData};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcHeader {
    pub number: Quantity,
    pub hash: EthHash,
    pub parent_hash: EthHash,
    pub nonce: UnformattedData,
    pub mix_hash: EthHash,
    pub sha3_uncles: EthHash,
    pub logs_bloom: UnformattedData,
    pub state_root: EthHash,
    pub miner: EthAddress,
    pub difficulty: BigQuantity,
    pub extra_data: UnformattedData,
    pub size: Quantity,
    pub gas_limit: Quantity,
    pub gas_used: Quantity,
    pub timestamp: Quantity,
    pub transactions_root: EthHash,
    pub receipts_root: EthHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_difficulty: Option<BigQuantity>,
}

impl RpcHeader {
    pub fn new(hash: B256, header: &Header, total_difficulty: Option<U256>) -> Self {
        Self {
            number: Quantity(header.number),
            hash: hash.into(),
            parent_hash: header.parent_hash.into(),
            nonce: UnformattedData(header.nonce.to_vec()),
            mix_hash: header.mix_hash.into(),
            sha3_uncles: header.ommers_hash.into(),
            logs_bloom: UnformattedData(header.logs_bloom.as_slice().to_vec()),
            state_root: header.state_root.into(),
            miner: header.beneficiary.into(),
            difficulty: BigQuantity(header.difficulty),
            extra_data: UnformattedData(header.extra_data.to_vec()),
            size: Quantity(header.length() as u64),
            gas_limit: Quantity(header.gas_limit),
            gas_used: Quantity(header.gas_used),
            timestamp: Quantity(header.timestamp),
            transactions_root: header.transactions_root.into(),
            receipts_root: header.receipts_root.into(),
            base_fee_per_gas: header.base_fee_per_gas.map(Quantity),
            total_difficulty: total_difficulty.map(BigQuantity),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RpcBlockTransactions {
    Hashes(Vec<EthHash>),
    Full(Vec<RpcTransaction>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    #[serde(flatten)]
    pub header: RpcHeader,
    pub transactions: RpcBlockTransactions,
    pub uncles: Vec<EthHash>,
}

impl RpcBlock {
    pub fn new(
        block: &BlockData,
        uncle_hashes: Vec<B256>,
        total_difficulty: Option<U256>,
        full_transactions: bool,
    ) -> Result<Self> {
        let header = RpcHeader::new(block.hash, &block.header, total_difficulty);
        let transactions = if full_transactions {
            RpcBlockTransactions::Full(
                block
                    .transactions
                    .iter()
                    .map(|tx| RpcTransaction::from_tx(tx, block))
                    .collect::<Result<_>>()?,
            )
        } else {
            RpcBlockTransactions::Hashes(
                block.transactions.iter().map(|tx| tx.hash.into()).collect(),
            )
        };
        Ok(Self {
            header,
            transactions,
            uncles: uncle_hashes.into_iter().map(Into::into).collect(),
        })
    }
}

fn signature_parts(envelope: &TxEnvelope) -> (U256, U256, u64) {
    match envelope {
        TxEnvelope::Legacy(tx) => {
            let sig = tx.signature();
            (sig.r(), sig.s(), 27 + sig.v() as u64)
        }
        TxEnvelope::Eip2930(tx) => {
            let sig = tx.signature();
            (sig.r(), sig.s(), sig.v() as u64)
        }
        TxEnvelope::Eip1559(tx) => {
            let sig = tx.signature();
            (sig.r(), sig.s(), sig.v() as u64)
        }
        TxEnvelope::Eip4844(tx) => {
            let sig = tx.signature();
            (sig.r(), sig.s(), sig.v() as u64)
        }
        _ => (U256::ZERO, U256::ZERO, 0),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: EthHash,
    pub nonce: Quantity,
    pub block_hash: EthHash,
    pub block_number: Quantity,
    pub transaction_index: Quantity,
    pub from: EthAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<EthAddress>,
    pub value: BigQuantity,
    pub gas: Quantity,
    pub gas_price: BigQuantity,
    pub input: UnformattedData,
    #[serde(rename = "type")]
    pub transaction_type: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<Quantity>,
    pub r: BigQuantity,
    pub s: BigQuantity,
    pub v: Quantity,
}

impl RpcTransaction {
    pub fn from_tx(tx: &TxData, block: &BlockData) -> Result<Self> {
        let sender = tx
            .envelope
            .recover_signer()
            .map_err(|e| Error::invariant(format!("transaction signature: {e}")))?;
        let gas_price = tx
            .envelope
            .effective_gas_price(block.header.base_fee_per_gas);
        let (r, s, v) = signature_parts(&tx.envelope);
        Ok(Self {
            hash: tx.hash.into(),
            nonce: Quantity(tx.envelope.nonce()),
            block_hash: block.hash.into(),
            block_number: Quantity(block.header.number),
            transaction_index: Quantity(tx.index),
            from: sender.into(),
            to: tx.envelope.to().map(Into::into),
            value: BigQuantity(tx.envelope.value()),
            gas: Quantity(tx.envelope.gas_limit()),
            gas_price: BigQuantity(U256::from(gas_price)),
            input: UnformattedData(tx.envelope.input().to_vec()),
            transaction_type: Quantity(tx.envelope.tx_type() as u64),
            chain_id: tx.envelope.chain_id().map(Quantity),
            r: BigQuantity(r),
            s: BigQuantity(s),
            v: Quantity(v),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: EthAddress,
    pub topics: Vec<EthHash>,
    pub data: UnformattedData,
    pub block_number: Quantity,
    pub block_hash: EthHash,
    pub transaction_hash: EthHash,
    pub transaction_index: Quantity,
    pub log_index: Quantity,
    pub removed: bool,
}

impl RpcLog {
    /// From a joined index row, as `eth_getLogs` serves them.
    pub fn from_log_result(row: &LogResult) -> Result<Self> {
        let parse_hash = |s: &str| -> Result<EthHash> {
            s.parse::<B256>()
                .map(Into::into)
                .map_err(|_| Error::internal(format!("malformed hash in index: {s}")))
        };
        let topics = [&row.topic0, &row.topic1, &row.topic2, &row.topic3]
            .into_iter()
            .flatten()
            .map(|topic| parse_hash(topic))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            address: row
                .address
                .parse::<alloy_primitives::Address>()
                .map_err(|_| Error::internal(format!("malformed address in index: {}", row.address)))?
                .into(),
            topics,
            data: UnformattedData(row.log_data.clone()),
            block_number: Quantity(row.block_number.as_u64()?),
            block_hash: parse_hash(&row.block_hash)?,
            transaction_hash: parse_hash(&row.tx_hash)?,
            transaction_index: Quantity(row.txn_index as u64),
            log_index: Quantity(row.index as u64),
            removed: false,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: EthHash,
    pub transaction_index: Quantity,
    pub block_hash: EthHash,
    pub block_number: Quantity,
    pub from: EthAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<EthAddress>,
    pub cumulative_gas_used: Quantity,
    pub gas_used: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<EthAddress>,
    pub logs: Vec<RpcLog>,
    pub logs_bloom: UnformattedData,
    pub status: Quantity,
    #[serde(rename = "type")]
    pub transaction_type: Quantity,
    pub effective_gas_price: BigQuantity,
}

impl RpcReceipt {
    /// Builds the receipt at `index` within its block, deriving per-tx gas
    /// from cumulative gas and numbering logs block-wide.
    pub fn build(block: &BlockData, receipts: &[ReceiptData], index: usize) -> Result<Self> {
        let receipt = receipts.get(index).ok_or(Error::NotFound)?;
        let tx = block
            .transactions
            .get(index)
            .ok_or_else(|| Error::invariant("receipt without owning transaction"))?;
        let sender = tx
            .envelope
            .recover_signer()
            .map_err(|e| Error::invariant(format!("transaction signature: {e}")))?;

        let cumulative = receipt.envelope.cumulative_gas_used();
        let previous = if index == 0 {
            0
        } else {
            receipts[index - 1].envelope.cumulative_gas_used()
        };
        let first_log_index: u64 = receipts[..index]
            .iter()
            .map(|r| r.envelope.logs().len() as u64)
            .sum();

        let logs = receipt
            .envelope
            .logs()
            .iter()
            .enumerate()
            .map(|(offset, log)| RpcLog {
                address: log.address.into(),
                topics: log.topics().iter().copied().map(Into::into).collect(),
                data: UnformattedData(log.data.data.to_vec()),
                block_number: Quantity(block.header.number),
                block_hash: block.hash.into(),
                transaction_hash: tx.hash.into(),
                transaction_index: Quantity(tx.index),
                log_index: Quantity(first_log_index + offset as u64),
                removed: false,
            })
            .collect();

        let contract_address = match tx.envelope.to() {
            Some(_) => None,
            None => Some(sender.create(tx.envelope.nonce()).into()),
        };

        Ok(Self {
            transaction_hash: tx.hash.into(),
            transaction_index: Quantity(tx.index),
            block_hash: block.hash.into(),
            block_number: Quantity(block.header.number),
            from: sender.into(),
            to: tx.envelope.to().map(Into::into),
            cumulative_gas_used: Quantity(cumulative as u64),
            gas_used: Quantity(cumulative.saturating_sub(previous) as u64),
            contract_address,
            logs,
            logs_bloom: UnformattedData(receipt.envelope.bloom().as_slice().to_vec()),
            status: Quantity(receipt.envelope.status() as u64),
            transaction_type: Quantity(tx.envelope.tx_type() as u64),
            effective_gas_price: BigQuantity(U256::from(
                tx.envelope
                    .effective_gas_price(block.header.base_fee_per_gas),
            )),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcStorageProof {
    pub key: EthHash,
    pub value: BigQuantity,
    pub proof: Vec<UnformattedData>,
}

/// `eth_getProof` response: index-backed leaf IPLDs substantiate the values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcProof {
    pub address: EthAddress,
    pub balance: BigQuantity,
    pub nonce: Quantity,
    pub code_hash: EthHash,
    pub storage_hash: EthHash,
    pub account_proof: Vec<UnformattedData>,
    pub storage_proof: Vec<RpcStorageProof>,
}

impl From<Proof> for RpcProof {
    fn from(proof: Proof) -> Self {
        Self {
            address: proof.address.into(),
            balance: BigQuantity(proof.balance),
            nonce: Quantity(proof.nonce),
            code_hash: proof.code_hash.into(),
            storage_hash: proof.storage_root.into(),
            account_proof: proof
                .account_ipld
                .map(|ipld| vec![UnformattedData(ipld.to_vec())])
                .unwrap_or_default(),
            storage_proof: proof
                .storage
                .into_iter()
                .map(|slot| RpcStorageProof {
                    key: slot.key.into(),
                    value: BigQuantity(slot.value),
                    proof: slot
                        .ipld
                        .map(|ipld| vec![UnformattedData(ipld.to_vec())])
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }
}
