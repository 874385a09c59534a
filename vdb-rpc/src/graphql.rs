//! GraphQL resolvers: a thin reshaping layer over the index store and the
//! execution backend. Response shapes expose the CID and raw IPLD bytes
//! alongside the semantic fields.

use alloy_primitives::{Address, B256, U256};
use async_graphql::{Context, InputObject, Object, SimpleObject};
use vdb_index::{HeaderWithTxs, ReceiptFilter, TransactionWithIpld};
use vdb_state::{BlockRef, Error};

use crate::{hex, resources::RpcResources, rpc_types::RpcBlock};

#[derive(Debug, Clone, SimpleObject)]
pub struct EthTransactionCid {
    pub cid: String,
    pub tx_hash: String,
    pub index: i32,
    pub src: String,
    pub dst: String,
    pub block_number: String,
    pub ipld_block: String,
}

impl From<TransactionWithIpld> for EthTransactionCid {
    fn from(tx: TransactionWithIpld) -> Self {
        Self {
            cid: tx.cid,
            tx_hash: tx.tx_hash,
            index: tx.index,
            src: tx.src,
            dst: tx.dst,
            block_number: tx.block_number.0,
            ipld_block: hex::encode(&tx.data),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct EthHeaderCid {
    pub cid: String,
    pub block_number: String,
    pub block_hash: String,
    pub parent_hash: String,
    pub state_root: String,
    pub td: String,
    pub ipld_block: String,
    pub transactions: Vec<EthTransactionCid>,
}

impl From<HeaderWithTxs> for EthHeaderCid {
    fn from(assembled: HeaderWithTxs) -> Self {
        Self {
            cid: assembled.header.cid,
            block_number: assembled.header.block_number.0,
            block_hash: assembled.header.block_hash,
            parent_hash: assembled.header.parent_hash,
            state_root: assembled.header.state_root,
            td: assembled.header.td.0,
            ipld_block: hex::encode(&assembled.header_ipld),
            transactions: assembled
                .transactions
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlLog {
    pub cid: String,
    pub ipld_block: String,
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub index: i32,
    pub tx_hash: String,
    pub status: i32,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlStorage {
    pub cid: Option<String>,
    pub value: String,
    pub ipld_block: Option<String>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlBlock {
    pub cid: String,
    pub ipld_block: String,
    /// The full RPC block object (header fields, transactions, uncles).
    pub block: async_graphql::Json<RpcBlock>,
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct HeaderCidCondition {
    pub block_number: Option<String>,
    pub block_hash: Option<String>,
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct GqlLogFilter {
    pub block_hash: Option<String>,
    pub block_number: Option<String>,
    pub addresses: Option<Vec<String>>,
    pub topics: Option<Vec<Vec<String>>>,
}

fn parse_hash(value: &str) -> async_graphql::Result<B256> {
    value
        .parse()
        .map_err(|_| async_graphql::Error::new(format!("malformed hash: {value}")))
}

fn parse_number(value: &str) -> async_graphql::Result<u64> {
    value
        .parse()
        .map_err(|_| async_graphql::Error::new(format!("malformed block number: {value}")))
}

fn receipt_filter(filter: &GqlLogFilter) -> ReceiptFilter {
    let mut topics: [Vec<String>; 4] = Default::default();
    for (position, set) in filter.topics.iter().flatten().take(4).enumerate() {
        topics[position] = set.clone();
    }
    ReceiptFilter {
        off: false,
        log_addresses: filter.addresses.clone().unwrap_or_default(),
        topics,
        match_txs: false,
    }
}

fn log_rows_to_gql(rows: Vec<vdb_index::LogResult>) -> Vec<GqlLog> {
    rows.into_iter()
        .map(|row| GqlLog {
            cid: row.leaf_cid,
            ipld_block: hex::encode(&row.data),
            address: row.address,
            topics: [row.topic0, row.topic1, row.topic2, row.topic3]
                .into_iter()
                .flatten()
                .collect(),
            data: hex::encode(&row.log_data),
            index: row.index,
            tx_hash: row.tx_hash,
            status: row.post_status,
        })
        .collect()
}

pub struct Query;

#[Object]
impl Query {
    /// A block by number and/or hash; `null` selects the head of the index.
    async fn block(
        &self,
        ctx: &Context<'_>,
        number: Option<String>,
        hash: Option<String>,
    ) -> async_graphql::Result<Option<GqlBlock>> {
        let resources = ctx.data::<RpcResources>()?;
        let at = match (&number, &hash) {
            (_, Some(hash)) => BlockRef::Hash(parse_hash(hash)?),
            (Some(number), None) => BlockRef::Number(parse_number(number)?),
            (None, None) => BlockRef::Latest,
        };
        let block = resources
            .blocking(move |backend| {
                let block = backend.block_by_ref(at)?;
                let cid = block.cid.clone();
                let raw = backend.index().header_ipld_by_hash(&format!("{:#x}", block.hash))?;
                let rpc = crate::handlers::block::rpc_block(&backend, block, true)?;
                Ok((cid, raw.data, rpc))
            })
            .await;
        match block {
            Ok((cid, raw, rpc)) => Ok(Some(GqlBlock {
                cid,
                ipld_block: hex::encode(&raw),
                block: async_graphql::Json(rpc),
            })),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(async_graphql::Error::new(e.to_string())),
        }
    }

    /// Canonical blocks over an inclusive range; `to` defaults to the head.
    async fn blocks(
        &self,
        ctx: &Context<'_>,
        from: String,
        to: Option<String>,
    ) -> async_graphql::Result<Vec<GqlBlock>> {
        let resources = ctx.data::<RpcResources>()?;
        let from = parse_number(&from)?;
        let to = to.as_deref().map(parse_number).transpose()?;
        let blocks = resources
            .blocking(move |backend| {
                let to = match to {
                    Some(to) => to,
                    None => backend.latest_block_number()?,
                };
                let mut out = Vec::new();
                for number in from..=to {
                    let block = match backend.block_by_number(number) {
                        Ok(block) => block,
                        Err(Error::NotFound) => continue,
                        Err(e) => return Err(e),
                    };
                    let cid = block.cid.clone();
                    let raw = backend
                        .index()
                        .header_ipld_by_hash(&format!("{:#x}", block.hash))?;
                    let rpc = crate::handlers::block::rpc_block(&backend, block, true)?;
                    out.push((cid, raw.data, rpc));
                }
                Ok(out)
            })
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(blocks
            .into_iter()
            .map(|(cid, raw, rpc)| GqlBlock {
                cid,
                ipld_block: hex::encode(&raw),
                block: async_graphql::Json(rpc),
            })
            .collect())
    }

    /// A canonical transaction by hash, with its CID and raw bytes.
    async fn transaction(
        &self,
        ctx: &Context<'_>,
        hash: String,
    ) -> async_graphql::Result<Option<EthTransactionCid>> {
        let resources = ctx.data::<RpcResources>()?;
        let tx_hash = parse_hash(&hash)?;
        let result = resources
            .blocking(move |backend| {
                let record = backend.index().tx_cid_by_hash(&format!("{tx_hash:#x}"), None)?;
                let ipld = backend.index().tx_ipld_by_hash(&record.tx_hash)?;
                Ok(EthTransactionCid {
                    cid: record.cid,
                    tx_hash: record.tx_hash,
                    index: record.index,
                    src: record.src,
                    dst: record.dst,
                    block_number: record.block_number.0,
                    ipld_block: hex::encode(&ipld.data),
                })
            })
            .await;
        match result {
            Ok(tx) => Ok(Some(tx)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(async_graphql::Error::new(e.to_string())),
        }
    }

    /// Logs matching a filter, scoped to a hash or height.
    async fn logs(
        &self,
        ctx: &Context<'_>,
        filter: GqlLogFilter,
    ) -> async_graphql::Result<Vec<GqlLog>> {
        let resources = ctx.data::<RpcResources>()?;
        let receipt_filter = receipt_filter(&filter);
        let block_hash = filter.block_hash.as_deref().map(parse_hash).transpose()?;
        let block_number = filter
            .block_number
            .as_deref()
            .map(parse_number)
            .transpose()?;
        let rows = resources
            .blocking(move |backend| {
                backend.filtered_logs(&receipt_filter, block_hash, block_number)
            })
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(log_rows_to_gql(rows))
    }

    /// The storage slot value at a block, with the backing leaf CID/IPLD.
    async fn get_storage_at(
        &self,
        ctx: &Context<'_>,
        block_hash: String,
        contract: String,
        slot: String,
    ) -> async_graphql::Result<Option<GqlStorage>> {
        let resources = ctx.data::<RpcResources>()?;
        let hash = parse_hash(&block_hash)?;
        let address: Address = contract
            .parse()
            .map_err(|_| async_graphql::Error::new(format!("malformed address: {contract}")))?;
        let slot: U256 = slot
            .parse()
            .map_err(|_| async_graphql::Error::new(format!("malformed slot: {slot}")))?;
        let slot = B256::from(slot);

        let proof = resources
            .blocking(move |backend| {
                backend
                    .state_at(BlockRef::Hash(hash))?
                    .proof(address, &[slot])
            })
            .await;
        match proof {
            Ok(proof) => Ok(proof.storage.into_iter().next().map(|entry| GqlStorage {
                cid: entry.cid,
                value: format!("{:#x}", B256::from(entry.value)),
                ipld_block: entry.ipld.map(|ipld| hex::encode(&ipld)),
            })),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(async_graphql::Error::new(e.to_string())),
        }
    }

    /// Logs of one block, optionally restricted to contract addresses.
    async fn get_logs(
        &self,
        ctx: &Context<'_>,
        block_hash: String,
        block_number: Option<String>,
        addresses: Option<Vec<String>>,
    ) -> async_graphql::Result<Vec<GqlLog>> {
        let resources = ctx.data::<RpcResources>()?;
        let hash = parse_hash(&block_hash)?;
        let number = block_number.as_deref().map(parse_number).transpose()?;
        let filter = ReceiptFilter {
            off: false,
            log_addresses: addresses.unwrap_or_default(),
            topics: Default::default(),
            match_txs: false,
        };
        let rows = resources
            .blocking(move |backend| backend.filtered_logs(&filter, Some(hash), number))
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(log_rows_to_gql(rows))
    }

    /// Header CIDs matching a condition, each with its eager-joined
    /// transactions.
    async fn all_eth_header_cids(
        &self,
        ctx: &Context<'_>,
        condition: HeaderCidCondition,
    ) -> async_graphql::Result<Vec<EthHeaderCid>> {
        let resources = ctx.data::<RpcResources>()?;
        let number = condition
            .block_number
            .as_deref()
            .map(parse_number)
            .transpose()?;
        let hash = condition.block_hash.clone();
        let headers = resources
            .blocking(move |backend| match (hash, number) {
                (Some(hash), number) => backend
                    .index()
                    .header_and_tx_cids_by_hash(&hash, number)
                    .map(|assembled| vec![assembled]),
                (None, Some(number)) => backend.index().header_and_tx_cids_by_number(number),
                (None, None) => Err(Error::BadRequest(
                    "condition requires blockNumber or blockHash".to_string(),
                )),
            })
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(headers.into_iter().map(Into::into).collect())
    }

    /// A transaction CID restricted to its canonical block.
    async fn eth_transaction_cid_by_tx_hash(
        &self,
        ctx: &Context<'_>,
        tx_hash: String,
        block_number: Option<String>,
    ) -> async_graphql::Result<Option<EthTransactionCid>> {
        let resources = ctx.data::<RpcResources>()?;
        let number = block_number.as_deref().map(parse_number).transpose()?;
        let result = resources
            .blocking(move |backend| {
                let record = backend.index().tx_cid_by_hash(&tx_hash, number)?;
                let ipld = backend.index().tx_ipld_by_hash(&record.tx_hash)?;
                Ok(EthTransactionCid {
                    cid: record.cid,
                    tx_hash: record.tx_hash,
                    index: record.index,
                    src: record.src,
                    dst: record.dst,
                    block_number: record.block_number.0,
                    ipld_block: hex::encode(&ipld.data),
                })
            })
            .await;
        match result {
            Ok(tx) => Ok(Some(tx)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(async_graphql::Error::new(e.to_string())),
        }
    }
}

/// Builds the schema with the shared resources attached.
pub fn build_schema(
    resources: RpcResources,
) -> async_graphql::Schema<Query, async_graphql::EmptyMutation, async_graphql::EmptySubscription>
{
    async_graphql::Schema::build(
        Query,
        async_graphql::EmptyMutation,
        async_graphql::EmptySubscription,
    )
    .data(resources)
    .finish()
}
