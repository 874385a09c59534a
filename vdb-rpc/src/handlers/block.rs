use alloy_primitives::B256;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;
use vdb_evm::{Backend, BlockData};
use vdb_state::{BlockRef, Error, Result};

use crate::{
    eth_json_types::{serialize_result, BlockTags, EthHash, Quantity},
    jsonrpc::{JsonRpcError, JsonRpcResult},
    resources::RpcResources,
    rpc_types::{RpcBlock, RpcHeader},
};

pub(crate) fn invalid_params<E: std::fmt::Debug>(e: E) -> JsonRpcError {
    trace!("invalid params: {e:?}");
    JsonRpcError::invalid_params()
}

/// Assembles the full RPC block object: header, uncle hashes, total
/// difficulty, and transactions as hashes or full objects.
pub(crate) fn rpc_block(backend: &Backend, block: BlockData, full: bool) -> Result<RpcBlock> {
    let uncle_hashes = backend
        .uncles_by_block_hash(block.hash)?
        .into_iter()
        .map(|(_, header)| header.hash_slow())
        .collect();
    let total_difficulty = backend.td_by_hash(block.hash).ok();
    RpcBlock::new(&block, uncle_hashes, total_difficulty, full)
}

pub async fn eth_block_number(resources: &RpcResources) -> JsonRpcResult<Value> {
    let number = resources
        .blocking(|backend| backend.latest_block_number())
        .await?;
    serialize_result(Quantity(number))
}

pub fn eth_chain_id(resources: &RpcResources) -> JsonRpcResult<Value> {
    serialize_result(Quantity(resources.backend.chain_id()))
}

#[derive(Deserialize, Debug)]
struct BlockTagParam {
    block: BlockTags,
}

#[derive(Deserialize, Debug)]
struct BlockHashParam {
    hash: EthHash,
}

pub async fn eth_get_header_by_number(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getHeaderByNumber: {params:?}");
    let p: BlockTagParam = serde_json::from_value(params).map_err(invalid_params)?;
    let header = resources
        .blocking(move |backend| {
            let (hash, header) = backend.header_by_ref(p.block.into())?;
            let td = backend.td_by_hash(hash).ok();
            Ok(RpcHeader::new(hash, &header, td))
        })
        .await;
    match header {
        Ok(header) => serialize_result(header),
        Err(Error::NotFound) => serialize_result(None::<RpcHeader>),
        Err(e) => Err(e.into()),
    }
}

pub async fn eth_get_header_by_hash(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getHeaderByHash: {params:?}");
    let p: BlockHashParam = serde_json::from_value(params).map_err(invalid_params)?;
    let hash = B256::from(p.hash.0);
    let header = resources
        .blocking(move |backend| {
            let header = backend.header_by_hash(hash)?;
            let td = backend.td_by_hash(hash).ok();
            Ok(RpcHeader::new(hash, &header, td))
        })
        .await;
    match header {
        Ok(header) => serialize_result(header),
        Err(Error::NotFound) => serialize_result(None::<RpcHeader>),
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize, Debug)]
struct BlockByNumberParams {
    block: BlockTags,
    full: bool,
}

#[derive(Deserialize, Debug)]
struct BlockByHashParams {
    hash: EthHash,
    full: bool,
}

pub async fn eth_get_block_by_number(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getBlockByNumber: {params:?}");
    let p: BlockByNumberParams = serde_json::from_value(params).map_err(invalid_params)?;
    let block = resources
        .blocking(move |backend| {
            let block = backend.block_by_ref(p.block.into())?;
            rpc_block(&backend, block, p.full)
        })
        .await;
    match block {
        Ok(block) => serialize_result(block),
        Err(Error::NotFound) => serialize_result(None::<RpcBlock>),
        Err(e) => Err(e.into()),
    }
}

pub async fn eth_get_block_by_hash(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getBlockByHash: {params:?}");
    let p: BlockByHashParams = serde_json::from_value(params).map_err(invalid_params)?;
    let hash = B256::from(p.hash.0);
    let block = resources
        .blocking(move |backend| {
            let block = backend.block_by_hash(hash)?;
            rpc_block(&backend, block, p.full)
        })
        .await;
    match block {
        Ok(block) => serialize_result(block),
        Err(Error::NotFound) => serialize_result(None::<RpcBlock>),
        Err(e) => Err(e.into()),
    }
}

pub async fn eth_get_block_transaction_count_by_hash(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    let p: BlockHashParam = serde_json::from_value(params).map_err(invalid_params)?;
    let hash = B256::from(p.hash.0);
    let count = resources
        .blocking(move |backend| Ok(backend.block_by_hash(hash)?.transactions.len() as u64))
        .await;
    match count {
        Ok(count) => serialize_result(Quantity(count)),
        Err(Error::NotFound) => serialize_result(None::<Quantity>),
        Err(e) => Err(e.into()),
    }
}

pub async fn eth_get_block_transaction_count_by_number(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    let p: BlockTagParam = serde_json::from_value(params).map_err(invalid_params)?;
    let count = resources
        .blocking(move |backend| {
            Ok(backend.block_by_ref(p.block.into())?.transactions.len() as u64)
        })
        .await;
    match count {
        Ok(count) => serialize_result(Quantity(count)),
        Err(Error::NotFound) => serialize_result(None::<Quantity>),
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize, Debug)]
struct UncleByHashParams {
    hash: EthHash,
    index: Quantity,
}

#[derive(Deserialize, Debug)]
struct UncleByNumberParams {
    block: BlockTags,
    index: Quantity,
}

fn uncle_response(
    backend: &Backend,
    block_hash: B256,
    index: u64,
) -> Result<Option<RpcHeader>> {
    let uncles = backend.uncles_by_block_hash(block_hash)?;
    Ok(uncles.into_iter().nth(index as usize).map(|(_, header)| {
        let hash = header.hash_slow();
        RpcHeader::new(hash, &header, None)
    }))
}

pub async fn eth_get_uncle_by_block_hash_and_index(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    let p: UncleByHashParams = serde_json::from_value(params).map_err(invalid_params)?;
    let hash = B256::from(p.hash.0);
    let uncle = resources
        .blocking(move |backend| uncle_response(&backend, hash, p.index.0))
        .await?;
    serialize_result(uncle)
}

pub async fn eth_get_uncle_by_block_number_and_index(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    let p: UncleByNumberParams = serde_json::from_value(params).map_err(invalid_params)?;
    let uncle = resources
        .blocking(move |backend| {
            let resolved = backend.resolve_ref(p.block.into())?;
            uncle_response(&backend, resolved.hash, p.index.0)
        })
        .await?;
    serialize_result(uncle)
}

pub async fn eth_get_uncle_count_by_block_hash(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    let p: BlockHashParam = serde_json::from_value(params).map_err(invalid_params)?;
    let hash = B256::from(p.hash.0);
    let count = resources
        .blocking(move |backend| Ok(backend.uncles_by_block_hash(hash)?.len() as u64))
        .await?;
    serialize_result(Quantity(count))
}

pub async fn eth_get_uncle_count_by_block_number(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    let p: BlockTagParam = serde_json::from_value(params).map_err(invalid_params)?;
    let count = resources
        .blocking(move |backend| {
            let resolved = backend.resolve_ref(BlockRef::from(p.block))?;
            Ok(backend.uncles_by_block_hash(resolved.hash)?.len() as u64)
        })
        .await?;
    serialize_result(Quantity(count))
}
