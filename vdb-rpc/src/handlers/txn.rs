use alloy_primitives::B256;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;
use vdb_state::Error;

use crate::{
    eth_json_types::{serialize_result, BlockTags, EthHash, Quantity, UnformattedData},
    handlers::block::invalid_params,
    jsonrpc::JsonRpcResult,
    resources::RpcResources,
    rpc_types::{RpcReceipt, RpcTransaction},
};

#[derive(Deserialize, Debug)]
struct TxHashParam {
    tx_hash: EthHash,
}

pub async fn eth_get_transaction_by_hash(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getTransactionByHash: {params:?}");
    let p: TxHashParam = serde_json::from_value(params).map_err(invalid_params)?;
    let tx_hash = B256::from(p.tx_hash.0);
    let result = resources
        .blocking(move |backend| {
            let location = backend.transaction_location(tx_hash)?;
            let block = backend.block_by_hash(location.block_hash)?;
            let tx = block
                .transactions
                .iter()
                .find(|tx| tx.hash == tx_hash)
                .ok_or(Error::NotFound)?;
            RpcTransaction::from_tx(tx, &block)
        })
        .await;
    match result {
        Ok(tx) => serialize_result(tx),
        Err(Error::NotFound) => serialize_result(None::<RpcTransaction>),
        Err(e) => Err(e.into()),
    }
}

pub async fn eth_get_raw_transaction_by_hash(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getRawTransactionByHash: {params:?}");
    let p: TxHashParam = serde_json::from_value(params).map_err(invalid_params)?;
    let tx_hash = B256::from(p.tx_hash.0);
    let result = resources
        .blocking(move |backend| {
            // canonical restriction first, raw bytes second
            let _ = backend.transaction_location(tx_hash)?;
            let ipld = backend.index().tx_ipld_by_hash(&format!("{tx_hash:#x}"))?;
            Ok(ipld.data)
        })
        .await;
    match result {
        Ok(raw) => serialize_result(UnformattedData(raw)),
        Err(Error::NotFound) => serialize_result(None::<UnformattedData>),
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize, Debug)]
struct TxByBlockHashAndIndexParams {
    block_hash: EthHash,
    index: Quantity,
}

pub async fn eth_get_transaction_by_block_hash_and_index(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getTransactionByBlockHashAndIndex: {params:?}");
    let p: TxByBlockHashAndIndexParams = serde_json::from_value(params).map_err(invalid_params)?;
    let block_hash = B256::from(p.block_hash.0);
    let result = resources
        .blocking(move |backend| {
            let block = backend.block_by_hash(block_hash)?;
            let tx = block
                .transactions
                .get(p.index.0 as usize)
                .ok_or(Error::NotFound)?;
            RpcTransaction::from_tx(tx, &block)
        })
        .await;
    match result {
        Ok(tx) => serialize_result(tx),
        Err(Error::NotFound) => serialize_result(None::<RpcTransaction>),
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize, Debug)]
struct TxByBlockNumberAndIndexParams {
    block: BlockTags,
    index: Quantity,
}

pub async fn eth_get_transaction_by_block_number_and_index(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getTransactionByBlockNumberAndIndex: {params:?}");
    let p: TxByBlockNumberAndIndexParams = serde_json::from_value(params).map_err(invalid_params)?;
    let result = resources
        .blocking(move |backend| {
            let block = backend.block_by_ref(p.block.into())?;
            let tx = block
                .transactions
                .get(p.index.0 as usize)
                .ok_or(Error::NotFound)?;
            RpcTransaction::from_tx(tx, &block)
        })
        .await;
    match result {
        Ok(tx) => serialize_result(tx),
        Err(Error::NotFound) => serialize_result(None::<RpcTransaction>),
        Err(e) => Err(e.into()),
    }
}

pub async fn eth_get_transaction_receipt(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getTransactionReceipt: {params:?}");
    let p: TxHashParam = serde_json::from_value(params).map_err(invalid_params)?;
    let tx_hash = B256::from(p.tx_hash.0);
    let result = resources
        .blocking(move |backend| {
            let location = backend.transaction_location(tx_hash)?;
            let block = backend.block_by_hash(location.block_hash)?;
            let receipts = backend.receipts_by_block_hash(location.block_hash)?;
            RpcReceipt::build(&block, &receipts, location.index as usize)
        })
        .await;
    match result {
        Ok(receipt) => serialize_result(receipt),
        Err(Error::NotFound) => serialize_result(None::<RpcReceipt>),
        Err(e) => Err(e.into()),
    }
}
