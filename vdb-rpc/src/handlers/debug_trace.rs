use alloy_primitives::B256;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;
use vdb_evm::{trace_block, trace_call, trace_transaction, CallArgs};
use vdb_state::BlockRef;

use crate::{
    eth_json_types::{serialize_result, BlockTagOrHash, BlockTags, EthHash},
    handlers::{block::invalid_params, call::run_with_deadline},
    jsonrpc::JsonRpcResult,
    resources::RpcResources,
};

/// Options accepted for compatibility; the struct-log tracer is the only
/// tracer served.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct TraceOptions {
    #[allow(dead_code)]
    tracer: Option<String>,
    #[allow(dead_code)]
    timeout: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TraceTransactionParams {
    tx_hash: EthHash,
    #[serde(default)]
    #[allow(dead_code)]
    options: Option<TraceOptions>,
}

pub async fn debug_trace_transaction(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("debug_traceTransaction: {params:?}");
    let p: TraceTransactionParams = serde_json::from_value(params).map_err(invalid_params)?;
    let tx_hash = B256::from(p.tx_hash.0);
    let result = run_with_deadline(resources, move |backend, cancel| {
        trace_transaction(&backend, tx_hash, cancel)
    })
    .await?;
    serialize_result(result)
}

#[derive(Deserialize, Debug)]
struct TraceCallParams {
    args: CallArgs,
    #[serde(default)]
    block: Option<BlockTagOrHash>,
    #[serde(default)]
    #[allow(dead_code)]
    options: Option<TraceOptions>,
}

pub async fn debug_trace_call(resources: &RpcResources, params: Value) -> JsonRpcResult<Value> {
    trace!("debug_traceCall: {params:?}");
    let p: TraceCallParams = serde_json::from_value(params).map_err(invalid_params)?;
    let at = BlockRef::from(p.block.unwrap_or(BlockTagOrHash::BlockTags(Default::default())));
    let args = p.args;
    let result = run_with_deadline(resources, move |backend, cancel| {
        let (_, header) = backend.header_by_ref(at)?;
        let reader = backend.state_at(at)?;
        trace_call(reader, &header, backend.config(), &args, cancel)
    })
    .await?;
    serialize_result(result)
}

#[derive(Deserialize, Debug)]
struct TraceBlockByHashParams {
    hash: EthHash,
    #[serde(default)]
    #[allow(dead_code)]
    options: Option<TraceOptions>,
}

pub async fn debug_trace_block_by_hash(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("debug_traceBlockByHash: {params:?}");
    let p: TraceBlockByHashParams = serde_json::from_value(params).map_err(invalid_params)?;
    let hash = B256::from(p.hash.0);
    let result = run_with_deadline(resources, move |backend, cancel| {
        let block = backend.block_by_hash(hash)?;
        trace_block(&backend, &block, cancel)
    })
    .await?;
    serialize_result(result)
}

#[derive(Deserialize, Debug)]
struct TraceBlockByNumberParams {
    block: BlockTags,
    #[serde(default)]
    #[allow(dead_code)]
    options: Option<TraceOptions>,
}

pub async fn debug_trace_block_by_number(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("debug_traceBlockByNumber: {params:?}");
    let p: TraceBlockByNumberParams = serde_json::from_value(params).map_err(invalid_params)?;
    let at = BlockRef::from(p.block);
    let result = run_with_deadline(resources, move |backend, cancel| {
        let block = backend.block_by_ref(at)?;
        trace_block(&backend, &block, cancel)
    })
    .await?;
    serialize_result(result)
}
