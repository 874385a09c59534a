use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    jsonrpc::{JsonRpcError, JsonRpcResult, Request, RequestWrapper, Response, ResponseWrapper},
    resources::RpcResources,
};

pub mod account;
pub mod block;
pub mod call;
pub mod debug_trace;
pub mod logs;
pub mod net;
pub mod txn;

const BATCH_REQUEST_LIMIT: usize = 100;

/// Parses a JSON-RPC body (single or batch) and dispatches every request.
pub async fn rpc_handler(resources: &RpcResources, body: &[u8]) -> ResponseWrapper<Response> {
    let request: RequestWrapper<Value> = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            debug!("parse error: {e}");
            return ResponseWrapper::Single(Response::from_error(JsonRpcError::parse_error()));
        }
    };

    match request {
        RequestWrapper::Single(json_request) => {
            let Ok(request) = serde_json::from_value::<Request>(json_request) else {
                return ResponseWrapper::Single(Response::from_error(JsonRpcError::parse_error()));
            };
            ResponseWrapper::Single(Response::from_result(
                request.id,
                rpc_select(resources, &request.method, request.params).await,
            ))
        }
        RequestWrapper::Batch(batch) => {
            if batch.is_empty() {
                return ResponseWrapper::Single(Response::from_error(JsonRpcError::custom(
                    "empty batch request".to_string(),
                )));
            }
            if batch.len() > BATCH_REQUEST_LIMIT {
                return ResponseWrapper::Single(Response::from_error(JsonRpcError::custom(
                    format!("batch request exceeds limit of {BATCH_REQUEST_LIMIT}"),
                )));
            }
            let responses = join_all(batch.into_iter().map(|json_request| async {
                let Ok(request) = serde_json::from_value::<Request>(json_request) else {
                    return Response::from_error(JsonRpcError::invalid_request());
                };
                Response::from_result(
                    request.id,
                    rpc_select(resources, &request.method, request.params).await,
                )
            }))
            .await;
            ResponseWrapper::Batch(responses)
        }
    }
}

/// Dispatches one call. Methods register under their canonical namespaces
/// (`eth`, `net`, `debug`) and under the `vdb` alias for direct access.
pub async fn rpc_select(
    resources: &RpcResources,
    method: &str,
    params: Value,
) -> JsonRpcResult<Value> {
    // the vdb namespace aliases the eth method set
    let method = match method.strip_prefix("vdb_") {
        Some(rest) => format!("eth_{rest}"),
        None => method.to_string(),
    };

    if let Some(rest) = method.strip_prefix("statediff_") {
        if !resources.config.support_state_diff {
            return Err(JsonRpcError::method_not_found());
        }
        let timeout = std::time::Duration::from_secs(resources.config.state_diff_timeout_secs.max(1));
        return resources
            .require_proxy()?
            .call_with_timeout(&format!("statediff_{rest}"), params, timeout)
            .await
            .map_err(Into::into);
    }

    match method.as_str() {
        "eth_blockNumber" => block::eth_block_number(resources).await,
        "eth_chainId" => block::eth_chain_id(resources),
        "eth_getHeaderByNumber" => block::eth_get_header_by_number(resources, params).await,
        "eth_getHeaderByHash" => block::eth_get_header_by_hash(resources, params).await,
        "eth_getBlockByNumber" => block::eth_get_block_by_number(resources, params).await,
        "eth_getBlockByHash" => block::eth_get_block_by_hash(resources, params).await,
        "eth_getBlockTransactionCountByHash" => {
            block::eth_get_block_transaction_count_by_hash(resources, params).await
        }
        "eth_getBlockTransactionCountByNumber" => {
            block::eth_get_block_transaction_count_by_number(resources, params).await
        }
        "eth_getUncleByBlockHashAndIndex" => {
            block::eth_get_uncle_by_block_hash_and_index(resources, params).await
        }
        "eth_getUncleByBlockNumberAndIndex" => {
            block::eth_get_uncle_by_block_number_and_index(resources, params).await
        }
        "eth_getUncleCountByBlockHash" => {
            block::eth_get_uncle_count_by_block_hash(resources, params).await
        }
        "eth_getUncleCountByBlockNumber" => {
            block::eth_get_uncle_count_by_block_number(resources, params).await
        }
        "eth_getTransactionByHash" => txn::eth_get_transaction_by_hash(resources, params).await,
        "eth_getRawTransactionByHash" => {
            txn::eth_get_raw_transaction_by_hash(resources, params).await
        }
        "eth_getTransactionByBlockHashAndIndex" => {
            txn::eth_get_transaction_by_block_hash_and_index(resources, params).await
        }
        "eth_getTransactionByBlockNumberAndIndex" => {
            txn::eth_get_transaction_by_block_number_and_index(resources, params).await
        }
        "eth_getTransactionReceipt" => txn::eth_get_transaction_receipt(resources, params).await,
        "eth_getLogs" => logs::eth_get_logs(resources, params).await,
        "eth_getBalance" => account::eth_get_balance(resources, params).await,
        "eth_getCode" => account::eth_get_code(resources, params).await,
        "eth_getTransactionCount" => account::eth_get_transaction_count(resources, params).await,
        "eth_getStorageAt" => account::eth_get_storage_at(resources, params).await,
        "eth_getProof" => account::eth_get_proof(resources, params).await,
        "eth_call" => call::eth_call(resources, params).await,
        "eth_estimateGas" => call::eth_estimate_gas(resources, params).await,
        "eth_syncing" => Ok(Value::Bool(false)),
        "net_version" => net::net_version(resources),
        "net_listening" => Ok(Value::Bool(true)),
        "net_peerCount" => net::net_peer_count(resources).await,
        "debug_traceTransaction" => debug_trace::debug_trace_transaction(resources, params).await,
        "debug_traceCall" => debug_trace::debug_trace_call(resources, params).await,
        "debug_traceBlockByHash" => debug_trace::debug_trace_block_by_hash(resources, params).await,
        "debug_traceBlockByNumber" => {
            debug_trace::debug_trace_block_by_number(resources, params).await
        }
        _ => {
            info!(method, "method not found");
            Err(JsonRpcError::method_not_found())
        }
    }
}
