use serde_json::Value;

use crate::{eth_json_types::serialize_result, jsonrpc::JsonRpcResult, resources::RpcResources};

pub fn net_version(resources: &RpcResources) -> JsonRpcResult<Value> {
    serialize_result(resources.config.network_id().to_string())
}

/// This server keeps no peers of its own; with an upstream configured the
/// question is forwarded, otherwise the honest answer is zero.
pub async fn net_peer_count(resources: &RpcResources) -> JsonRpcResult<Value> {
    match &resources.proxy {
        Some(proxy) => Ok(proxy.call("net_peerCount", Value::Array(vec![])).await?),
        None => serialize_result("0x0"),
    }
}
