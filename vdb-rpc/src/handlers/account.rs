use alloy_primitives::{Address, B256};
use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};
use vdb_state::BlockRef;

use crate::{
    eth_json_types::{
        serialize_result, BigQuantity, BlockTagOrHash, EthAddress, EthHash, Quantity,
        UnformattedData,
    },
    handlers::block::invalid_params,
    jsonrpc::JsonRpcResult,
    resources::RpcResources,
    rpc_types::RpcProof,
};

#[derive(Deserialize, Debug)]
struct AccountAtBlockParams {
    account: EthAddress,
    block: BlockTagOrHash,
}

pub async fn eth_get_balance(resources: &RpcResources, params: Value) -> JsonRpcResult<Value> {
    trace!("eth_getBalance: {params:?}");
    let p: AccountAtBlockParams = serde_json::from_value(params).map_err(invalid_params)?;
    let address = Address::from(p.account);
    let at = BlockRef::from(p.block);
    let balance = resources
        .blocking(move |backend| backend.state_at(at)?.balance(address))
        .await?;
    serialize_result(BigQuantity(balance))
}

pub async fn eth_get_code(resources: &RpcResources, params: Value) -> JsonRpcResult<Value> {
    trace!("eth_getCode: {params:?}");
    let p: AccountAtBlockParams = serde_json::from_value(params).map_err(invalid_params)?;
    let address = Address::from(p.account);
    let at = BlockRef::from(p.block);
    let code = resources
        .blocking(move |backend| backend.state_at(at)?.code(address))
        .await?;
    serialize_result(UnformattedData(code.to_vec()))
}

pub async fn eth_get_transaction_count(
    resources: &RpcResources,
    params: Value,
) -> JsonRpcResult<Value> {
    trace!("eth_getTransactionCount: {params:?}");
    let p: AccountAtBlockParams = serde_json::from_value(params).map_err(invalid_params)?;
    let address = Address::from(p.account);
    let at = BlockRef::from(p.block);
    let nonce = resources
        .blocking(move |backend| backend.state_at(at)?.nonce(address))
        .await?;
    serialize_result(Quantity(nonce))
}

#[derive(Deserialize, Debug)]
struct StorageAtParams {
    account: EthAddress,
    position: BigQuantity,
    block: BlockTagOrHash,
}

pub async fn eth_get_storage_at(resources: &RpcResources, params: Value) -> JsonRpcResult<Value> {
    trace!("eth_getStorageAt: {params:?}");
    if resources.config.forward_get_storage_at {
        return Ok(resources
            .require_proxy()?
            .call("eth_getStorageAt", params)
            .await?);
    }

    let p: StorageAtParams =
        serde_json::from_value(params.clone()).map_err(invalid_params)?;
    let address = Address::from(p.account);
    let slot = B256::from(p.position.0);
    let at = BlockRef::from(p.block);

    let local = resources
        .blocking(move |backend| backend.state_at(at)?.storage_at(address, slot))
        .await;
    match local {
        Ok(word) => serialize_result(UnformattedData(word.to_vec())),
        Err(e) if resources.config.proxy_on_error => {
            warn!("local eth_getStorageAt failed, retrying upstream: {e}");
            Ok(resources
                .require_proxy()?
                .call("eth_getStorageAt", params)
                .await?)
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize, Debug)]
struct ProofParams {
    account: EthAddress,
    slots: Vec<EthHash>,
    block: BlockTagOrHash,
}

pub async fn eth_get_proof(resources: &RpcResources, params: Value) -> JsonRpcResult<Value> {
    trace!("eth_getProof: {params:?}");
    let p: ProofParams = serde_json::from_value(params).map_err(invalid_params)?;
    let address = Address::from(p.account);
    let slots: Vec<B256> = p.slots.into_iter().map(B256::from).collect();
    let at = BlockRef::from(p.block);
    let proof = resources
        .blocking(move |backend| backend.state_at(at)?.proof(address, &slots))
        .await?;
    serialize_result(RpcProof::from(proof))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use serde_json::json;

    #[test]
    fn storage_position_accepts_short_quantities() {
        let p: StorageAtParams = serde_json::from_value(json!([
            "0xDeaDbeefdEAdbeefdEadbEEFdeadbeEFdEaDbeeF",
            "0x2",
            "latest"
        ]))
        .unwrap();
        assert_eq!(p.position.0, U256::from(2u64));
    }
}
