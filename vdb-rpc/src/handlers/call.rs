use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};
use vdb_evm::{do_call, estimate_gas, CallArgs, CallOutcome, CancelToken, StateOverrideSet};
use vdb_state::{BlockRef, Result};

use crate::{
    eth_json_types::{serialize_result, BlockTagOrHash, Quantity, UnformattedData},
    handlers::block::invalid_params,
    jsonrpc::{JsonRpcError, JsonRpcResult},
    resources::RpcResources,
};

#[derive(Deserialize, Debug)]
struct EthCallParams {
    args: CallArgs,
    #[serde(default)]
    block: Option<BlockTagOrHash>,
    #[serde(default)]
    overrides: Option<StateOverrideSet>,
}

/// Runs a blocking call execution with the configured deadline; expiry trips
/// the cancellation token the interpreter loop polls.
pub(crate) async fn run_with_deadline<T, F>(resources: &RpcResources, f: F) -> Result<T>
where
    F: FnOnce(vdb_evm::Backend, CancelToken) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancelToken::new();
    let timer = {
        let cancel = cancel.clone();
        let deadline = resources.config.call_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            cancel.cancel();
        })
    };
    let result = resources
        .blocking(move |backend| f(backend, cancel))
        .await;
    timer.abort();
    result
}

fn call_response(outcome: CallOutcome) -> JsonRpcResult<Value> {
    if outcome.failed {
        let data = if outcome.return_data.is_empty() {
            None
        } else {
            Some(crate::hex::encode(&outcome.return_data))
        };
        return Err(JsonRpcError::eth_call_error(
            outcome
                .error
                .unwrap_or_else(|| "execution failed".to_string()),
            data,
        ));
    }
    serialize_result(UnformattedData(outcome.return_data.to_vec()))
}

pub async fn eth_call(resources: &RpcResources, params: Value) -> JsonRpcResult<Value> {
    trace!("eth_call: {params:?}");
    if resources.config.forward_eth_calls {
        // forwarded verbatim: the caller's `from` travels unchanged
        return Ok(resources.require_proxy()?.call("eth_call", params).await?);
    }

    let p: EthCallParams = serde_json::from_value(params.clone()).map_err(invalid_params)?;
    let at = BlockRef::from(p.block.unwrap_or(BlockTagOrHash::BlockTags(Default::default())));
    let args = p.args;
    let overrides = p.overrides;

    let local = run_with_deadline(resources, move |backend, cancel| {
        let (_, header) = backend.header_by_ref(at)?;
        let reader = backend.state_at(at)?;
        let gas_cap = backend.config().gas_cap();
        do_call(
            reader,
            &header,
            backend.config(),
            &args,
            overrides.as_ref(),
            gas_cap,
            cancel,
        )
    })
    .await;

    match local {
        Ok(outcome) => call_response(outcome),
        Err(e) if resources.config.proxy_on_error => {
            warn!("local eth_call failed, retrying upstream: {e}");
            Ok(resources.require_proxy()?.call("eth_call", params).await?)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn eth_estimate_gas(resources: &RpcResources, params: Value) -> JsonRpcResult<Value> {
    trace!("eth_estimateGas: {params:?}");
    if resources.config.forward_eth_calls {
        return Ok(resources
            .require_proxy()?
            .call("eth_estimateGas", params)
            .await?);
    }

    let p: EthCallParams = serde_json::from_value(params.clone()).map_err(invalid_params)?;
    let at = BlockRef::from(p.block.unwrap_or(BlockTagOrHash::BlockTags(Default::default())));
    let args = p.args;

    let local = run_with_deadline(resources, move |backend, cancel| {
        let (_, header) = backend.header_by_ref(at)?;
        let reader = backend.state_at(at)?;
        let gas_cap = backend.config().gas_cap();
        estimate_gas(reader, &header, backend.config(), &args, gas_cap, cancel)
    })
    .await;

    match local {
        Ok(gas) => serialize_result(Quantity(gas)),
        Err(e) if resources.config.proxy_on_error => {
            warn!("local eth_estimateGas failed, retrying upstream: {e}");
            Ok(resources
                .require_proxy()?
                .call("eth_estimateGas", params)
                .await?)
        }
        Err(e) => Err(e.into()),
    }
}
