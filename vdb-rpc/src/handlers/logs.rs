use alloy_primitives::B256;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;
use vdb_index::ReceiptFilter;
use vdb_state::BlockRef;

use crate::{
    eth_json_types::{serialize_result, BlockTags, EthAddress, EthHash},
    handlers::block::invalid_params,
    jsonrpc::{JsonRpcError, JsonRpcResult},
    resources::RpcResources,
    rpc_types::RpcLog,
};

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum AddressFilter {
    Single(EthAddress),
    Many(Vec<EthAddress>),
}

impl AddressFilter {
    fn into_strings(self) -> Vec<String> {
        match self {
            AddressFilter::Single(address) => vec![address.to_string()],
            AddressFilter::Many(addresses) => {
                addresses.into_iter().map(|a| a.to_string()).collect()
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum TopicSet {
    Empty(Option<()>),
    Single(EthHash),
    Many(Vec<EthHash>),
}

impl TopicSet {
    fn into_strings(self) -> Vec<String> {
        match self {
            TopicSet::Empty(_) => Vec::new(),
            TopicSet::Single(topic) => vec![topic.to_string()],
            TopicSet::Many(topics) => topics.into_iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// The `eth_getLogs` filter object. `blockHash` excludes the range form.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
struct LogFilter {
    block_hash: Option<EthHash>,
    from_block: Option<BlockTags>,
    to_block: Option<BlockTags>,
    address: Option<AddressFilter>,
    topics: Option<Vec<TopicSet>>,
}

#[derive(Deserialize, Debug)]
struct GetLogsParams {
    filter: LogFilter,
}

fn receipt_filter(filter: &LogFilter) -> JsonRpcResult<ReceiptFilter> {
    let mut topics: [Vec<String>; 4] = Default::default();
    if let Some(sets) = &filter.topics {
        if sets.len() > 4 {
            return Err(JsonRpcError::eth_call_error(
                "too many topic positions".to_string(),
                None,
            ));
        }
        for (position, set) in sets.iter().enumerate() {
            topics[position] = set.clone().into_strings();
        }
    }
    Ok(ReceiptFilter {
        off: false,
        log_addresses: filter
            .address
            .clone()
            .map(AddressFilter::into_strings)
            .unwrap_or_default(),
        topics,
        match_txs: false,
    })
}

pub async fn eth_get_logs(resources: &RpcResources, params: Value) -> JsonRpcResult<Value> {
    trace!("eth_getLogs: {params:?}");
    let p: GetLogsParams = serde_json::from_value(params).map_err(invalid_params)?;
    if p.filter.block_hash.is_some()
        && (p.filter.from_block.is_some() || p.filter.to_block.is_some())
    {
        return Err(JsonRpcError::invalid_params());
    }
    let filter = receipt_filter(&p.filter)?;

    let logs = resources
        .blocking(move |backend| {
            let mut rows = Vec::new();
            if let Some(hash) = p.filter.block_hash {
                rows = backend.filtered_logs(&filter, Some(B256::from(hash.0)), None)?;
            } else {
                let from = backend
                    .resolve_ref(BlockRef::from(p.filter.from_block.unwrap_or_default()))?
                    .number;
                let to = backend
                    .resolve_ref(BlockRef::from(p.filter.to_block.unwrap_or_default()))?
                    .number;
                for number in from..=to {
                    rows.extend(backend.filtered_logs(&filter, None, Some(number))?);
                }
            }
            rows.iter().map(RpcLog::from_log_result).collect::<Result<Vec<_>, _>>()
        })
        .await?;
    serialize_result(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_object_parses_topic_matrix() {
        let p: GetLogsParams = serde_json::from_value(json!([{
            "blockHash": "0xb903239f8543d04b5dc1ba6579132b143087c68db1b2168786408fcbce568238",
            "topics": [
                ["0x0000000000000000000000000000000000000000000000000000000000000004",
                 "0x0000000000000000000000000000000000000000000000000000000000000005"],
                "0x0000000000000000000000000000000000000000000000000000000000000006"
            ]
        }]))
        .unwrap();
        let filter = receipt_filter(&p.filter).unwrap();
        assert_eq!(filter.topics[0].len(), 2);
        assert_eq!(filter.topics[1].len(), 1);
        assert!(filter.topics[2].is_empty());
        assert!(filter.log_addresses.is_empty());
    }

    #[test]
    fn null_topic_position_matches_anything() {
        let p: GetLogsParams = serde_json::from_value(json!([{
            "topics": [null, "0x0000000000000000000000000000000000000000000000000000000000000007"]
        }]))
        .unwrap();
        let filter = receipt_filter(&p.filter).unwrap();
        assert!(filter.topics[0].is_empty());
        assert_eq!(filter.topics[1].len(), 1);
    }

    #[test]
    fn single_address_becomes_one_element_list() {
        let p: GetLogsParams = serde_json::from_value(json!([{
            "address": "0xDeaDbeefdEAdbeefdEadbEEFdeadbeEFdEaDbeeF"
        }]))
        .unwrap();
        let filter = receipt_filter(&p.filter).unwrap();
        assert_eq!(filter.log_addresses.len(), 1);
    }
}
