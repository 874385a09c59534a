use serde::Deserialize;
use vdb_evm::EvmConfig;
use vdb_state::GroupCacheConfig;

/// Server-level options. Process bootstrap parses these from wherever it
/// likes; everything here has a serde shape and a sane default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Fork schedule, gas cap and default sender for the execution backend.
    pub evm: EvmConfig,
    /// Network id reported by `net_version`.
    pub network_id: Option<u64>,
    /// Advertise the upstream's `statediff` capability.
    pub support_state_diff: bool,
    /// Timeout for proxied `statediff_` calls, seconds.
    pub state_diff_timeout_secs: u64,
    /// Always forward `eth_call` / `eth_estimateGas` upstream.
    pub forward_eth_calls: bool,
    /// Always forward `eth_getStorageAt` upstream.
    pub forward_get_storage_at: bool,
    /// Evaluate locally, retry upstream on any local error.
    pub proxy_on_error: bool,
    /// Ceiling for a single `eth_call`-class execution, seconds.
    pub call_timeout_secs: u64,
    /// The two-tier trie node cache.
    pub group_cache: GroupCacheConfig,
}

impl ServerConfig {
    pub fn network_id(&self) -> u64 {
        self.network_id.unwrap_or(self.evm.chain.chain_id)
    }

    pub fn call_timeout(&self) -> std::time::Duration {
        let secs = if self.call_timeout_secs == 0 {
            30
        } else {
            self.call_timeout_secs
        };
        std::time::Duration::from_secs(secs)
    }
}
