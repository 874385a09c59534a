use alloy_primitives::Address;
use revm::primitives::SpecId;
use serde::Deserialize;

/// Per-fork chain parameters, the subset the read path consults. Activation
/// heights missing from the configuration are treated as never activated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub homestead_block: Option<u64>,
    pub tangerine_block: Option<u64>,
    pub spurious_dragon_block: Option<u64>,
    pub byzantium_block: Option<u64>,
    pub constantinople_block: Option<u64>,
    pub petersburg_block: Option<u64>,
    pub istanbul_block: Option<u64>,
    pub berlin_block: Option<u64>,
    pub london_block: Option<u64>,
    pub merge_block: Option<u64>,
    pub shanghai_block: Option<u64>,
    pub cancun_block: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        // all forks active from genesis, the shape test chains use
        Self {
            chain_id: 1,
            homestead_block: Some(0),
            tangerine_block: Some(0),
            spurious_dragon_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            petersburg_block: Some(0),
            istanbul_block: Some(0),
            berlin_block: Some(0),
            london_block: Some(0),
            merge_block: Some(0),
            shanghai_block: Some(0),
            cancun_block: None,
        }
    }
}

impl ChainConfig {
    /// The EVM revision in force at a block height.
    pub fn spec_id(&self, number: u64) -> SpecId {
        let active = |fork: Option<u64>| fork.is_some_and(|at| number >= at);
        if active(self.cancun_block) {
            SpecId::CANCUN
        } else if active(self.shanghai_block) {
            SpecId::SHANGHAI
        } else if active(self.merge_block) {
            SpecId::MERGE
        } else if active(self.london_block) {
            SpecId::LONDON
        } else if active(self.berlin_block) {
            SpecId::BERLIN
        } else if active(self.istanbul_block) {
            SpecId::ISTANBUL
        } else if active(self.petersburg_block) {
            SpecId::PETERSBURG
        } else if active(self.constantinople_block) {
            SpecId::CONSTANTINOPLE
        } else if active(self.byzantium_block) {
            SpecId::BYZANTIUM
        } else if active(self.spurious_dragon_block) {
            SpecId::SPURIOUS_DRAGON
        } else if active(self.tangerine_block) {
            SpecId::TANGERINE
        } else if active(self.homestead_block) {
            SpecId::HOMESTEAD
        } else {
            SpecId::FRONTIER
        }
    }
}

/// Knobs the execution backend reads: fork schedule, the gas ceiling for
/// `eth_call`-class requests, and the fallback `from` address.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvmConfig {
    pub chain: ChainConfig,
    pub rpc_gas_cap: u64,
    pub default_sender: Option<Address>,
}

impl EvmConfig {
    pub fn gas_cap(&self) -> u64 {
        if self.rpc_gas_cap == 0 {
            50_000_000
        } else {
            self.rpc_gas_cap
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_schedule_selects_spec() {
        let config = ChainConfig {
            chain_id: 1,
            london_block: Some(100),
            merge_block: Some(200),
            shanghai_block: None,
            cancun_block: None,
            ..ChainConfig::default()
        };
        assert_eq!(config.spec_id(99), SpecId::BERLIN);
        assert_eq!(config.spec_id(100), SpecId::LONDON);
        assert_eq!(config.spec_id(500), SpecId::MERGE);
    }
}
