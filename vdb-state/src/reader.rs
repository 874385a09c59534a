use std::sync::Arc;

use alloy_consensus::{constants::KECCAK_EMPTY, Account};
use alloy_primitives::{keccak256, Address, B256, U256};
use bytes::Bytes;

use crate::{
    cache::GroupCache,
    decode,
    error::{Error, Result},
    source::{BlockRef, NodeType, ResolvedBlock, StateSource},
};

/// The canonical response for a missing or deleted storage slot.
pub const EMPTY_NODE_VALUE: B256 = B256::ZERO;

/// Account state view pinned to one block. Every read resolves against the
/// newest leaf at or before the pinned height, canonical relative to the
/// pinned hash, so a reader built from a sibling hash sees that fork's trie.
pub struct StateReader<S> {
    source: S,
    cache: Arc<GroupCache>,
    block: ResolvedBlock,
}

impl<S: Clone> Clone for StateReader<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            cache: self.cache.clone(),
            block: self.block,
        }
    }
}

/// One slot of a [`Proof`] response.
#[derive(Debug, Clone)]
pub struct ProofSlot {
    pub key: B256,
    pub value: U256,
    pub cid: Option<String>,
    pub ipld: Option<Bytes>,
}

/// Index-backed proof material for an account and a set of its slots: the
/// leaf CIDs and IPLD bytes that substantiate each value.
#[derive(Debug, Clone)]
pub struct Proof {
    pub address: Address,
    pub balance: U256,
    pub nonce: u64,
    pub code_hash: B256,
    pub storage_root: B256,
    pub account_cid: Option<String>,
    pub account_ipld: Option<Bytes>,
    pub storage: Vec<ProofSlot>,
}

impl<S: StateSource> StateReader<S> {
    pub fn new(source: S, cache: Arc<GroupCache>, at: BlockRef) -> Result<Self> {
        let block = source.resolve_block(at)?;
        Ok(Self {
            source,
            cache,
            block,
        })
    }

    pub fn block(&self) -> ResolvedBlock {
        self.block
    }

    /// Resolves another reference through the same source, e.g. for the
    /// BLOCKHASH host query.
    pub fn resolve(&self, at: BlockRef) -> Result<ResolvedBlock> {
        self.source.resolve_block(at)
    }

    /// The account blob at the pinned block, or `None` when the account does
    /// not exist there: never seen by the index, or recorded as removed at
    /// or before the block without a superseding leaf.
    pub fn account(&self, address: Address) -> Result<Option<Account>> {
        Ok(self.account_leaf(address)?.map(|(account, _, _)| account))
    }

    pub fn balance(&self, address: Address) -> Result<U256> {
        Ok(self
            .account(address)?
            .map_or(U256::ZERO, |account| account.balance))
    }

    pub fn nonce(&self, address: Address) -> Result<u64> {
        Ok(self.account(address)?.map_or(0, |account| account.nonce))
    }

    /// Contract code at the pinned block. Deleted and external accounts both
    /// read as empty code.
    pub fn code(&self, address: Address) -> Result<Bytes> {
        let Some(account) = self.account(address)? else {
            return Ok(Bytes::new());
        };
        self.code_by_hash(account.code_hash)
    }

    pub fn code_by_hash(&self, code_hash: B256) -> Result<Bytes> {
        if code_hash == KECCAK_EMPTY || code_hash == B256::ZERO {
            return Ok(Bytes::new());
        }
        match self.source.code_by_hash(code_hash) {
            Ok(code) => Ok(code),
            Err(Error::NotFound) => Ok(Bytes::new()),
            Err(e) => Err(e),
        }
    }

    /// Storage slot value at the pinned block. A missing leaf, a removal
    /// marker, and a deletion recorded later along the same trie path all
    /// read as [`EMPTY_NODE_VALUE`], with no error.
    pub fn storage_at(&self, address: Address, slot: B256) -> Result<B256> {
        match self.storage_value(address, slot)? {
            Some(word) => Ok(B256::from(word)),
            None => Ok(EMPTY_NODE_VALUE),
        }
    }

    fn storage_value(&self, address: Address, slot: B256) -> Result<Option<U256>> {
        Ok(self
            .storage_leaf(address, slot)?
            .map(|(word, _, _)| word))
    }

    /// Proof material for `address` and `slots` at the pinned block.
    pub fn proof(&self, address: Address, slots: &[B256]) -> Result<Proof> {
        let account = self.account_leaf(address)?;
        let (account_blob, account_cid, account_ipld) = match account {
            Some((blob, cid, ipld)) => (Some(blob), Some(cid), Some(ipld)),
            None => (None, None, None),
        };
        let account_blob = account_blob.unwrap_or(Account {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: KECCAK_EMPTY,
            code_hash: KECCAK_EMPTY,
        });

        let mut storage = Vec::with_capacity(slots.len());
        for slot in slots {
            let leaf = self.storage_leaf(address, *slot)?;
            storage.push(match leaf {
                Some((word, cid, ipld)) => ProofSlot {
                    key: *slot,
                    value: word,
                    cid: Some(cid),
                    ipld: Some(ipld),
                },
                None => ProofSlot {
                    key: *slot,
                    value: U256::ZERO,
                    cid: None,
                    ipld: None,
                },
            });
        }

        Ok(Proof {
            address,
            balance: account_blob.balance,
            nonce: account_blob.nonce,
            code_hash: account_blob.code_hash,
            storage_root: account_blob.storage_root,
            account_cid,
            account_ipld,
            storage,
        })
    }

    fn account_leaf(&self, address: Address) -> Result<Option<(Account, String, Bytes)>> {
        let leaf_key = keccak256(address);
        let Some(leaf) = self.source.state_leaf_before(leaf_key, &self.block)? else {
            return Ok(None);
        };
        if leaf.node_type == NodeType::Removed {
            return Ok(None);
        }
        let node = self
            .cache
            .state_node(&leaf.mh_key, || self.source.ipld(&leaf.mh_key))?;
        let account = decode::decode_state_leaf(&node)?;
        Ok(Some((account, leaf.cid, node)))
    }

    fn storage_leaf(&self, address: Address, slot: B256) -> Result<Option<(U256, String, Bytes)>> {
        let state_leaf_key = keccak256(address);
        let storage_leaf_key = keccak256(slot);
        let leaf = match self
            .source
            .storage_leaf_before(state_leaf_key, storage_leaf_key, &self.block)
        {
            Ok(Some(leaf)) => leaf,
            // No row is the correct "slot is zero" answer, not a failure.
            Ok(None) | Err(Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        if leaf.node_type == NodeType::Removed {
            return Ok(None);
        }
        // A removal marker recorded later along the same path masks the leaf
        // no matter what the candidate bytes contain.
        if self
            .source
            .storage_removed_after(&leaf.storage_path, leaf.block_number, &self.block)?
        {
            return Ok(None);
        }
        let node = self
            .cache
            .storage_node(&leaf.mh_key, || self.source.ipld(&leaf.mh_key))?;
        let value = decode::decode_storage_leaf(&node)?;
        let word = decode::storage_value_to_word(&value)?;
        Ok(Some((word, leaf.cid, node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{CacheConfig, GroupCacheConfig},
        mock_source::MockStateSource,
    };

    fn test_cache(name: &str) -> Arc<GroupCache> {
        GroupCache::group(&GroupCacheConfig {
            state_db: CacheConfig {
                name: name.to_string(),
                ..CacheConfig::default()
            },
            storage: CacheConfig::default(),
        })
    }

    fn reader<'a>(
        source: &'a MockStateSource,
        name: &str,
        at: BlockRef,
    ) -> StateReader<&'a MockStateSource> {
        StateReader::new(source, test_cache(name), at).unwrap()
    }

    #[test]
    fn balance_is_deterministic_for_unchanged_source() {
        let address = Address::repeat_byte(0x11);
        let mut source = MockStateSource::default();
        let head = source.push_canonical_block(3, B256::repeat_byte(3));
        source.insert_account(
            address,
            2,
            head.hash,
            Account {
                nonce: 5,
                balance: U256::from(1234u64),
                storage_root: KECCAK_EMPTY,
                code_hash: KECCAK_EMPTY,
            },
        );

        let reader = reader(&source, "determinism", BlockRef::Number(3));
        let first = reader.balance(address).unwrap();
        for _ in 0..10 {
            assert_eq!(reader.balance(address).unwrap(), first);
        }
        assert_eq!(first, U256::from(1234u64));
        assert_eq!(reader.nonce(address).unwrap(), 5);
    }

    #[test]
    fn removed_account_reads_as_empty() {
        let address = Address::repeat_byte(0x22);
        let mut source = MockStateSource::default();
        let b1 = source.push_canonical_block(1, B256::repeat_byte(1));
        let b2 = source.push_canonical_block(2, B256::repeat_byte(2));
        source.insert_account(
            address,
            1,
            b1.hash,
            Account {
                nonce: 9,
                balance: U256::from(777u64),
                storage_root: KECCAK_EMPTY,
                code_hash: KECCAK_EMPTY,
            },
        );
        source.remove_account(address, 2, b2.hash);

        // Visible at the height it was written.
        let before = reader(&source, "removal-before", BlockRef::Number(1));
        assert_eq!(before.balance(address).unwrap(), U256::from(777u64));

        // Masked by the removal marker from block 2 onward.
        let after = reader(&source, "removal-after", BlockRef::Number(2));
        assert_eq!(after.balance(address).unwrap(), U256::ZERO);
        assert_eq!(after.nonce(address).unwrap(), 0);
        assert_eq!(after.code(address).unwrap(), Bytes::new());
        assert!(after.account(address).unwrap().is_none());
    }

    #[test]
    fn storage_deletion_probe_masks_the_leaf() {
        let address = Address::repeat_byte(0x33);
        let slot = B256::with_last_byte(0x02);
        let supply = U256::from(1_000_000_000_000_000_000_000u128);

        let mut source = MockStateSource::default();
        let b1 = source.push_canonical_block(1, B256::repeat_byte(0x51));
        let b2 = source.push_canonical_block(2, B256::repeat_byte(0x52));
        source.push_canonical_block(3, B256::repeat_byte(0x53));
        source.insert_storage(address, slot, 1, b1.hash, supply);
        source.remove_storage_path(address, slot, 2, b2.hash);

        let before = reader(&source, "selfdestruct-before", BlockRef::Number(1));
        assert_eq!(
            before.storage_at(address, slot).unwrap(),
            B256::from(supply)
        );

        let at = reader(&source, "selfdestruct-at", BlockRef::Number(2));
        assert_eq!(at.storage_at(address, slot).unwrap(), EMPTY_NODE_VALUE);

        let latest = reader(&source, "selfdestruct-latest", BlockRef::Latest);
        assert_eq!(latest.storage_at(address, slot).unwrap(), EMPTY_NODE_VALUE);
    }

    #[test]
    fn missing_slot_reads_as_zero_without_error() {
        let mut source = MockStateSource::default();
        source.push_canonical_block(1, B256::repeat_byte(1));
        let reader = reader(&source, "missing-slot", BlockRef::Latest);
        assert_eq!(
            reader
                .storage_at(Address::repeat_byte(0x44), B256::with_last_byte(9))
                .unwrap(),
            EMPTY_NODE_VALUE
        );
    }

    #[test]
    fn sibling_hash_reads_its_own_fork() {
        let address = Address::repeat_byte(0x55);
        let canonical = B256::repeat_byte(0xc1);
        let sibling = B256::repeat_byte(0xc2);

        let mut source = MockStateSource::default();
        let head = source.push_canonical_block(5, canonical);
        source.push_sibling_block(5, sibling);
        source.insert_account(
            address,
            5,
            head.hash,
            Account {
                nonce: 1,
                balance: U256::from(100u64),
                storage_root: KECCAK_EMPTY,
                code_hash: KECCAK_EMPTY,
            },
        );
        source.insert_account(
            address,
            5,
            sibling,
            Account {
                nonce: 1,
                balance: U256::from(200u64),
                storage_root: KECCAK_EMPTY,
                code_hash: KECCAK_EMPTY,
            },
        );

        let by_number = reader(&source, "fork-number", BlockRef::Number(5));
        assert_eq!(by_number.balance(address).unwrap(), U256::from(100u64));

        let by_sibling = reader(&source, "fork-hash", BlockRef::Hash(sibling));
        assert_eq!(by_sibling.balance(address).unwrap(), U256::from(200u64));
    }
}
