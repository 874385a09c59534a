use alloy_primitives::B256;
use bytes::Bytes;

use crate::error::Result;

/// Trie node kinds as the indexer records them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Branch,
    Extension,
    Leaf,
    Removed,
    Unknown,
}

impl From<i32> for NodeType {
    fn from(raw: i32) -> Self {
        match raw {
            0 => NodeType::Branch,
            1 => NodeType::Extension,
            2 => NodeType::Leaf,
            3 => NodeType::Removed,
            _ => NodeType::Unknown,
        }
    }
}

impl From<NodeType> for i32 {
    fn from(ty: NodeType) -> i32 {
        match ty {
            NodeType::Branch => 0,
            NodeType::Extension => 1,
            NodeType::Leaf => 2,
            NodeType::Removed => 3,
            NodeType::Unknown => -1,
        }
    }
}

/// A block reference as it arrives from a caller: a hash, a height, both, or
/// the moving head of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Latest,
    Number(u64),
    Hash(B256),
    HashAndNumber { hash: B256, number: u64 },
}

impl From<u64> for BlockRef {
    fn from(number: u64) -> Self {
        BlockRef::Number(number)
    }
}

impl From<B256> for BlockRef {
    fn from(hash: B256) -> Self {
        BlockRef::Hash(hash)
    }
}

/// A fully resolved reference: both coordinates known. When only a height was
/// given the hash is the canonical header's; when a hash was given the height
/// is that header's own, canonical or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBlock {
    pub hash: B256,
    pub number: u64,
}

/// Newest state-trie leaf (or removal marker) for an account at or before a
/// block. The node bytes are fetched separately, keyed by `mh_key`, so the
/// cache layer can interpose.
#[derive(Debug, Clone)]
pub struct StateLeaf {
    pub cid: String,
    pub mh_key: String,
    pub node_type: NodeType,
    pub block_number: u64,
}

/// Newest storage-trie leaf for a slot, carrying the trie path the deletion
/// probe walks.
#[derive(Debug, Clone)]
pub struct StorageLeaf {
    pub cid: String,
    pub mh_key: String,
    pub node_type: NodeType,
    pub block_number: u64,
    pub storage_path: Vec<u8>,
}

/// Point queries the state reader needs from the index. Implemented by the
/// Postgres-backed store and by [`crate::mock_source::MockStateSource`] in
/// tests.
pub trait StateSource {
    /// Resolve hash and height per the canonical-selection rules: a bare
    /// height prefers the `canonical_header_hash` winner, a bare hash pins
    /// its own (possibly non-canonical) header, and both together must agree.
    fn resolve_block(&self, at: BlockRef) -> Result<ResolvedBlock>;

    /// Newest state row for `state_leaf_key = keccak256(address)` with
    /// `block_number <= at.number`, canonical relative to `at.hash`.
    fn state_leaf_before(&self, leaf_key: B256, at: &ResolvedBlock) -> Result<Option<StateLeaf>>;

    /// Newest storage row for the `(state_leaf_key, storage_leaf_key)` pair
    /// with `block_number <= at.number`, canonical relative to `at.hash`.
    fn storage_leaf_before(
        &self,
        state_leaf_key: B256,
        storage_leaf_key: B256,
        at: &ResolvedBlock,
    ) -> Result<Option<StorageLeaf>>;

    /// Whether a removal marker exists along `storage_path` at a block
    /// strictly after `after` and at or before `at`.
    fn storage_removed_after(
        &self,
        storage_path: &[u8],
        after: u64,
        at: &ResolvedBlock,
    ) -> Result<bool>;

    /// Raw IPLD block bytes for a multihash key. `NotFound` if absent.
    fn ipld(&self, mh_key: &str) -> Result<Bytes>;

    /// Contract code bytes, read from the block store under the key derived
    /// from the code hash.
    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes>;
}

impl<S: StateSource + ?Sized> StateSource for &S {
    fn resolve_block(&self, at: BlockRef) -> Result<ResolvedBlock> {
        (**self).resolve_block(at)
    }

    fn state_leaf_before(&self, leaf_key: B256, at: &ResolvedBlock) -> Result<Option<StateLeaf>> {
        (**self).state_leaf_before(leaf_key, at)
    }

    fn storage_leaf_before(
        &self,
        state_leaf_key: B256,
        storage_leaf_key: B256,
        at: &ResolvedBlock,
    ) -> Result<Option<StorageLeaf>> {
        (**self).storage_leaf_before(state_leaf_key, storage_leaf_key, at)
    }

    fn storage_removed_after(
        &self,
        storage_path: &[u8],
        after: u64,
        at: &ResolvedBlock,
    ) -> Result<bool> {
        (**self).storage_removed_after(storage_path, after, at)
    }

    fn ipld(&self, mh_key: &str) -> Result<Bytes> {
        (**self).ipld(mh_key)
    }

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes> {
        (**self).code_by_hash(code_hash)
    }
}

impl<S: StateSource + ?Sized> StateSource for std::sync::Arc<S> {
    fn resolve_block(&self, at: BlockRef) -> Result<ResolvedBlock> {
        (**self).resolve_block(at)
    }

    fn state_leaf_before(&self, leaf_key: B256, at: &ResolvedBlock) -> Result<Option<StateLeaf>> {
        (**self).state_leaf_before(leaf_key, at)
    }

    fn storage_leaf_before(
        &self,
        state_leaf_key: B256,
        storage_leaf_key: B256,
        at: &ResolvedBlock,
    ) -> Result<Option<StorageLeaf>> {
        (**self).storage_leaf_before(state_leaf_key, storage_leaf_key, at)
    }

    fn storage_removed_after(
        &self,
        storage_path: &[u8],
        after: u64,
        at: &ResolvedBlock,
    ) -> Result<bool> {
        (**self).storage_removed_after(storage_path, after, at)
    }

    fn ipld(&self, mh_key: &str) -> Result<Bytes> {
        (**self).ipld(mh_key)
    }

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes> {
        (**self).code_by_hash(code_hash)
    }
}

/// Multihash-style store key for raw keccak-256 content, used for contract
/// code rows in the block store.
pub fn code_mh_key(code_hash: &B256) -> String {
    // 0x1b = keccak-256 multihash code, 0x20 = digest length
    format!("0x1b20{:x}", code_hash)
}
