//! In-memory [`StateSource`] for tests, in the spirit of a mock database:
//! fixtures are pushed in with setter methods and the trait answers from
//! hash maps.

use std::collections::HashMap;

use alloy_consensus::Account;
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::Encodable;
use bytes::Bytes;

use crate::{
    error::{Error, Result},
    source::{
        code_mh_key, BlockRef, NodeType, ResolvedBlock, StateLeaf, StateSource, StorageLeaf,
    },
};

#[derive(Debug, Clone)]
struct MockLeafRow {
    leaf_key: B256,
    storage_leaf_key: Option<B256>,
    storage_path: Vec<u8>,
    header_hash: B256,
    block_number: u64,
    node_type: NodeType,
    mh_key: String,
    cid: String,
}

#[derive(Debug, Default)]
pub struct MockStateSource {
    latest: Option<ResolvedBlock>,
    headers: HashMap<B256, u64>,
    canonical: HashMap<u64, B256>,
    state_rows: Vec<MockLeafRow>,
    storage_rows: Vec<MockLeafRow>,
    iplds: HashMap<String, Bytes>,
}

fn encode_leaf(path: &[u8], value: &[u8]) -> Vec<u8> {
    let items: [&[u8]; 2] = [path, value];
    let mut out = Vec::new();
    alloy_rlp::encode_list::<&[u8], [u8]>(&items, &mut out);
    out
}

impl MockStateSource {
    pub fn push_canonical_block(&mut self, number: u64, hash: B256) -> ResolvedBlock {
        self.headers.insert(hash, number);
        self.canonical.insert(number, hash);
        let block = ResolvedBlock { hash, number };
        if self.latest.map_or(true, |head| head.number <= number) {
            self.latest = Some(block);
        }
        block
    }

    pub fn push_sibling_block(&mut self, number: u64, hash: B256) -> ResolvedBlock {
        self.headers.insert(hash, number);
        ResolvedBlock { hash, number }
    }

    pub fn insert_account(
        &mut self,
        address: Address,
        block_number: u64,
        header_hash: B256,
        account: Account,
    ) {
        let leaf_key = keccak256(address);
        let mut blob = Vec::new();
        account.encode(&mut blob);
        let node = encode_leaf(&leaf_key[..], &blob);
        let mh_key = format!("state-{leaf_key:x}-{block_number}-{header_hash:x}");
        let cid = format!("cid-{mh_key}");
        self.iplds.insert(mh_key.clone(), Bytes::from(node));
        self.state_rows.push(MockLeafRow {
            leaf_key,
            storage_leaf_key: None,
            storage_path: Vec::new(),
            header_hash,
            block_number,
            node_type: NodeType::Leaf,
            mh_key,
            cid,
        });
    }

    pub fn remove_account(&mut self, address: Address, block_number: u64, header_hash: B256) {
        let leaf_key = keccak256(address);
        let mh_key = format!("state-removed-{leaf_key:x}-{block_number}");
        self.state_rows.push(MockLeafRow {
            leaf_key,
            storage_leaf_key: None,
            storage_path: Vec::new(),
            header_hash,
            block_number,
            node_type: NodeType::Removed,
            cid: format!("cid-{mh_key}"),
            mh_key,
        });
    }

    pub fn insert_storage(
        &mut self,
        address: Address,
        slot: B256,
        block_number: u64,
        header_hash: B256,
        value: U256,
    ) {
        let leaf_key = keccak256(address);
        let storage_leaf_key = keccak256(slot);
        let mut word = Vec::new();
        value.encode(&mut word);
        let node = encode_leaf(&storage_leaf_key[..], &word);
        let mh_key = format!("storage-{leaf_key:x}-{storage_leaf_key:x}-{block_number}");
        let cid = format!("cid-{mh_key}");
        self.iplds.insert(mh_key.clone(), Bytes::from(node));
        self.storage_rows.push(MockLeafRow {
            leaf_key,
            storage_leaf_key: Some(storage_leaf_key),
            storage_path: storage_leaf_key.to_vec(),
            header_hash,
            block_number,
            node_type: NodeType::Leaf,
            mh_key,
            cid,
        });
    }

    /// Records a removal marker along the slot's trie path, as the indexer
    /// does when a contract self-destructs.
    pub fn remove_storage_path(
        &mut self,
        address: Address,
        slot: B256,
        block_number: u64,
        header_hash: B256,
    ) {
        let leaf_key = keccak256(address);
        let storage_leaf_key = keccak256(slot);
        let mh_key = format!("storage-removed-{leaf_key:x}-{storage_leaf_key:x}-{block_number}");
        self.storage_rows.push(MockLeafRow {
            leaf_key,
            storage_leaf_key: Some(storage_leaf_key),
            storage_path: storage_leaf_key.to_vec(),
            header_hash,
            block_number,
            node_type: NodeType::Removed,
            cid: format!("cid-{mh_key}"),
            mh_key,
        });
    }

    pub fn insert_code(&mut self, code: &[u8]) -> B256 {
        let code_hash = keccak256(code);
        self.iplds
            .insert(code_mh_key(&code_hash), Bytes::copy_from_slice(code));
        code_hash
    }

    pub fn insert_ipld(&mut self, mh_key: impl Into<String>, data: Bytes) {
        self.iplds.insert(mh_key.into(), data);
    }

    /// Canonicity relative to the resolved block: a row counts when its
    /// header is the canonical winner at its height, or is the queried hash
    /// itself (a pinned sibling).
    fn visible(&self, row: &MockLeafRow, at: &ResolvedBlock) -> bool {
        row.block_number <= at.number
            && (row.header_hash == at.hash
                || self.canonical.get(&row.block_number) == Some(&row.header_hash))
    }

    fn newest<'a>(
        &self,
        rows: impl Iterator<Item = &'a MockLeafRow>,
        at: &ResolvedBlock,
    ) -> Option<MockLeafRow> {
        rows.filter(|row| self.visible(row, at))
            .max_by_key(|row| (row.block_number, row.header_hash == at.hash))
            .cloned()
    }
}

impl StateSource for MockStateSource {
    fn resolve_block(&self, at: BlockRef) -> Result<ResolvedBlock> {
        match at {
            BlockRef::Latest => self.latest.ok_or(Error::NotFound),
            BlockRef::Number(number) => self
                .canonical
                .get(&number)
                .map(|hash| ResolvedBlock {
                    hash: *hash,
                    number,
                })
                .ok_or(Error::NotFound),
            BlockRef::Hash(hash) => self
                .headers
                .get(&hash)
                .map(|number| ResolvedBlock {
                    hash,
                    number: *number,
                })
                .ok_or(Error::NotFound),
            BlockRef::HashAndNumber { hash, number } => match self.headers.get(&hash) {
                Some(actual) if *actual == number => Ok(ResolvedBlock { hash, number }),
                Some(_) => Err(Error::BadRequest(
                    "block hash does not match block number".to_string(),
                )),
                None => Err(Error::NotFound),
            },
        }
    }

    fn state_leaf_before(&self, leaf_key: B256, at: &ResolvedBlock) -> Result<Option<StateLeaf>> {
        Ok(self
            .newest(
                self.state_rows.iter().filter(|row| row.leaf_key == leaf_key),
                at,
            )
            .map(|row| StateLeaf {
                cid: row.cid,
                mh_key: row.mh_key,
                node_type: row.node_type,
                block_number: row.block_number,
            }))
    }

    fn storage_leaf_before(
        &self,
        state_leaf_key: B256,
        storage_leaf_key: B256,
        at: &ResolvedBlock,
    ) -> Result<Option<StorageLeaf>> {
        Ok(self
            .newest(
                self.storage_rows.iter().filter(|row| {
                    row.leaf_key == state_leaf_key
                        && row.storage_leaf_key == Some(storage_leaf_key)
                }),
                at,
            )
            .map(|row| StorageLeaf {
                cid: row.cid,
                mh_key: row.mh_key,
                node_type: row.node_type,
                block_number: row.block_number,
                storage_path: row.storage_path,
            }))
    }

    fn storage_removed_after(
        &self,
        storage_path: &[u8],
        after: u64,
        at: &ResolvedBlock,
    ) -> Result<bool> {
        Ok(self.storage_rows.iter().any(|row| {
            row.node_type == NodeType::Removed
                && row.storage_path == storage_path
                && row.block_number > after
                && self.visible(row, at)
        }))
    }

    fn ipld(&self, mh_key: &str) -> Result<Bytes> {
        self.iplds.get(mh_key).cloned().ok_or(Error::NotFound)
    }

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes> {
        self.ipld(&code_mh_key(&code_hash))
    }
}
