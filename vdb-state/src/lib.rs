//! Historical account and storage state resolution over an externally
//! populated IPLD chain index.
//!
//! The index records state and storage trie nodes as content-addressed
//! blocks plus relational rows locating them by leaf key and block. This
//! crate turns those point lookups into an account-state view at an
//! arbitrary block, with correct semantics for forks, deleted accounts and
//! self-destructed contracts, behind a process-wide two-tier node cache.

pub mod cache;
pub mod decode;
pub mod error;
pub mod mock_source;
pub mod reader;
pub mod source;

pub use cache::{CacheConfig, GroupCache, GroupCacheConfig};
pub use error::{Error, Result};
pub use reader::{Proof, ProofSlot, StateReader, EMPTY_NODE_VALUE};
pub use source::{
    code_mh_key, BlockRef, NodeType, ResolvedBlock, StateLeaf, StateSource, StorageLeaf,
};
