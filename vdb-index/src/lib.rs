//! Typed, read-only retrieval over the relational IPLD chain index.
//!
//! The index is populated by an external chain indexer: headers,
//! transactions, receipts, logs and trie nodes land as content-addressed
//! raw blocks in `public.blocks` plus locating rows in the `eth` schema.
//! Canonicity is never stored on a row; the index-provided
//! `canonical_header_hash` SQL function picks the max-total-difficulty
//! winner at each height, and non-canonical siblings coexist.

pub mod filters;
pub mod ipld;
pub mod models;
pub mod schema;
pub mod source;
pub mod store;

pub use filters::{Bind, QueryBuilder, ReceiptFilter, StateFilter, StorageFilter, TxFilter};
pub use ipld::{ChainDb, IpldStore};
pub use models::{
    HeaderRecord, HeaderWithTxs, IpldBlock, IpldResult, LogResult, NumericString, ReceiptRecord,
    StateNodeRecord, StorageNodeRecord, TransactionRecord, TransactionWithIpld, UncleRecord,
};
pub use store::{address_leaf_key, IndexStore, PgPool};
