use bigdecimal::BigDecimal;
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    pg::{Pg, PgValue},
    prelude::*,
    sql_types::{BigInt, Bool, Bytea, Integer, Nullable, Numeric, Text, VarChar},
};
use vdb_state::{Error, NodeType};

/// Arbitrary-precision numerics (block numbers, total difficulties, rewards)
/// cross the DB boundary as decimal strings; code parses before comparing.
#[derive(Debug, Clone, PartialEq, Eq, FromSqlRow)]
pub struct NumericString(pub String);

impl NumericString {
    pub fn as_u64(&self) -> Result<u64, Error> {
        self.0
            .parse()
            .map_err(|_| Error::internal(format!("non-integral numeric column: {}", self.0)))
    }

    pub fn as_i64(&self) -> Result<i64, Error> {
        self.0
            .parse()
            .map_err(|_| Error::internal(format!("non-integral numeric column: {}", self.0)))
    }
}

impl std::fmt::Display for NumericString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for NumericString {
    fn from(n: u64) -> Self {
        NumericString(n.to_string())
    }
}

impl FromSql<Numeric, Pg> for NumericString {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let decimal = <BigDecimal as FromSql<Numeric, Pg>>::from_sql(bytes)?;
        Ok(NumericString(decimal.normalized().to_string()))
    }
}

#[derive(Debug, Clone, QueryableByName)]
pub struct HeaderRecord {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub mh_key: String,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = VarChar)]
    pub block_hash: String,
    #[diesel(sql_type = VarChar)]
    pub parent_hash: String,
    #[diesel(sql_type = VarChar)]
    pub state_root: String,
    #[diesel(sql_type = VarChar)]
    pub tx_root: String,
    #[diesel(sql_type = VarChar)]
    pub receipt_root: String,
    #[diesel(sql_type = VarChar)]
    pub uncle_root: String,
    #[diesel(sql_type = Numeric)]
    pub td: NumericString,
    #[diesel(sql_type = Bytea)]
    pub bloom: Vec<u8>,
    #[diesel(sql_type = BigInt)]
    pub timestamp: i64,
    #[diesel(sql_type = Integer)]
    pub times_validated: i32,
    #[diesel(sql_type = VarChar)]
    pub coinbase: String,
}

#[derive(Debug, Clone, QueryableByName)]
pub struct UncleRecord {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub mh_key: String,
    #[diesel(sql_type = VarChar)]
    pub header_id: String,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = VarChar)]
    pub block_hash: String,
    #[diesel(sql_type = VarChar)]
    pub parent_hash: String,
    #[diesel(sql_type = Integer)]
    pub index: i32,
    #[diesel(sql_type = Numeric)]
    pub reward: NumericString,
}

#[derive(Debug, Clone, QueryableByName)]
pub struct TransactionRecord {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub mh_key: String,
    #[diesel(sql_type = VarChar)]
    pub header_id: String,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = Integer)]
    pub index: i32,
    #[diesel(sql_type = VarChar)]
    pub tx_hash: String,
    #[diesel(sql_type = VarChar)]
    pub src: String,
    #[diesel(sql_type = VarChar)]
    pub dst: String,
    #[diesel(sql_type = Bytea)]
    pub tx_data: Vec<u8>,
    #[diesel(sql_type = Integer)]
    pub tx_type: i32,
    #[diesel(sql_type = Numeric)]
    pub value: NumericString,
}

/// A transaction row joined to its raw IPLD block.
#[derive(Debug, Clone, QueryableByName)]
pub struct TransactionWithIpld {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub mh_key: String,
    #[diesel(sql_type = VarChar)]
    pub header_id: String,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = Integer)]
    pub index: i32,
    #[diesel(sql_type = VarChar)]
    pub tx_hash: String,
    #[diesel(sql_type = VarChar)]
    pub src: String,
    #[diesel(sql_type = VarChar)]
    pub dst: String,
    #[diesel(sql_type = Bytea)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, QueryableByName)]
pub struct ReceiptRecord {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub leaf_mh_key: String,
    #[diesel(sql_type = VarChar)]
    pub header_id: String,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = VarChar)]
    pub tx_id: String,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub contract: Option<String>,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub contract_hash: Option<String>,
    #[diesel(sql_type = Integer)]
    pub post_status: i32,
}

/// A log row joined to its receipt, owning transaction and raw IPLD bytes,
/// as `getLogs` serves it.
#[derive(Debug, Clone, QueryableByName)]
pub struct LogResult {
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = VarChar)]
    pub block_hash: String,
    #[diesel(sql_type = Text)]
    pub leaf_cid: String,
    #[diesel(sql_type = Text)]
    pub leaf_mh_key: String,
    #[diesel(sql_type = Integer)]
    pub index: i32,
    #[diesel(sql_type = VarChar)]
    pub rct_id: String,
    #[diesel(sql_type = VarChar)]
    pub address: String,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub topic0: Option<String>,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub topic1: Option<String>,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub topic2: Option<String>,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub topic3: Option<String>,
    #[diesel(sql_type = Bytea)]
    pub log_data: Vec<u8>,
    #[diesel(sql_type = VarChar)]
    pub tx_hash: String,
    #[diesel(sql_type = Integer)]
    pub txn_index: i32,
    #[diesel(sql_type = Bytea)]
    pub data: Vec<u8>,
    #[diesel(sql_type = Integer)]
    pub post_status: i32,
}

#[derive(Debug, Clone, QueryableByName)]
pub struct StateNodeRecord {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub mh_key: String,
    #[diesel(sql_type = VarChar)]
    pub header_id: String,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = Bytea)]
    pub state_path: Vec<u8>,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub state_leaf_key: Option<String>,
    #[diesel(sql_type = Integer)]
    pub node_type: i32,
}

impl StateNodeRecord {
    pub fn node_type(&self) -> NodeType {
        NodeType::from(self.node_type)
    }
}

#[derive(Debug, Clone, QueryableByName)]
pub struct StorageNodeRecord {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub mh_key: String,
    #[diesel(sql_type = VarChar)]
    pub header_id: String,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = Bytea)]
    pub state_path: Vec<u8>,
    #[diesel(sql_type = Bytea)]
    pub storage_path: Vec<u8>,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub state_leaf_key: Option<String>,
    #[diesel(sql_type = Nullable<VarChar>)]
    pub storage_leaf_key: Option<String>,
    #[diesel(sql_type = Integer)]
    pub node_type: i32,
}

impl StorageNodeRecord {
    pub fn node_type(&self) -> NodeType {
        NodeType::from(self.node_type)
    }
}

/// `(cid, data)` pair returned by the IPLD-joined retrievals.
#[derive(Debug, Clone, QueryableByName)]
pub struct IpldResult {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Bytea)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, QueryableByName)]
pub struct IpldBlock {
    #[diesel(sql_type = Text)]
    pub key: String,
    #[diesel(sql_type = Bytea)]
    pub data: Vec<u8>,
}

/// A header record eagerly joined with its ordered transactions, each with
/// IPLD bytes. The cyclic header↔transaction relation is carried as
/// identifiers, never owning pointers.
#[derive(Debug, Clone)]
pub struct HeaderWithTxs {
    pub header: HeaderRecord,
    pub header_ipld: Vec<u8>,
    pub transactions: Vec<TransactionWithIpld>,
}

#[derive(QueryableByName)]
pub(crate) struct ExistsRow {
    #[diesel(sql_type = Bool)]
    pub removed: bool,
}

#[derive(QueryableByName)]
pub(crate) struct StateLeafRow {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub mh_key: String,
    #[diesel(sql_type = Integer)]
    pub node_type: i32,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
}

#[derive(QueryableByName)]
pub(crate) struct StorageLeafRow {
    #[diesel(sql_type = Text)]
    pub cid: String,
    #[diesel(sql_type = Text)]
    pub mh_key: String,
    #[diesel(sql_type = Integer)]
    pub node_type: i32,
    #[diesel(sql_type = Numeric)]
    pub block_number: NumericString,
    #[diesel(sql_type = Bytea)]
    pub storage_path: Vec<u8>,
}
