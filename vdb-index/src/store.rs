use alloy_primitives::{keccak256, Address};
use bigdecimal::{BigDecimal, ToPrimitive};
use diesel::{
    prelude::*,
    r2d2::{ConnectionManager, Pool, PooledConnection},
};
use tracing::debug;

use vdb_state::{Error, Result};

use crate::{
    filters::{
        log_filter_condition, receipt_filter_conditions, Bind, QueryBuilder, ReceiptFilter,
        StateFilter, StorageFilter, TxFilter,
    },
    models::{
        HeaderRecord, HeaderWithTxs, IpldResult, LogResult, ReceiptRecord, StateNodeRecord,
        StorageNodeRecord, TransactionRecord, TransactionWithIpld, UncleRecord,
    },
    schema::canonical_header_hash,
};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
type PgConn = PooledConnection<ConnectionManager<PgConnection>>;

const HEADER_COLUMNS: &str = "header_cids.cid, header_cids.mh_key, header_cids.block_number, \
     header_cids.block_hash, header_cids.parent_hash, header_cids.state_root, \
     header_cids.tx_root, header_cids.receipt_root, header_cids.uncle_root, header_cids.td, \
     header_cids.bloom, header_cids.timestamp, header_cids.times_validated, header_cids.coinbase";

const TX_COLUMNS: &str = "transaction_cids.cid, transaction_cids.mh_key, \
     transaction_cids.header_id, transaction_cids.block_number, transaction_cids.index, \
     transaction_cids.tx_hash, transaction_cids.src, transaction_cids.dst, \
     transaction_cids.tx_data, transaction_cids.tx_type, transaction_cids.value";

const RECEIPT_COLUMNS: &str = "receipt_cids.leaf_cid AS cid, receipt_cids.leaf_mh_key, \
     receipt_cids.header_id, receipt_cids.block_number, receipt_cids.tx_id, \
     receipt_cids.contract, receipt_cids.contract_hash, receipt_cids.post_status";

pub(crate) fn db_err(e: diesel::result::Error) -> Error {
    match e {
        diesel::result::Error::NotFound => Error::NotFound,
        other => Error::internal(other.to_string()),
    }
}

/// Error carrier for multi-query transactions: lets `?` accept both diesel
/// errors and boundary errors inside one `conn.transaction` closure.
pub(crate) struct TxError(Error);

impl From<diesel::result::Error> for TxError {
    fn from(e: diesel::result::Error) -> Self {
        TxError(db_err(e))
    }
}

impl From<Error> for TxError {
    fn from(e: Error) -> Self {
        TxError(e)
    }
}

/// Hex leaf key of an address: `keccak256(address)` as the index stores it.
pub fn address_leaf_key(address: &str) -> Result<String> {
    let parsed: Address = address
        .parse()
        .map_err(|_| Error::BadRequest(format!("malformed address: {address}")))?;
    Ok(format!("{:#x}", keccak256(parsed)))
}

/// Read-only, typed retrieval over the relational index. Owns all SQL; every
/// public operation runs inside one short read transaction which rolls back
/// on any error and commits otherwise. The store itself holds no mutable
/// state and clones share the underlying pool.
#[derive(Clone)]
pub struct IndexStore {
    pool: PgPool,
}

impl IndexStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn connect(database_url: &str) -> Result<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .build(manager)
            .map_err(|e| Error::internal(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn conn(&self) -> Result<PgConn> {
        self.pool.get().map_err(|e| Error::internal(e.to_string()))
    }

    /// Runs `f` inside a short read transaction; a begin failure surfaces
    /// immediately, an error from `f` rolls back.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&mut PgConn) -> Result<T, diesel::result::Error>,
    ) -> Result<T> {
        let mut conn = self.conn()?;
        conn.transaction(f).map_err(db_err)
    }

    /// As [`Self::with_tx`], for closures that also raise boundary errors.
    fn with_tx_err<T>(&self, f: impl FnOnce(&mut PgConn) -> Result<T, TxError>) -> Result<T> {
        let mut conn = self.conn()?;
        conn.transaction(f).map_err(|TxError(e)| e)
    }

    pub fn first_block_number(&self) -> Result<i64> {
        self.block_number_bound(true)
    }

    pub fn last_block_number(&self) -> Result<i64> {
        self.block_number_bound(false)
    }

    fn block_number_bound(&self, first: bool) -> Result<i64> {
        use crate::schema::header_cids::dsl::*;
        let bound: Option<BigDecimal> = self.with_tx(|conn| {
            let query = header_cids.select(block_number);
            if first {
                query.order(block_number.asc()).first(conn).optional()
            } else {
                query.order(block_number.desc()).first(conn).optional()
            }
        })?;
        bound
            .ok_or(Error::NotFound)?
            .to_i64()
            .ok_or_else(|| Error::internal("block number does not fit in i64"))
    }

    /// The canonical block hash at a height, per the index-provided
    /// max-total-difficulty tie break. `None` when the height is unindexed.
    pub fn canonical_hash(&self, number: u64) -> Result<Option<String>> {
        self.with_tx(|conn| {
            diesel::select(canonical_header_hash(BigDecimal::from(number)))
                .get_result::<Option<String>>(conn)
        })
    }

    /// The authoritative header lookup. Duplicate rows for one hash are an
    /// observed index invariant violation and surface as such.
    pub fn header_by_hash(&self, block_hash: &str) -> Result<HeaderRecord> {
        debug!(block_hash, "retrieving header cid");
        let mut query = QueryBuilder::new(&format!(
            "SELECT {HEADER_COLUMNS} FROM eth.header_cids WHERE block_hash = "
        ));
        query.push_bind(Bind::Text(block_hash.to_string()));
        let mut rows: Vec<HeaderRecord> = self.with_tx(|conn| query.build().load(conn))?;
        match rows.len() {
            0 => Err(Error::NotFound),
            1 => Ok(rows.remove(0)),
            _ => Err(Error::MultipleHeadersForHash(block_hash.to_string())),
        }
    }

    /// All headers at a height, non-canonical siblings included.
    pub fn headers_by_number(&self, number: u64) -> Result<Vec<HeaderRecord>> {
        debug!(number, "retrieving header cids");
        let mut query = QueryBuilder::new(&format!(
            "SELECT {HEADER_COLUMNS} FROM eth.header_cids WHERE block_number = "
        ));
        query.push_bind(Bind::BlockNumber(number));
        self.with_tx(|conn| query.build().load(conn))
    }

    pub fn header_by_number_canonical(&self, number: u64) -> Result<HeaderRecord> {
        let mut query = QueryBuilder::new(&format!(
            "SELECT {HEADER_COLUMNS} FROM eth.header_cids WHERE block_number = "
        ));
        query.push_bind(Bind::BlockNumber(number));
        query.push(" AND block_hash = (SELECT canonical_header_hash(");
        query.push_bind(Bind::BlockNumber(number));
        query.push("))");
        let mut rows: Vec<HeaderRecord> = self.with_tx(|conn| query.build().load(conn))?;
        match rows.len() {
            0 => Err(Error::NotFound),
            _ => Ok(rows.remove(0)),
        }
    }

    pub fn uncles_by_header_id(&self, header_id: &str) -> Result<Vec<UncleRecord>> {
        debug!(header_id, "retrieving uncle cids");
        let mut query = QueryBuilder::new(
            "SELECT cid, mh_key, header_id, block_number, block_hash, parent_hash, \
             uncle_cids.index, reward FROM eth.uncle_cids WHERE header_id = ",
        );
        query.push_bind(Bind::Text(header_id.to_string()));
        query.push(" ORDER BY parent_hash, uncle_cids.index");
        self.with_tx(|conn| query.build().load(conn))
    }

    /// Transactions of a block in authoritative index order, optionally
    /// restricted by source/destination address lists.
    pub fn tx_cids_by_header_id(
        &self,
        header_id: &str,
        number: u64,
        filter: &TxFilter,
    ) -> Result<Vec<TransactionRecord>> {
        debug!(header_id, "retrieving transaction cids");
        let mut query = QueryBuilder::new(&format!(
            "SELECT {TX_COLUMNS} FROM eth.transaction_cids \
             INNER JOIN eth.header_cids ON (\
             transaction_cids.header_id = header_cids.block_hash \
             AND transaction_cids.block_number = header_cids.block_number) \
             WHERE header_cids.block_hash = "
        ));
        query.push_bind(Bind::Text(header_id.to_string()));
        query.push(" AND transaction_cids.block_number = ");
        query.push_bind(Bind::BlockNumber(number));
        if !filter.dst.is_empty() {
            query.push(" AND transaction_cids.dst = ANY(");
            query.push_bind(Bind::TextArray(filter.dst.clone()));
            query.push(")");
        }
        if !filter.src.is_empty() {
            query.push(" AND transaction_cids.src = ANY(");
            query.push_bind(Bind::TextArray(filter.src.clone()));
            query.push(")");
        }
        query.push(" ORDER BY transaction_cids.index");
        self.with_tx(|conn| query.build().load(conn))
    }

    /// Receipts matching a filter at a height or hash, in transaction-index
    /// order. See the filter module for the OR composition rules.
    pub fn receipt_cids_by_filter(
        &self,
        filter: &ReceiptFilter,
        block_number: Option<u64>,
        block_hash: Option<&str>,
        tx_hashes: &[String],
    ) -> Result<Vec<ReceiptRecord>> {
        debug!(?block_number, "retrieving receipt cids");
        let mut query = QueryBuilder::new(&format!(
            "SELECT {RECEIPT_COLUMNS} \
             FROM eth.receipt_cids, eth.transaction_cids, eth.header_cids \
             WHERE receipt_cids.tx_id = transaction_cids.tx_hash \
             AND receipt_cids.header_id = transaction_cids.header_id \
             AND receipt_cids.block_number = transaction_cids.block_number \
             AND transaction_cids.header_id = header_cids.block_hash \
             AND transaction_cids.block_number = header_cids.block_number"
        ));
        if let Some(number) = block_number {
            query.push(" AND header_cids.block_number = ");
            query.push_bind(Bind::BlockNumber(number));
        }
        if let Some(hash) = block_hash {
            query.push(" AND header_cids.block_hash = ");
            query.push_bind(Bind::Text(hash.to_string()));
        }
        receipt_filter_conditions(&mut query, filter, tx_hashes);
        query.push(" ORDER BY transaction_cids.index");
        self.with_tx(|conn| query.build().load(conn))
    }

    /// Logs matching a filter, joined to their receipt, transaction and raw
    /// IPLD bytes, strictly ordered by `(tx index, log index)`.
    pub fn filtered_logs(
        &self,
        filter: &ReceiptFilter,
        block_hash: Option<&str>,
        block_number: Option<u64>,
    ) -> Result<Vec<LogResult>> {
        debug!(?block_hash, "retrieving log cids");
        let mut query = QueryBuilder::new(
            "SELECT eth.log_cids.block_number, header_cids.block_hash, eth.log_cids.leaf_cid, \
             eth.log_cids.leaf_mh_key, eth.log_cids.index, eth.log_cids.rct_id, \
             eth.log_cids.address, eth.log_cids.topic0, eth.log_cids.topic1, \
             eth.log_cids.topic2, eth.log_cids.topic3, eth.log_cids.log_data, \
             eth.transaction_cids.tx_hash, eth.transaction_cids.index AS txn_index, \
             data, eth.receipt_cids.post_status \
             FROM eth.log_cids, eth.receipt_cids, eth.transaction_cids, eth.header_cids, \
             public.blocks \
             WHERE eth.log_cids.rct_id = receipt_cids.tx_id \
             AND eth.log_cids.header_id = receipt_cids.header_id \
             AND eth.log_cids.block_number = receipt_cids.block_number \
             AND receipt_cids.tx_id = transaction_cids.tx_hash \
             AND receipt_cids.header_id = transaction_cids.header_id \
             AND receipt_cids.block_number = transaction_cids.block_number \
             AND transaction_cids.header_id = header_cids.block_hash \
             AND transaction_cids.block_number = header_cids.block_number \
             AND log_cids.leaf_mh_key = blocks.key \
             AND log_cids.block_number = blocks.block_number",
        );
        if let Some(number) = block_number {
            query.push(" AND header_cids.block_number = ");
            query.push_bind(Bind::BlockNumber(number));
        }
        if let Some(hash) = block_hash {
            query.push(" AND header_cids.block_hash = ");
            query.push_bind(Bind::Text(hash.to_string()));
        }
        log_filter_condition(&mut query, filter);
        query.push(" ORDER BY eth.transaction_cids.index, log_cids.index");
        self.with_tx(|conn| query.build().load(conn))
    }

    /// State nodes for a header. An address list narrows to the keccak leaf
    /// keys; without `intermediate_nodes` only leaves are returned.
    pub fn state_cids_by_filter(
        &self,
        filter: &StateFilter,
        header_id: &str,
    ) -> Result<Vec<StateNodeRecord>> {
        debug!(header_id, "retrieving state cids");
        let mut query = QueryBuilder::new(
            "SELECT state_cids.cid, state_cids.mh_key, state_cids.header_id, \
             state_cids.block_number, state_cids.state_path, state_cids.state_leaf_key, \
             state_cids.node_type \
             FROM eth.state_cids INNER JOIN eth.header_cids ON (\
             state_cids.header_id = header_cids.block_hash \
             AND state_cids.block_number = header_cids.block_number) \
             WHERE header_cids.block_hash = ",
        );
        query.push_bind(Bind::Text(header_id.to_string()));
        if !filter.addresses.is_empty() {
            let keys = filter
                .addresses
                .iter()
                .map(|address| address_leaf_key(address))
                .collect::<Result<Vec<_>>>()?;
            query.push(" AND state_cids.state_leaf_key = ANY(");
            query.push_bind(Bind::TextArray(keys));
            query.push(")");
        }
        if !filter.intermediate_nodes {
            query.push(" AND state_cids.node_type = 2");
        }
        self.with_tx(|conn| query.build().load(conn))
    }

    pub fn storage_cids_by_filter(
        &self,
        filter: &StorageFilter,
        header_id: &str,
    ) -> Result<Vec<StorageNodeRecord>> {
        debug!(header_id, "retrieving storage cids");
        let mut query = QueryBuilder::new(
            "SELECT storage_cids.cid, storage_cids.mh_key, storage_cids.header_id, \
             storage_cids.block_number, storage_cids.state_path, storage_cids.storage_path, \
             state_cids.state_leaf_key, storage_cids.storage_leaf_key, storage_cids.node_type \
             FROM eth.storage_cids, eth.state_cids, eth.header_cids \
             WHERE storage_cids.header_id = state_cids.header_id \
             AND storage_cids.state_path = state_cids.state_path \
             AND storage_cids.block_number = state_cids.block_number \
             AND state_cids.header_id = header_cids.block_hash \
             AND state_cids.block_number = header_cids.block_number \
             AND header_cids.block_hash = ",
        );
        query.push_bind(Bind::Text(header_id.to_string()));
        if !filter.addresses.is_empty() {
            let keys = filter
                .addresses
                .iter()
                .map(|address| address_leaf_key(address))
                .collect::<Result<Vec<_>>>()?;
            query.push(" AND state_cids.state_leaf_key = ANY(");
            query.push_bind(Bind::TextArray(keys));
            query.push(")");
        }
        if !filter.storage_keys.is_empty() {
            query.push(" AND storage_cids.storage_leaf_key = ANY(");
            query.push_bind(Bind::TextArray(filter.storage_keys.clone()));
            query.push(")");
        }
        if !filter.intermediate_nodes {
            query.push(" AND storage_cids.node_type = 2");
        }
        self.with_tx(|conn| query.build().load(conn))
    }

    /// A transaction restricted to its canonical block. A transaction
    /// appearing in more than one canonical block is an index invariant
    /// violation.
    pub fn tx_cid_by_hash(
        &self,
        tx_hash: &str,
        block_number: Option<u64>,
    ) -> Result<TransactionRecord> {
        debug!(tx_hash, "retrieving transaction cid");
        let mut query = QueryBuilder::new(&format!(
            "SELECT {TX_COLUMNS} FROM eth.transaction_cids WHERE tx_hash = "
        ));
        query.push_bind(Bind::Text(tx_hash.to_string()));
        query.push(
            " AND transaction_cids.header_id = \
             (SELECT canonical_header_hash(transaction_cids.block_number))",
        );
        if let Some(number) = block_number {
            query.push(" AND transaction_cids.block_number = ");
            query.push_bind(Bind::BlockNumber(number));
        }
        let mut rows: Vec<TransactionRecord> = self.with_tx(|conn| query.build().load(conn))?;
        match rows.len() {
            0 => Err(Error::NotFound),
            1 => Ok(rows.remove(0)),
            _ => Err(Error::TxInMultipleBlocks),
        }
    }

    /// Header plus its ordered transactions, each carrying IPLD bytes,
    /// eager-joined inside one transaction.
    pub fn header_and_tx_cids_by_hash(
        &self,
        block_hash: &str,
        block_number: Option<u64>,
    ) -> Result<HeaderWithTxs> {
        let mut header_query = QueryBuilder::new(&format!(
            "SELECT {HEADER_COLUMNS} FROM eth.header_cids WHERE block_hash = "
        ));
        header_query.push_bind(Bind::Text(block_hash.to_string()));
        if let Some(number) = block_number {
            header_query.push(" AND header_cids.block_number = ");
            header_query.push_bind(Bind::BlockNumber(number));
        }

        self.with_tx_err(|conn| {
            let mut headers: Vec<HeaderRecord> = header_query.build().load(conn)?;
            if headers.is_empty() {
                return Err(Error::NotFound.into());
            }
            if headers.len() > 1 {
                return Err(Error::MultipleHeadersForHash(block_hash.to_string()).into());
            }
            assemble_header_with_txs(conn, headers.remove(0))
        })
    }

    pub fn header_and_tx_cids_by_number(&self, number: u64) -> Result<Vec<HeaderWithTxs>> {
        let mut header_query = QueryBuilder::new(&format!(
            "SELECT {HEADER_COLUMNS} FROM eth.header_cids WHERE block_number = "
        ));
        header_query.push_bind(Bind::BlockNumber(number));

        self.with_tx_err(|conn| {
            let headers: Vec<HeaderRecord> = header_query.build().load(conn)?;
            headers
                .into_iter()
                .map(|header| assemble_header_with_txs(conn, header))
                .collect()
        })
    }

    /// The receipt IPLD for a transaction hash: a clean 3-way
    /// receipt↔transaction↔block join.
    pub fn receipt_by_tx_hash(&self, tx_hash: &str) -> Result<IpldResult> {
        let mut query = QueryBuilder::new(
            "SELECT receipt_cids.leaf_cid AS cid, data \
             FROM eth.receipt_cids \
             INNER JOIN eth.transaction_cids ON (\
             receipt_cids.tx_id = transaction_cids.tx_hash \
             AND receipt_cids.header_id = transaction_cids.header_id \
             AND receipt_cids.block_number = transaction_cids.block_number) \
             INNER JOIN public.blocks ON (\
             receipt_cids.leaf_mh_key = blocks.key \
             AND receipt_cids.block_number = blocks.block_number) \
             WHERE transaction_cids.tx_hash = ",
        );
        query.push_bind(Bind::Text(tx_hash.to_string()));
        self.one(query)
    }

    pub fn header_ipld_by_hash(&self, block_hash: &str) -> Result<IpldResult> {
        let mut query = QueryBuilder::new(
            "SELECT cid, data FROM eth.header_cids \
             INNER JOIN public.blocks ON (header_cids.mh_key = blocks.key \
             AND header_cids.block_number = blocks.block_number) \
             WHERE block_hash = ",
        );
        query.push_bind(Bind::Text(block_hash.to_string()));
        self.one(query)
    }

    /// May return more than one result: non-canonical siblings coexist.
    pub fn header_iplds_by_number(&self, number: u64) -> Result<Vec<IpldResult>> {
        let mut query = QueryBuilder::new(
            "SELECT cid, data FROM eth.header_cids \
             INNER JOIN public.blocks ON (header_cids.mh_key = blocks.key \
             AND header_cids.block_number = blocks.block_number) \
             WHERE block_number = ",
        );
        query.push_bind(Bind::BlockNumber(number));
        self.with_tx(|conn| query.build().load(conn))
    }

    pub fn uncle_iplds_by_block_hash(&self, block_hash: &str) -> Result<Vec<IpldResult>> {
        let mut query = QueryBuilder::new(
            "SELECT uncle_cids.cid, data \
             FROM eth.uncle_cids, eth.header_cids, public.blocks \
             WHERE uncle_cids.header_id = header_cids.block_hash \
             AND uncle_cids.block_number = header_cids.block_number \
             AND uncle_cids.mh_key = blocks.key \
             AND uncle_cids.block_number = blocks.block_number \
             AND header_cids.block_hash = ",
        );
        query.push_bind(Bind::Text(block_hash.to_string()));
        query.push(" ORDER BY uncle_cids.parent_hash, uncle_cids.index");
        self.with_tx(|conn| query.build().load(conn))
    }

    pub fn tx_iplds_by_block_hash(&self, block_hash: &str) -> Result<Vec<IpldResult>> {
        let mut query = QueryBuilder::new(
            "SELECT transaction_cids.cid, data \
             FROM eth.transaction_cids, eth.header_cids, public.blocks \
             WHERE transaction_cids.header_id = header_cids.block_hash \
             AND transaction_cids.block_number = header_cids.block_number \
             AND transaction_cids.mh_key = blocks.key \
             AND transaction_cids.block_number = blocks.block_number \
             AND header_cids.block_hash = ",
        );
        query.push_bind(Bind::Text(block_hash.to_string()));
        query.push(" ORDER BY transaction_cids.index");
        self.with_tx(|conn| query.build().load(conn))
    }

    /// Receipt IPLDs of a block ordered by the owning transaction's index.
    pub fn receipt_iplds_by_block_hash(&self, block_hash: &str) -> Result<Vec<IpldResult>> {
        let mut query = QueryBuilder::new(
            "SELECT receipt_cids.leaf_cid AS cid, data \
             FROM eth.receipt_cids, eth.transaction_cids, eth.header_cids, public.blocks \
             WHERE receipt_cids.tx_id = transaction_cids.tx_hash \
             AND receipt_cids.header_id = transaction_cids.header_id \
             AND receipt_cids.block_number = transaction_cids.block_number \
             AND transaction_cids.header_id = header_cids.block_hash \
             AND transaction_cids.block_number = header_cids.block_number \
             AND receipt_cids.leaf_mh_key = blocks.key \
             AND receipt_cids.block_number = blocks.block_number \
             AND header_cids.block_hash = ",
        );
        query.push_bind(Bind::Text(block_hash.to_string()));
        query.push(" ORDER BY transaction_cids.index");
        self.with_tx(|conn| query.build().load(conn))
    }

    pub fn tx_ipld_by_hash(&self, tx_hash: &str) -> Result<IpldResult> {
        let mut query = QueryBuilder::new(
            "SELECT cid, data FROM eth.transaction_cids \
             INNER JOIN public.blocks ON (transaction_cids.mh_key = blocks.key \
             AND transaction_cids.block_number = blocks.block_number) \
             WHERE tx_hash = ",
        );
        query.push_bind(Bind::Text(tx_hash.to_string()));
        self.one(query)
    }

    fn one(&self, query: QueryBuilder) -> Result<IpldResult> {
        self.with_tx(|conn| query.build().get_result(conn))
    }
}

fn assemble_header_with_txs(
    conn: &mut PgConn,
    header: HeaderRecord,
) -> Result<HeaderWithTxs, TxError> {
    let number = header.block_number.as_u64()?;

    let mut ipld_query =
        QueryBuilder::new("SELECT key, data FROM public.blocks WHERE key = ");
    ipld_query.push_bind(Bind::Text(header.mh_key.clone()));
    ipld_query.push(" AND block_number = ");
    ipld_query.push_bind(Bind::BlockNumber(number));
    let header_ipld: crate::models::IpldBlock = ipld_query.build().get_result(conn)?;

    let mut tx_query = QueryBuilder::new(
        "SELECT transaction_cids.cid, transaction_cids.mh_key, transaction_cids.header_id, \
         transaction_cids.block_number, transaction_cids.index, transaction_cids.tx_hash, \
         transaction_cids.src, transaction_cids.dst, data \
         FROM eth.transaction_cids INNER JOIN public.blocks ON (\
         transaction_cids.mh_key = blocks.key \
         AND transaction_cids.block_number = blocks.block_number) \
         WHERE transaction_cids.header_id = ",
    );
    tx_query.push_bind(Bind::Text(header.block_hash.clone()));
    tx_query.push(" AND transaction_cids.block_number = ");
    tx_query.push_bind(Bind::BlockNumber(number));
    tx_query.push(" ORDER BY transaction_cids.index");
    let transactions: Vec<TransactionWithIpld> = tx_query.build().load(conn)?;

    Ok(HeaderWithTxs {
        header,
        header_ipld: header_ipld.data,
        transactions,
    })
}
