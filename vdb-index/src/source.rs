//! [`StateSource`] implementation: the point queries behind the state
//! reader, canonical relative to the queried hash so forked headers resolve
//! through `canonical_header_hash` the same way height queries do.

use bytes::Bytes;
use diesel::RunQueryDsl;
use vdb_state::{
    code_mh_key, BlockRef, Error, ResolvedBlock, Result, StateLeaf, StateSource, StorageLeaf,
};

use crate::{
    filters::{Bind, QueryBuilder},
    models::{ExistsRow, IpldBlock, StateLeafRow, StorageLeafRow},
    store::IndexStore,
};

fn parse_hash(hash: &str) -> Result<alloy_primitives::B256> {
    hash.parse()
        .map_err(|_| Error::internal(format!("malformed block hash in index: {hash}")))
}

fn hash_str(hash: &alloy_primitives::B256) -> String {
    format!("{hash:#x}")
}

impl StateSource for IndexStore {
    fn resolve_block(&self, at: BlockRef) -> Result<ResolvedBlock> {
        match at {
            BlockRef::Latest => {
                let number = self.last_block_number()? as u64;
                let hash = self.canonical_hash(number)?.ok_or(Error::NotFound)?;
                Ok(ResolvedBlock {
                    hash: parse_hash(&hash)?,
                    number,
                })
            }
            BlockRef::Number(number) => {
                let hash = self.canonical_hash(number)?.ok_or(Error::NotFound)?;
                Ok(ResolvedBlock {
                    hash: parse_hash(&hash)?,
                    number,
                })
            }
            BlockRef::Hash(hash) => {
                let header = self.header_by_hash(&hash_str(&hash))?;
                Ok(ResolvedBlock {
                    hash,
                    number: header.block_number.as_u64()?,
                })
            }
            BlockRef::HashAndNumber { hash, number } => {
                let header = self.header_by_hash(&hash_str(&hash))?;
                if header.block_number.as_u64()? != number {
                    return Err(Error::BadRequest(
                        "block hash does not match block number".to_string(),
                    ));
                }
                Ok(ResolvedBlock { hash, number })
            }
        }
    }

    fn state_leaf_before(
        &self,
        leaf_key: alloy_primitives::B256,
        at: &ResolvedBlock,
    ) -> Result<Option<StateLeaf>> {
        let mut query = QueryBuilder::new(
            "SELECT state_cids.cid, state_cids.mh_key, state_cids.node_type, \
             state_cids.block_number \
             FROM eth.state_cids \
             INNER JOIN eth.header_cids ON (\
             state_cids.header_id = header_cids.block_hash \
             AND state_cids.block_number = header_cids.block_number) \
             WHERE state_cids.state_leaf_key = ",
        );
        query.push_bind(Bind::Text(hash_str(&leaf_key)));
        query.push(" AND state_cids.block_number <= ");
        query.push_bind(Bind::BlockNumber(at.number));
        query.push(
            " AND (header_cids.block_hash = \
             (SELECT canonical_header_hash(header_cids.block_number)) \
             OR header_cids.block_hash = ",
        );
        query.push_bind(Bind::Text(hash_str(&at.hash)));
        query.push(") ORDER BY state_cids.block_number DESC, (header_cids.block_hash = ");
        query.push_bind(Bind::Text(hash_str(&at.hash)));
        query.push(") DESC LIMIT 1");

        let rows: Vec<StateLeafRow> = self.with_tx(|conn| query.build().load(conn))?;
        rows.into_iter()
            .next()
            .map(|row| {
                Ok(StateLeaf {
                    cid: row.cid,
                    mh_key: row.mh_key,
                    node_type: row.node_type.into(),
                    block_number: row.block_number.as_u64()?,
                })
            })
            .transpose()
    }

    fn storage_leaf_before(
        &self,
        state_leaf_key: alloy_primitives::B256,
        storage_leaf_key: alloy_primitives::B256,
        at: &ResolvedBlock,
    ) -> Result<Option<StorageLeaf>> {
        let mut query = QueryBuilder::new(
            "SELECT storage_cids.cid, storage_cids.mh_key, storage_cids.node_type, \
             storage_cids.block_number, storage_cids.storage_path \
             FROM eth.storage_cids \
             INNER JOIN eth.state_cids ON (\
             storage_cids.header_id = state_cids.header_id \
             AND storage_cids.state_path = state_cids.state_path \
             AND storage_cids.block_number = state_cids.block_number) \
             INNER JOIN eth.header_cids ON (\
             state_cids.header_id = header_cids.block_hash \
             AND state_cids.block_number = header_cids.block_number) \
             WHERE state_cids.state_leaf_key = ",
        );
        query.push_bind(Bind::Text(hash_str(&state_leaf_key)));
        query.push(" AND storage_cids.storage_leaf_key = ");
        query.push_bind(Bind::Text(hash_str(&storage_leaf_key)));
        query.push(" AND storage_cids.block_number <= ");
        query.push_bind(Bind::BlockNumber(at.number));
        query.push(
            " AND (header_cids.block_hash = \
             (SELECT canonical_header_hash(header_cids.block_number)) \
             OR header_cids.block_hash = ",
        );
        query.push_bind(Bind::Text(hash_str(&at.hash)));
        query.push(") ORDER BY storage_cids.block_number DESC, (header_cids.block_hash = ");
        query.push_bind(Bind::Text(hash_str(&at.hash)));
        query.push(") DESC LIMIT 1");

        let rows: Vec<StorageLeafRow> = self.with_tx(|conn| query.build().load(conn))?;
        rows.into_iter()
            .next()
            .map(|row| {
                Ok(StorageLeaf {
                    cid: row.cid,
                    mh_key: row.mh_key,
                    node_type: row.node_type.into(),
                    block_number: row.block_number.as_u64()?,
                    storage_path: row.storage_path,
                })
            })
            .transpose()
    }

    fn storage_removed_after(
        &self,
        storage_path: &[u8],
        after: u64,
        at: &ResolvedBlock,
    ) -> Result<bool> {
        let mut query = QueryBuilder::new(
            "SELECT EXISTS(SELECT 1 FROM eth.storage_cids \
             INNER JOIN eth.header_cids ON (\
             storage_cids.header_id = header_cids.block_hash \
             AND storage_cids.block_number = header_cids.block_number) \
             WHERE storage_cids.storage_path = ",
        );
        query.push_bind(Bind::Bytes(storage_path.to_vec()));
        query.push(" AND storage_cids.node_type = 3 AND storage_cids.block_number > ");
        query.push_bind(Bind::BlockNumber(after));
        query.push(" AND storage_cids.block_number <= ");
        query.push_bind(Bind::BlockNumber(at.number));
        query.push(
            " AND (header_cids.block_hash = \
             (SELECT canonical_header_hash(header_cids.block_number)) \
             OR header_cids.block_hash = ",
        );
        query.push_bind(Bind::Text(hash_str(&at.hash)));
        query.push(")) AS removed");

        let row: ExistsRow = self.with_tx(|conn| query.build().get_result(conn))?;
        Ok(row.removed)
    }

    fn ipld(&self, mh_key: &str) -> Result<Bytes> {
        let mut query = QueryBuilder::new("SELECT key, data FROM public.blocks WHERE key = ");
        query.push_bind(Bind::Text(mh_key.to_string()));
        let row: IpldBlock = self.with_tx(|conn| query.build().get_result(conn))?;
        Ok(Bytes::from(row.data))
    }

    fn code_by_hash(&self, code_hash: alloy_primitives::B256) -> Result<Bytes> {
        StateSource::ipld(self, &code_mh_key(&code_hash))
    }
}
