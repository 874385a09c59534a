//! Content-addressed raw block access over `public.blocks`, and the minimal
//! chain-database adapter the EVM consumes.

use std::collections::HashMap;

use alloy_primitives::B256;
use bytes::Bytes;
use diesel::prelude::*;
use vdb_state::{code_mh_key, Error, Result};

use crate::store::{db_err, IndexStore, PgPool};

/// Reader for raw IPLD blocks keyed by multihash key.
#[derive(Clone)]
pub struct IpldStore {
    pool: PgPool,
}

impl IpldStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn from_index(store: &IndexStore) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    fn conn(&self) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>>
    {
        self.pool.get().map_err(|e| Error::internal(e.to_string()))
    }

    /// The raw bytes for one key. `NotFound` when the row is absent.
    pub fn get(&self, mh_key: &str) -> Result<Bytes> {
        use crate::schema::blocks::dsl::*;
        let mut conn = self.conn()?;
        let row: Vec<u8> = blocks
            .filter(key.eq(mh_key))
            .select(data)
            .first(&mut conn)
            .map_err(db_err)?;
        Ok(Bytes::from(row))
    }

    /// Batch read; absent keys are simply missing from the map.
    pub fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        use crate::schema::blocks::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<(String, Vec<u8>)> = blocks
            .filter(key.eq_any(keys))
            .select((key, data))
            .load(&mut conn)
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|(k, bytes)| (k, Bytes::from(bytes)))
            .collect())
    }

    pub fn has(&self, mh_key: &str) -> Result<bool> {
        use crate::schema::blocks::dsl::*;
        let mut conn = self.conn()?;
        let found: i64 = blocks
            .filter(key.eq(mh_key))
            .count()
            .get_result(&mut conn)
            .map_err(db_err)?;
        Ok(found > 0)
    }

    /// Contract code bytes under the keccak-derived store key.
    pub fn code(&self, code_hash: &B256) -> Result<Bytes> {
        self.get(&code_mh_key(code_hash))
    }
}

/// The chain-database surface handed to the EVM: `has`/`get`/`put`, where
/// `put` always fails because the store is externally populated. The error
/// kind is distinct from `NotFound` so callers can tell an attempted write
/// from a missing row.
#[derive(Clone)]
pub struct ChainDb {
    inner: IpldStore,
}

impl ChainDb {
    pub fn new(inner: IpldStore) -> Self {
        Self { inner }
    }

    pub fn has(&self, mh_key: &str) -> Result<bool> {
        self.inner.has(mh_key)
    }

    pub fn get(&self, mh_key: &str) -> Result<Bytes> {
        self.inner.get(mh_key)
    }

    pub fn code(&self, code_hash: &B256) -> Result<Bytes> {
        self.inner.code(code_hash)
    }

    pub fn put(&self, _mh_key: &str, _data: &[u8]) -> Result<()> {
        Err(Error::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_error_is_distinct_from_not_found() {
        let err = Error::ReadOnly;
        assert!(!err.is_not_found());
        assert!(matches!(err, Error::ReadOnly));
    }
}
