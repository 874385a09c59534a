use alloy_primitives::{Address, B256, U256};
use revm::{
    db::CacheDB,
    primitives::{AccountInfo, Bytecode},
    DatabaseRef,
};
use vdb_state::{BlockRef, Error, StateReader, StateSource};

/// revm database over a [`StateReader`] view. Reads are historical and
/// immutable; accounts destroyed before the pinned block simply resolve to
/// `None`, so self-destruct semantics need no handling here.
pub struct StateReaderDb<S> {
    reader: StateReader<S>,
}

impl<S: StateSource> StateReaderDb<S> {
    pub fn new(reader: StateReader<S>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &StateReader<S> {
        &self.reader
    }

    /// Wraps the view in a commit-capable cache layer, the shape the EVM and
    /// the replaying tracer run against.
    pub fn into_cache_db(self) -> CacheDB<Self> {
        CacheDB::new(self)
    }
}

impl<S: StateSource> DatabaseRef for StateReaderDb<S> {
    type Error = Error;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let Some(account) = self.reader.account(address)? else {
            return Ok(None);
        };
        Ok(Some(AccountInfo {
            balance: account.balance,
            nonce: account.nonce,
            code_hash: account.code_hash,
            code: None,
        }))
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        let code = self.reader.code_by_hash(code_hash)?;
        Ok(Bytecode::new_raw(code.to_vec().into()))
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let word = self.reader.storage_at(address, B256::from(index))?;
        Ok(U256::from_be_bytes(word.0))
    }

    fn block_hash_ref(&self, number: u64) -> Result<B256, Self::Error> {
        match self.reader.source_block_hash(number) {
            Ok(hash) => Ok(hash),
            // The BLOCKHASH window can reach past the indexed range.
            Err(Error::NotFound) => Ok(B256::ZERO),
            Err(e) => Err(e),
        }
    }
}

/// The canonical hash lookup the BLOCKHASH opcode needs, kept on the reader
/// so the database adapter stays source-agnostic.
pub trait SourceBlockHash {
    fn source_block_hash(&self, number: u64) -> Result<B256, Error>;
}

impl<S: StateSource> SourceBlockHash for StateReader<S> {
    fn source_block_hash(&self, number: u64) -> Result<B256, Error> {
        Ok(self.resolve(BlockRef::Number(number))?.hash)
    }
}
