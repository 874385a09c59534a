//! End-to-end call execution over an in-memory state source: a storage-backed
//! token-supply read, a revert, and cooperative cancellation.

use std::sync::Arc;

use alloy_consensus::{constants::KECCAK_EMPTY, Account, Header};
use alloy_primitives::{Address, Bytes, B256, U256};
use vdb_evm::{do_call, CallArgs, CancelToken, EvmConfig};
use vdb_state::{
    mock_source::MockStateSource, BlockRef, CacheConfig, Error, GroupCache, GroupCacheConfig,
    StateReader,
};

const SUPPLY_SLOT: u64 = 2;

/// PUSH1 0x02, SLOAD, PUSH1 0x00, MSTORE, PUSH1 0x20, PUSH1 0x00, RETURN:
/// returns the 32-byte word stored at slot 2.
const SUPPLY_READER_CODE: &[u8] = &[
    0x60, 0x02, 0x54, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3,
];

/// PUSH1 0x00, PUSH1 0x00, REVERT.
const ALWAYS_REVERT_CODE: &[u8] = &[0x60, 0x00, 0x60, 0x00, 0xfd];

/// JUMPDEST, PUSH1 0x00, JUMP: spins until cancelled.
const SPIN_CODE: &[u8] = &[0x5b, 0x60, 0x00, 0x56];

fn cache(name: &str) -> Arc<GroupCache> {
    GroupCache::group(&GroupCacheConfig {
        state_db: CacheConfig {
            name: name.to_string(),
            ..CacheConfig::default()
        },
        storage: CacheConfig::default(),
    })
}

fn deploy(source: &mut MockStateSource, contract: Address, code: &[u8], head: B256) {
    let code_hash = source.insert_code(code);
    source.insert_account(
        contract,
        1,
        head,
        Account {
            nonce: 1,
            balance: U256::ZERO,
            storage_root: KECCAK_EMPTY,
            code_hash,
        },
    );
}

fn header() -> Header {
    Header {
        number: 1,
        gas_limit: 30_000_000,
        ..Default::default()
    }
}

#[test]
fn call_returns_stored_total_supply() {
    let contract = Address::repeat_byte(0xc0);
    let supply = U256::from(1_000_000_000_000_000_000_000u128);

    let mut source = MockStateSource::default();
    let head = source.push_canonical_block(1, B256::repeat_byte(0x01));
    deploy(&mut source, contract, SUPPLY_READER_CODE, head.hash);
    source.insert_storage(
        contract,
        B256::from(U256::from(SUPPLY_SLOT)),
        1,
        head.hash,
        supply,
    );

    let reader =
        StateReader::new(&source, cache("call-supply"), BlockRef::Latest).unwrap();
    let args = CallArgs {
        to: Some(contract),
        // totalSupply() selector; this fixture ignores calldata
        input: Some(Bytes::from_static(&[0x18, 0x16, 0x0d, 0xdd])),
        ..Default::default()
    };

    let outcome = do_call(
        reader,
        &header(),
        &EvmConfig::default(),
        &args,
        None,
        1_000_000,
        CancelToken::new(),
    )
    .unwrap();

    assert!(!outcome.failed);
    assert_eq!(outcome.return_data.len(), 32);
    assert_eq!(
        B256::from_slice(&outcome.return_data),
        B256::from(supply)
    );
}

#[test]
fn storage_read_after_destruction_returns_empty_word() {
    let contract = Address::repeat_byte(0xc1);
    let supply = U256::from(42u64);

    let mut source = MockStateSource::default();
    let b1 = source.push_canonical_block(1, B256::repeat_byte(0x11));
    let b2 = source.push_canonical_block(2, B256::repeat_byte(0x12));
    deploy(&mut source, contract, SUPPLY_READER_CODE, b1.hash);
    let slot = B256::from(U256::from(SUPPLY_SLOT));
    source.insert_storage(contract, slot, 1, b1.hash, supply);
    source.remove_storage_path(contract, slot, 2, b2.hash);
    deploy(&mut source, contract, SUPPLY_READER_CODE, b2.hash);

    let at_1 = StateReader::new(&source, cache("destroy-1"), BlockRef::Number(1)).unwrap();
    let at_2 = StateReader::new(&source, cache("destroy-2"), BlockRef::Number(2)).unwrap();

    let args = CallArgs {
        to: Some(contract),
        ..Default::default()
    };
    let config = EvmConfig::default();

    let before = do_call(
        at_1,
        &header(),
        &config,
        &args,
        None,
        1_000_000,
        CancelToken::new(),
    )
    .unwrap();
    assert_eq!(B256::from_slice(&before.return_data), B256::from(supply));

    let after = do_call(
        at_2,
        &header(),
        &config,
        &args,
        None,
        1_000_000,
        CancelToken::new(),
    )
    .unwrap();
    assert_eq!(B256::from_slice(&after.return_data), B256::ZERO);
}

#[test]
fn reverted_execution_is_a_result_not_an_error() {
    let contract = Address::repeat_byte(0xc2);
    let mut source = MockStateSource::default();
    let head = source.push_canonical_block(1, B256::repeat_byte(0x21));
    deploy(&mut source, contract, ALWAYS_REVERT_CODE, head.hash);

    let reader = StateReader::new(&source, cache("call-revert"), BlockRef::Latest).unwrap();
    let outcome = do_call(
        reader,
        &header(),
        &EvmConfig::default(),
        &CallArgs {
            to: Some(contract),
            ..Default::default()
        },
        None,
        1_000_000,
        CancelToken::new(),
    )
    .unwrap();

    assert!(outcome.failed);
    assert!(outcome.error.as_deref().unwrap_or_default().contains("reverted"));
}

#[test]
fn cancelled_call_surfaces_timeout() {
    let contract = Address::repeat_byte(0xc3);
    let mut source = MockStateSource::default();
    let head = source.push_canonical_block(1, B256::repeat_byte(0x31));
    deploy(&mut source, contract, SPIN_CODE, head.hash);

    let reader = StateReader::new(&source, cache("call-cancel"), BlockRef::Latest).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = do_call(
        reader,
        &header(),
        &EvmConfig::default(),
        &CallArgs {
            to: Some(contract),
            ..Default::default()
        },
        None,
        1_000_000,
        cancel,
    );

    assert!(matches!(result, Err(Error::Timeout)));
}
