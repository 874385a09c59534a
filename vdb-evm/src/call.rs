use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use alloy_consensus::Header;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::decode_revert_reason;
use revm::{
    inspector_handle_register,
    primitives::{
        BlockEnv, CfgEnvWithHandlerCfg, EnvWithHandlerCfg, ExecutionResult, TransactTo, TxEnv,
    },
    Database, Evm, Inspector,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vdb_state::{Error, Result, StateReader, StateSource};

use crate::{config::EvmConfig, db::StateReaderDb};

/// An `eth_call` / `eth_estimateGas` request body.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArgs {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub value: Option<U256>,
    pub input: Option<Bytes>,
    /// Same as `input`, kept for compatibility with older clients.
    pub data: Option<Bytes>,
    pub nonce: Option<U256>,
}

impl CallArgs {
    pub fn input_data(&self) -> Bytes {
        self.input
            .clone()
            .or_else(|| self.data.clone())
            .unwrap_or_default()
    }
}

/// Per-address overrides applied before execution. At most one of `state`
/// and `state_diff` may be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOverrideObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<HashMap<B256, B256>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_diff: Option<HashMap<B256, B256>>,
}

pub type StateOverrideSet = HashMap<Address, StateOverrideObject>;

/// The result of a completed call. A revert is a completed call with
/// `failed` set, never an error.
#[derive(Debug, Clone, Default)]
pub struct CallOutcome {
    pub return_data: Bytes,
    pub used_gas: u64,
    pub failed: bool,
    pub error: Option<String>,
}

/// Cooperative cancellation flag polled by the EVM interpreter loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub(crate) fn build_env(
    config: &EvmConfig,
    header: &Header,
    args: &CallArgs,
    gas_cap: u64,
) -> Result<EnvWithHandlerCfg> {
    let spec_id = config.chain.spec_id(header.number);
    let mut cfg = CfgEnvWithHandlerCfg::new_with_spec_id(Default::default(), spec_id);
    cfg.chain_id = config.chain.chain_id;
    // eth_call semantics: no base fee charge, no balance requirement, no
    // nonce check (nonce: None below).
    cfg.disable_base_fee = true;
    cfg.disable_balance_check = true;
    cfg.disable_block_gas_limit = true;

    let block = BlockEnv {
        number: U256::from(header.number),
        coinbase: header.beneficiary,
        timestamp: U256::from(header.timestamp),
        gas_limit: U256::from(header.gas_limit),
        basefee: U256::from(header.base_fee_per_gas.unwrap_or_default()),
        difficulty: header.difficulty,
        prevrandao: Some(header.mix_hash),
        ..Default::default()
    };

    let gas_limit = match args.gas {
        Some(gas) => {
            let gas: u64 = gas
                .try_into()
                .map_err(|_| Error::BadRequest("gas does not fit in u64".to_string()))?;
            gas.min(gas_cap)
        }
        None => gas_cap,
    };

    // Caller-supplied `from` travels unchanged; the configured default
    // sender fills the gap only when the request carries none.
    let caller = args.from.or(config.default_sender).unwrap_or_default();

    let mut tx = TxEnv::default();
    tx.caller = caller;
    tx.gas_limit = gas_limit;
    tx.gas_price = args
        .gas_price
        .or(args.max_fee_per_gas)
        .unwrap_or_else(|| U256::from(header.base_fee_per_gas.unwrap_or_default()));
    tx.gas_priority_fee = args.max_priority_fee_per_gas;
    tx.transact_to = match args.to {
        Some(to) => TransactTo::Call(to),
        None => TransactTo::Create,
    };
    tx.value = args.value.unwrap_or_default();
    tx.data = args.input_data();
    tx.nonce = None;
    tx.chain_id = Some(config.chain.chain_id);

    Ok(EnvWithHandlerCfg::new_with_cfg_env(cfg, block, tx))
}

pub(crate) fn apply_overrides<S: StateSource>(
    db: &mut revm::db::CacheDB<StateReaderDb<S>>,
    overrides: &StateOverrideSet,
) -> Result<()> {
    for (address, entry) in overrides {
        if entry.state.is_some() && entry.state_diff.is_some() {
            return Err(Error::BadRequest(format!(
                "both state and stateDiff override set for {address}"
            )));
        }
        let mut info = db
            .basic(*address)
            .map_err(|e| Error::internal(e.to_string()))?
            .unwrap_or_default();
        if let Some(balance) = entry.balance {
            info.balance = balance;
        }
        if let Some(nonce) = entry.nonce {
            info.nonce = nonce;
        }
        if let Some(code) = &entry.code {
            let bytecode = revm::primitives::Bytecode::new_raw(code.clone());
            info.code_hash = bytecode.hash_slow();
            info.code = Some(bytecode);
        }
        db.insert_account_info(*address, info);

        let slots: Box<dyn Iterator<Item = (&B256, &B256)>> = match (&entry.state, &entry.state_diff)
        {
            (Some(state), None) => {
                // full replacement: reads outside the map see zero
                db.replace_account_storage(*address, HashMap::default())
                    .map_err(|e| Error::internal(e.to_string()))?;
                Box::new(state.iter())
            }
            (None, Some(diff)) => Box::new(diff.iter()),
            _ => Box::new(std::iter::empty()),
        };
        for (slot, value) in slots {
            db.insert_account_storage(
                *address,
                U256::from_be_bytes(slot.0),
                U256::from_be_bytes(value.0),
            )
            .map_err(|e| Error::internal(e.to_string()))?;
        }
    }
    Ok(())
}

pub(crate) fn outcome_from_result(
    result: ExecutionResult,
    cancel: &CancelToken,
) -> Result<CallOutcome> {
    if cancel.is_cancelled() {
        return Err(Error::Timeout);
    }
    Ok(match result {
        ExecutionResult::Success {
            gas_used, output, ..
        } => CallOutcome {
            return_data: output.into_data(),
            used_gas: gas_used,
            failed: false,
            error: None,
        },
        ExecutionResult::Revert { gas_used, output } => {
            let reason = decode_revert_reason(&output);
            CallOutcome {
                return_data: output,
                used_gas: gas_used,
                failed: true,
                error: Some(match reason {
                    Some(reason) => format!("execution reverted: {reason}"),
                    None => "execution reverted".to_string(),
                }),
            }
        }
        ExecutionResult::Halt { reason, gas_used } => CallOutcome {
            return_data: Bytes::new(),
            used_gas: gas_used,
            failed: true,
            error: Some(format!("execution halted: {reason:?}")),
        },
    })
}

/// Runs a gas-budgeted, no-base-fee, no-balance-check, no-nonce-check call
/// against the reader's pinned state. The cancellation token is polled at
/// every interpreter step; expiry surfaces as [`Error::Timeout`].
pub fn do_call<S: StateSource>(
    reader: StateReader<S>,
    header: &Header,
    config: &EvmConfig,
    args: &CallArgs,
    overrides: Option<&StateOverrideSet>,
    gas_cap: u64,
    cancel: CancelToken,
) -> Result<CallOutcome> {
    let env = build_env(config, header, args, gas_cap)?;
    let mut db = StateReaderDb::new(reader).into_cache_db();
    if let Some(overrides) = overrides {
        apply_overrides(&mut db, overrides)?;
    }

    let mut guard = CancelInspector::new(cancel.clone());
    let mut evm = Evm::builder()
        .with_db(db)
        .with_external_context(&mut guard)
        .with_env_with_handler_cfg(env)
        .append_handler_register(inspector_handle_register)
        .build();

    let result = evm.transact().map_err(evm_error)?;
    debug!(gas_used = result.result.gas_used(), "eth_call complete");
    outcome_from_result(result.result, &cancel)
}

/// Gas estimation: execute at the ceiling, then binary-search the smallest
/// budget the call still succeeds with.
pub fn estimate_gas<S: StateSource + Clone>(
    reader: StateReader<S>,
    header: &Header,
    config: &EvmConfig,
    args: &CallArgs,
    gas_cap: u64,
    cancel: CancelToken,
) -> Result<u64> {
    let ceiling = match args.gas {
        Some(gas) => u64::try_from(gas)
            .map_err(|_| Error::BadRequest("gas does not fit in u64".to_string()))?
            .min(gas_cap),
        None => gas_cap,
    };

    let run = |budget: u64| -> Result<CallOutcome> {
        let mut bounded = args.clone();
        bounded.gas = Some(U256::from(budget));
        do_call(
            reader.clone(),
            header,
            config,
            &bounded,
            None,
            gas_cap,
            cancel.clone(),
        )
    };

    let full = run(ceiling)?;
    if full.failed {
        return Err(Error::BadRequest(
            full.error
                .unwrap_or_else(|| "gas required exceeds allowance".to_string()),
        ));
    }

    let mut lo = full.used_gas.saturating_sub(1);
    let mut hi = ceiling;
    while lo + 1 < hi {
        let mid = lo + (hi - lo) / 2;
        match run(mid) {
            Ok(outcome) if !outcome.failed => hi = mid,
            Ok(_) => lo = mid,
            Err(Error::Timeout) => return Err(Error::Timeout),
            Err(_) => lo = mid,
        }
    }
    Ok(hi)
}

pub(crate) fn evm_error(e: revm::primitives::EVMError<Error>) -> Error {
    match e {
        revm::primitives::EVMError::Database(inner) => inner,
        other => Error::internal(other.to_string()),
    }
}

/// A step inspector that aborts the interpreter once the token trips.
pub struct CancelInspector {
    cancel: CancelToken,
}

impl CancelInspector {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    pub fn check(&self, interp: &mut revm::interpreter::Interpreter) {
        if self.cancel.is_cancelled() {
            interp.instruction_result = revm::interpreter::InstructionResult::OutOfGas;
        }
    }
}

impl<DB: Database> Inspector<DB> for CancelInspector {
    fn step(
        &mut self,
        interp: &mut revm::interpreter::Interpreter,
        _context: &mut revm::EvmContext<DB>,
    ) {
        self.check(interp);
    }
}
