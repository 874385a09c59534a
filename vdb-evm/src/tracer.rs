//! Geth-style struct-log tracing for the `debug` namespace, built as a revm
//! step inspector over the same read-only state views `eth_call` uses.

use alloy_primitives::{hex, B256, U256};
use revm::{
    inspector_handle_register,
    interpreter::{opcode::OpCode, InstructionResult, Interpreter},
    Database, DatabaseCommit, Evm, EvmContext, Inspector,
};
use serde::Serialize;
use tracing::debug;
use vdb_state::{Error, Result, StateReader, StateSource};

use crate::{
    backend::{Backend, BlockData},
    call::{build_env, evm_error, outcome_from_result, CallArgs, CancelToken},
    config::EvmConfig,
    db::StateReaderDb,
};

/// One interpreter step of an execution trace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructLog {
    pub pc: u64,
    pub op: String,
    pub gas: u64,
    pub gas_cost: u64,
    pub depth: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<U256>,
}

/// The default `debug_traceTransaction` / `debug_traceCall` response body.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    pub gas: u64,
    pub failed: bool,
    pub return_value: String,
    pub struct_logs: Vec<StructLog>,
}

/// A traced transaction within a block trace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxTraceResult {
    pub tx_hash: B256,
    pub result: TraceResult,
}

/// Step inspector recording struct logs, polling the cancellation token the
/// same way the plain call path does.
pub struct StructLogTracer {
    cancel: CancelToken,
    depth: u64,
    pending: Option<(usize, u64)>,
    logs: Vec<StructLog>,
}

impl StructLogTracer {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            depth: 0,
            pending: None,
            logs: Vec::new(),
        }
    }

    pub fn into_logs(self) -> Vec<StructLog> {
        self.logs
    }
}

impl<DB: Database> Inspector<DB> for StructLogTracer {
    fn step(&mut self, interp: &mut Interpreter, _context: &mut EvmContext<DB>) {
        if self.cancel.is_cancelled() {
            interp.instruction_result = InstructionResult::OutOfGas;
            return;
        }
        let opcode = interp.current_opcode();
        let name = OpCode::new(opcode)
            .map(|op| op.as_str().to_string())
            .unwrap_or_else(|| format!("opcode 0x{opcode:02x}"));
        self.logs.push(StructLog {
            pc: interp.program_counter() as u64,
            op: name,
            gas: interp.gas.remaining(),
            gas_cost: 0,
            depth: self.depth.max(1),
            stack: interp.stack.data().clone(),
        });
        self.pending = Some((self.logs.len() - 1, interp.gas.remaining()));
    }

    fn step_end(&mut self, interp: &mut Interpreter, _context: &mut EvmContext<DB>) {
        if let Some((slot, before)) = self.pending.take() {
            self.logs[slot].gas_cost = before.saturating_sub(interp.gas.remaining());
        }
    }

    fn call(
        &mut self,
        _context: &mut EvmContext<DB>,
        _inputs: &mut revm::interpreter::CallInputs,
    ) -> Option<revm::interpreter::CallOutcome> {
        self.depth += 1;
        None
    }

    fn call_end(
        &mut self,
        _context: &mut EvmContext<DB>,
        _inputs: &revm::interpreter::CallInputs,
        outcome: revm::interpreter::CallOutcome,
    ) -> revm::interpreter::CallOutcome {
        self.depth = self.depth.saturating_sub(1);
        outcome
    }

    fn create(
        &mut self,
        _context: &mut EvmContext<DB>,
        _inputs: &mut revm::interpreter::CreateInputs,
    ) -> Option<revm::interpreter::CreateOutcome> {
        self.depth += 1;
        None
    }

    fn create_end(
        &mut self,
        _context: &mut EvmContext<DB>,
        _inputs: &revm::interpreter::CreateInputs,
        outcome: revm::interpreter::CreateOutcome,
    ) -> revm::interpreter::CreateOutcome {
        self.depth = self.depth.saturating_sub(1);
        outcome
    }
}

/// Traces a call against the state the reader is pinned to.
pub fn trace_call<S: StateSource>(
    reader: StateReader<S>,
    header: &alloy_consensus::Header,
    config: &EvmConfig,
    args: &CallArgs,
    cancel: CancelToken,
) -> Result<TraceResult> {
    let env = build_env(config, header, args, config.gas_cap())?;
    let db = StateReaderDb::new(reader).into_cache_db();
    trace_env(db, env, cancel)
}

fn trace_env<DB>(
    db: DB,
    env: revm::primitives::EnvWithHandlerCfg,
    cancel: CancelToken,
) -> Result<TraceResult>
where
    DB: Database<Error = Error>,
{
    let mut tracer = StructLogTracer::new(cancel.clone());
    let outcome = {
        let mut evm = Evm::builder()
            .with_db(db)
            .with_external_context(&mut tracer)
            .with_env_with_handler_cfg(env)
            .append_handler_register(inspector_handle_register)
            .build();
        let result = evm.transact().map_err(evm_error)?;
        outcome_from_result(result.result, &cancel)?
    };

    Ok(TraceResult {
        gas: outcome.used_gas,
        failed: outcome.failed,
        return_value: hex::encode(&outcome.return_data),
        struct_logs: tracer.into_logs(),
    })
}

/// Replays a block's transactions up to (excluding) `target_index` on a
/// commit-capable cache over the parent state, then returns that database.
fn replay_until<S: StateSource>(
    backend: &Backend,
    reader: StateReader<S>,
    block: &BlockData,
    target_index: u64,
    cancel: &CancelToken,
) -> Result<revm::db::CacheDB<StateReaderDb<S>>> {
    let mut db = StateReaderDb::new(reader).into_cache_db();
    for tx in block.transactions.iter().take(target_index as usize) {
        let tx_env = backend.tx_env(tx)?;
        let env = backend.call_env_for_header(&block.header, tx_env);
        let mut evm = Evm::builder()
            .with_db(db)
            .with_env_with_handler_cfg(env)
            .build();
        let result = evm.transact().map_err(evm_error)?;
        (db, _) = evm.into_db_and_env_with_handler_cfg();
        if cancel.is_cancelled() {
            return Err(Error::Timeout);
        }
        db.commit(result.state);
    }
    Ok(db)
}

/// `debug_traceTransaction`: replay the owning block up to the target
/// transaction, then trace it.
pub fn trace_transaction(
    backend: &Backend,
    tx_hash: B256,
    cancel: CancelToken,
) -> Result<TraceResult> {
    let located = backend.transaction_location(tx_hash)?;
    let block = backend.block_by_hash(located.block_hash)?;
    debug!(%tx_hash, block = block.header.number, "tracing transaction");

    let reader = backend.state_at_parent_of(&block)?;
    let db = replay_until(backend, reader, &block, located.index, &cancel)?;

    let target = block
        .transactions
        .get(located.index as usize)
        .ok_or(Error::NotFound)?;
    let tx_env = backend.tx_env(target)?;
    let env = backend.call_env_for_header(&block.header, tx_env);
    trace_env(db, env, cancel)
}

/// `debug_traceBlockByHash`: trace every transaction in order, carrying the
/// committed state forward between them.
pub fn trace_block(
    backend: &Backend,
    block: &BlockData,
    cancel: CancelToken,
) -> Result<Vec<TxTraceResult>> {
    let reader = backend.state_at_parent_of(block)?;
    let mut db = StateReaderDb::new(reader).into_cache_db();
    let mut traces = Vec::with_capacity(block.transactions.len());

    for tx in &block.transactions {
        if cancel.is_cancelled() {
            return Err(Error::Timeout);
        }
        let tx_env = backend.tx_env(tx)?;
        let env = backend.call_env_for_header(&block.header, tx_env);
        let mut tracer = StructLogTracer::new(cancel.clone());
        let (outcome, state) = {
            let mut evm = Evm::builder()
                .with_db(db)
                .with_external_context(&mut tracer)
                .with_env_with_handler_cfg(env)
                .append_handler_register(inspector_handle_register)
                .build();
            let result = evm.transact().map_err(evm_error)?;
            let outcome = outcome_from_result(result.result, &cancel)?;
            (db, _) = evm.into_db_and_env_with_handler_cfg();
            (outcome, result.state)
        };
        db.commit(state);
        traces.push(TxTraceResult {
            tx_hash: tx.hash,
            result: TraceResult {
                gas: outcome.used_gas,
                failed: outcome.failed,
                return_value: hex::encode(&outcome.return_data),
                struct_logs: tracer.into_logs(),
            },
        });
    }
    Ok(traces)
}
