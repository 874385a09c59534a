//! Read-only EVM execution over index-backed historical state: the host
//! hooks behind `eth_call`, `eth_estimateGas` and the `debug` tracers.
//!
//! State flows in through a [`vdb_state::StateReader`] view pinned to the
//! requested block, so destroyed contracts and forked headers behave the
//! same way here as they do for plain balance and storage reads.

pub mod backend;
pub mod call;
pub mod config;
pub mod db;
pub mod tracer;

pub use backend::{Backend, BlockData, LogEntry, ReceiptData, TxData, TxLocation};
pub use call::{
    do_call, estimate_gas, CallArgs, CallOutcome, CancelToken, StateOverrideObject,
    StateOverrideSet,
};
pub use config::{ChainConfig, EvmConfig};
pub use db::StateReaderDb;
pub use tracer::{trace_block, trace_call, trace_transaction, StructLog, TraceResult, TxTraceResult};
