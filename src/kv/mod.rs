//! Transactional key-value contract for dirstore
//!
//! The data engine runs on top of an ordered, transactional key-value store
//! with optional sorted duplicate values per key. This module defines that
//! contract and ships an in-memory snapshot engine that satisfies it.
//!
//! # Design Principles
//!
//! - The engine owns durability; the data engine owns layout
//! - Transaction boundaries are the only consistency boundary
//! - Abort is drop: no rollback bookkeeping outside the engine
//! - Single writer, many snapshot readers

mod errors;
mod memory;
mod txn;

pub use errors::{KvError, KvResult};
pub use memory::{MemEnv, MemReadTxn, MemWriteTxn};
pub use txn::{
    BytewiseOrder, DupOrder, Environment, PutFlags, ReadTxn, SpaceId, SpaceOptions, WriteTxn,
};
