//! Identifier list algebra
//!
//! Candidate sets, scope results and index keys all carry sorted sets of
//! record identifiers. `list` is the pure in-memory algebra; `store` keeps
//! the same sets under index keys in a duplicate-sorted key space.

mod list;
pub mod store;

pub use list::{Id, Idl, IdlIter, InsertOutcome, IDL_DB_SIZE, IDL_LOGN, IDL_UM_SIZE, NOID};
pub use store::{id_to_key, key_to_id};
