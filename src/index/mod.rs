//! Attribute indexes
//!
//! Each indexed attribute has one duplicate-sorted key space mapping index
//! keys to identifier lists. Index keys come from the attribute's matching
//! rules; the kind of index is encoded as a one-byte key prefix.
//!
//! # Invariants
//!
//! - Index updates happen in the same write transaction as the record write
//! - A record is filed under exactly the keys its current values generate
//! - Lookups on unindexed attributes are the caller's fallback, never an error

mod config;
mod keys;
mod manager;

pub use config::{IndexMask, IndexSpec};
pub use keys::{storage_key, PRESENCE_KEY};
pub use manager::{index_space_name, AttrIndex, IndexManager};
