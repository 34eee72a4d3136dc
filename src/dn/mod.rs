//! Name index
//!
//! Hierarchical name-to-identifier mapping over a duplicate-sorted key
//! space: per-record child and self nodes, subtree size bookkeeping,
//! lookups with closest-ancestor fallback, and scoped traversal.
//!
//! # Invariants
//!
//! - Every live record except the pseudo-root has exactly one child entry
//!   under its parent and one self entry under its own key
//! - A record's stored subtree size is one plus the sum of its children's
//! - All three steps of an insert or delete happen in one write transaction

mod errors;
mod name;
pub mod node;
mod scope;
mod tree;

pub use errors::{DnError, DnResult};
pub use name::Dn;
pub use scope::{Scope, ScopeWalk};
pub use tree::{DnMatch, NameIndex, NAME_INDEX_SPACE, ROOT_ID};
