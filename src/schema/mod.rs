//! Attribute types, matching rules and attribute interning
//!
//! Schema definition belongs to the surrounding server. The data engine
//! only consumes it: it resolves attribute names to [`AttributeType`]s,
//! asks their [`MatchingRule`]s for comparisons and index keys, and
//! persists a compact index per attribute in the [`AdTable`].

mod adtable;
mod errors;
mod registry;
pub mod rules;
mod types;

pub use adtable::{AdTable, AD_TABLE_SPACE, MAX_ADS};
pub use errors::{SchemaError, SchemaResult};
pub use registry::{Schema, StaticSchema};
pub use rules::{Assertion, DnRelation, KeyKind, MatchingRule, SubstrParams, Substrings};
pub use types::{AttrDesc, AttributeType};
