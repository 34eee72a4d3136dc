//! dirstore - Storage and search engine for a hierarchical directory
//!
//! Records are named by distinguished names, kept in a name tree with
//! subtree sizes, encoded into compact images and indexed per attribute.
//! Searches turn filters into candidate identifier lists.

pub mod config;
pub mod dn;
pub mod error;
pub mod filter;
pub mod idl;
pub mod index;
pub mod kv;
pub mod record;
pub mod schema;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use dn::{Dn, DnMatch, NameIndex, Scope, ROOT_ID};
pub use error::{CoreError, CoreResult, ErrorKind, Severity};
pub use filter::Filter;
pub use idl::{Id, Idl, NOID};
pub use kv::{Environment, MemEnv, ReadTxn, WriteTxn};
pub use record::{Attribute, Record};
pub use schema::{Schema, StaticSchema};
pub use store::{ModOp, Modification, Store};
