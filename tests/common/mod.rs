//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use dirstore::schema::Schema;
use dirstore::{CoreResult, Dn, EngineConfig, Id, MemEnv, Record, StaticSchema, Store, ROOT_ID};

pub const SUFFIX: &str = "dc=example,dc=com";

/// Store over a fresh in-memory environment with the usual indexes.
pub fn open_store() -> Store<MemEnv> {
    open_with(base_config())
}

pub fn base_config() -> EngineConfig {
    EngineConfig::new(SUFFIX)
        .with_index("objectClass", &["eq"])
        .with_index("cn", &["pres", "eq", "sub", "approx"])
        .with_index("sn", &["eq"])
        .with_index("uidNumber", &["eq", "ord"])
        .with_index("member", &["eq"])
}

pub fn open_with(config: EngineConfig) -> Store<MemEnv> {
    Store::open(MemEnv::new(), config, Arc::new(StaticSchema::standard())).unwrap()
}

pub fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

/// Record named `name` carrying `attrs`, with objectClass `top`.
pub fn record(store: &Store<MemEnv>, id: Id, name: &str, attrs: &[(&str, &[&str])]) -> Record {
    let schema = store.schema();
    let mut rec = Record::new(id, dn(name)).with_attr(schema.attribute("objectClass").unwrap(), &["top"]);
    for (attr, values) in attrs {
        rec = rec.with_attr(schema.attribute(attr).unwrap(), &values[..]);
    }
    rec
}

/// Inserts `name` under `parent` in its own write transaction.
pub fn insert(store: &Store<MemEnv>, parent: Id, name: &str, attrs: &[(&str, &[&str])]) -> CoreResult<Id> {
    store.write(|txn| {
        let id = store.next_id(&*txn)?;
        let mut rec = record(store, id, name, attrs);
        store.insert_record(txn, parent, &mut rec)?;
        Ok(id)
    })
}

/// Inserts the suffix record and returns its identifier.
pub fn insert_suffix(store: &Store<MemEnv>) -> Id {
    insert(store, ROOT_ID, SUFFIX, &[]).unwrap()
}
