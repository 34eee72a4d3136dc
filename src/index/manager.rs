//! Attribute index maintenance and lookup
//!
//! # API
//!
//! - `apply_write(txn, record)` - Index every value of a new record
//! - `apply_delete(txn, record)` - Remove a record from every index
//! - `reindex_attribute(txn, id, old, new)` - Apply one attribute's change
//! - `lookup_key(txn, index, key)` - IDL stored under one key
//! - `lookup_range(txn, index, lower, upper)` - Union over ordered keys

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::filter::ComponentIndex;
use crate::idl::{store as idl_store, Id, Idl};
use crate::kv::{Environment, KvResult, ReadTxn, SpaceId, SpaceOptions, WriteTxn};
use crate::record::{Attribute, Record};
use crate::schema::{AttrDesc, KeyKind, Schema, SchemaError, SchemaResult, SubstrParams};

use super::config::{IndexMask, IndexSpec};
use super::keys::{storage_key, PRESENCE_KEY, PREFIX_ORDERED};

/// Key space name for the indexes of `attr`.
pub fn index_space_name(attr: &str) -> String {
    format!("idx.{}", attr.to_ascii_lowercase())
}

/// The indexes kept for one attribute type.
#[derive(Debug, Clone)]
pub struct AttrIndex {
    desc: AttrDesc,
    mask: IndexMask,
    space: SpaceId,
}

impl AttrIndex {
    pub fn desc(&self) -> &AttrDesc {
        &self.desc
    }

    pub fn mask(&self) -> IndexMask {
        self.mask
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexOp {
    Add,
    Delete,
}

/// All configured attribute indexes of a store.
#[derive(Debug)]
pub struct IndexManager {
    indexes: HashMap<String, AttrIndex>,
    params: SubstrParams,
    db_max: usize,
    component: Option<Arc<dyn ComponentIndex>>,
}

impl IndexManager {
    /// Opens one key space per configured attribute.
    pub fn open<E: Environment>(
        env: &E,
        schema: &dyn Schema,
        specs: &[IndexSpec],
        params: SubstrParams,
        db_max: usize,
    ) -> SchemaResult<Self> {
        let mut indexes = HashMap::new();
        for spec in specs {
            let desc = schema
                .attribute(&spec.attr)
                .ok_or_else(|| SchemaError::UnknownAttribute(spec.attr.clone()))?;
            let mask = spec
                .mask()
                .map_err(|kind| SchemaError::Corrupt(format!("index kind {kind} on {}", spec.attr)))?;
            let space = env.open_space(&index_space_name(desc.name()), SpaceOptions::dup_sorted())?;
            let entry = indexes
                .entry(desc.name().to_ascii_lowercase())
                .or_insert_with(|| AttrIndex {
                    desc: desc.clone(),
                    mask: IndexMask::empty(),
                    space,
                });
            entry.mask |= mask;
        }
        tracing::debug!(event = "INDEX_OPEN", attrs = indexes.len());
        Ok(Self {
            indexes,
            params,
            db_max,
            component: None,
        })
    }

    /// Installs the key generator for component indexes.
    pub fn with_component_index(mut self, component: Arc<dyn ComponentIndex>) -> Self {
        self.component = Some(component);
        self
    }

    pub fn component_index(&self) -> Option<&dyn ComponentIndex> {
        self.component.as_deref()
    }

    pub fn get(&self, attr: &str) -> Option<&AttrIndex> {
        self.indexes.get(&attr.to_ascii_lowercase())
    }

    pub fn mask(&self, attr: &str) -> IndexMask {
        self.get(attr).map_or(IndexMask::empty(), |ai| ai.mask)
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn params(&self) -> &SubstrParams {
        &self.params
    }

    /// Index answering `kind` assertions on `attr`, and the kind to read it as.
    ///
    /// Approximate assertions fall back to the equality index when the
    /// attribute has no approximate rule or index.
    pub fn index_param(&self, attr: &str, kind: IndexMask) -> Option<(&AttrIndex, IndexMask)> {
        let ai = self.get(attr)?;
        if kind == IndexMask::APPROX {
            if ai.mask.contains(IndexMask::APPROX) && ai.desc.approx().is_some() {
                return Some((ai, IndexMask::APPROX));
            }
            return ai.mask.contains(IndexMask::EQUALITY).then_some((ai, IndexMask::EQUALITY));
        }
        ai.mask.contains(kind).then_some((ai, kind))
    }

    /// Every storage key a record holding `values` is filed under.
    pub fn value_keys(&self, ai: &AttrIndex, values: &[Vec<u8>]) -> BTreeSet<Vec<u8>> {
        let mut keys = BTreeSet::new();
        if values.is_empty() {
            return keys;
        }
        let desc = &ai.desc;
        for kind in ai.mask.iter() {
            if kind == IndexMask::PRESENT {
                keys.insert(PRESENCE_KEY.to_vec());
                continue;
            }
            let generated = if kind == IndexMask::COMPONENT {
                match &self.component {
                    Some(component) => component.index_keys(desc, values),
                    None => Vec::new(),
                }
            } else {
                let (rule, key_kind) = if kind == IndexMask::EQUALITY {
                    (desc.equality(), KeyKind::Equality)
                } else if kind == IndexMask::APPROX {
                    (desc.approx(), KeyKind::Approx)
                } else if kind == IndexMask::SUBSTR {
                    (desc.substr(), KeyKind::Substr)
                } else {
                    (desc.ordering(), KeyKind::Ordered)
                };
                rule.map(|r| r.index_keys(key_kind, values, &self.params))
                    .unwrap_or_default()
            };
            keys.extend(generated.iter().map(|k| storage_key(kind, k)));
        }
        keys
    }

    fn apply_keys<T, K>(&self, txn: &mut T, ai: &AttrIndex, keys: &[K], id: Id, op: IndexOp) -> KvResult<()>
    where
        T: WriteTxn + ?Sized,
        K: AsRef<[u8]>,
    {
        if keys.is_empty() {
            return Ok(());
        }
        match op {
            IndexOp::Add => idl_store::insert_keys(txn, ai.space, keys, id, self.db_max)?,
            IndexOp::Delete => idl_store::delete_keys(txn, ai.space, keys, id)?,
        }
        tracing::trace!(event = "INDEX_KEYS", attr = ai.desc.name(), id, keys = keys.len(), add = op == IndexOp::Add);
        Ok(())
    }

    fn index_record<T: WriteTxn + ?Sized>(&self, txn: &mut T, record: &Record, op: IndexOp) -> KvResult<()> {
        for attr in &record.attrs {
            if let Some(ai) = self.get(attr.name()) {
                let keys: Vec<Vec<u8>> = self.value_keys(ai, &attr.vals).into_iter().collect();
                self.apply_keys(txn, ai, &keys, record.id, op)?;
            }
        }
        Ok(())
    }

    /// Indexes a newly stored record.
    pub fn apply_write<T: WriteTxn + ?Sized>(&self, txn: &mut T, record: &Record) -> KvResult<()> {
        self.index_record(txn, record, IndexOp::Add)?;
        tracing::debug!(event = "INDEX_ADD", id = record.id);
        Ok(())
    }

    /// Removes a record from every index.
    pub fn apply_delete<T: WriteTxn + ?Sized>(&self, txn: &mut T, record: &Record) -> KvResult<()> {
        self.index_record(txn, record, IndexOp::Delete)?;
        tracing::debug!(event = "INDEX_DELETE", id = record.id);
        Ok(())
    }

    /// Moves record `id` from the keys of `old` to the keys of `new`.
    ///
    /// Keys both value sets produce are left alone.
    pub fn reindex_attribute<T: WriteTxn + ?Sized>(
        &self,
        txn: &mut T,
        id: Id,
        old: Option<&Attribute>,
        new: Option<&Attribute>,
    ) -> KvResult<()> {
        let Some(name) = old.or(new).map(|a| a.name()) else {
            return Ok(());
        };
        let Some(ai) = self.get(name) else {
            return Ok(());
        };
        let before = old.map(|a| self.value_keys(ai, &a.vals)).unwrap_or_default();
        let after = new.map(|a| self.value_keys(ai, &a.vals)).unwrap_or_default();
        let gone: Vec<&Vec<u8>> = before.difference(&after).collect();
        let added: Vec<&Vec<u8>> = after.difference(&before).collect();
        self.apply_keys(txn, ai, &gone, id, IndexOp::Delete)?;
        self.apply_keys(txn, ai, &added, id, IndexOp::Add)?;
        Ok(())
    }

    /// IDL stored under one storage key.
    pub fn lookup_key<T: ReadTxn + ?Sized>(&self, txn: &T, ai: &AttrIndex, key: &[u8]) -> KvResult<Idl> {
        idl_store::read_key(txn, ai.space, key)
    }

    /// Union of the IDLs under ordered keys between `lower` and `upper`,
    /// both inclusive and both optional.
    pub fn lookup_range<T: ReadTxn + ?Sized>(
        &self,
        txn: &T,
        ai: &AttrIndex,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> KvResult<Idl> {
        let start = storage_key(IndexMask::ORDERED, lower.unwrap_or_default());
        let end = upper.map(|u| storage_key(IndexMask::ORDERED, u));
        let mut result = Idl::empty();
        let mut cursor = txn.seek_key(ai.space, &start)?;
        let mut scanned = 0usize;
        while let Some(key) = cursor {
            if key.first() != Some(&PREFIX_ORDERED) {
                break;
            }
            if end.as_ref().is_some_and(|end| key > *end) {
                break;
            }
            result.union_with(&idl_store::read_key(txn, ai.space, &key)?);
            scanned += 1;
            cursor = txn.next_key(ai.space, &key)?;
        }
        tracing::trace!(event = "INDEX_RANGE", attr = ai.desc.name(), scanned, found = result.len());
        Ok(result)
    }
}
