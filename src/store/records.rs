//! Record lifecycle: insert, fetch, modify, rename, delete.

use std::collections::HashMap;

use crate::dn::{Dn, DnError, ROOT_ID};
use crate::idl::{Id, NOID};
use crate::kv::{Environment, ReadTxn, WriteTxn};
use crate::record::{AttrFlags, Attribute, CodecError, Encoded, Record};

use super::{CoreError, CoreResult, Store};

/// Kind of change applied to one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    /// Adds values; none may already be present.
    Add,
    /// Removes the listed values, or the whole attribute when none are listed.
    Delete,
    /// Replaces every value; an empty list removes the attribute.
    Replace,
}

/// One change to one attribute of a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub op: ModOp,
    pub attr: String,
    pub values: Vec<Vec<u8>>,
}

impl Modification {
    pub fn new<V: AsRef<[u8]>>(op: ModOp, attr: &str, values: &[V]) -> Self {
        Self {
            op,
            attr: attr.to_string(),
            values: values.iter().map(|v| v.as_ref().to_vec()).collect(),
        }
    }

    pub fn add<V: AsRef<[u8]>>(attr: &str, values: &[V]) -> Self {
        Self::new(ModOp::Add, attr, values)
    }

    pub fn delete<V: AsRef<[u8]>>(attr: &str, values: &[V]) -> Self {
        Self::new(ModOp::Delete, attr, values)
    }

    pub fn replace<V: AsRef<[u8]>>(attr: &str, values: &[V]) -> Self {
        Self::new(ModOp::Replace, attr, values)
    }
}

fn check_duplicates(attr: &Attribute) -> CoreResult<()> {
    match attr.first_duplicate() {
        Some(_) => Err(CodecError::DuplicateValue {
            attr: attr.name().to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

// Marks the attributes the encoder routed to the side table.
fn mark_side_attrs(record: &mut Record, encoded: &Encoded) {
    for (pos, attr) in record.attrs.iter_mut().enumerate() {
        let big = encoded.side.iter().any(|&(_, p)| p == pos);
        attr.flags.set(AttrFlags::BIG_MULTI, big);
    }
}

impl<E: Environment> Store<E> {
    /// Interns every stored attribute and encodes `record`.
    ///
    /// The size limit is checked before anything is interned.
    pub fn encode_record<T: WriteTxn + ?Sized>(&self, txn: &mut T, record: &Record) -> CoreResult<Encoded> {
        let codec = self.codec();
        codec.measure(record)?;
        for attr in record.attrs.iter().filter(|a| !a.is_empty()) {
            self.ads.intern(txn, &attr.desc)?;
        }
        Ok(codec.encode(record)?)
    }

    /// Decodes a stored image of record `id` named `dn`.
    pub fn decode_record<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id, dn: Dn, bytes: &[u8]) -> CoreResult<Record> {
        self.codec().decode(txn, &self.side, id, dn, bytes).map_err(|e| {
            tracing::warn!(event = "RECORD_DECODE_FAULT", id, code = e.code(), error = %e);
            e.into()
        })
    }

    /// Loads record `id` with its name rebuilt from the tree.
    pub fn fetch_record<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> CoreResult<Record> {
        let bytes = self
            .primary
            .get(txn, id)?
            .ok_or_else(|| DnError::NotFound(format!("id {id}")))?;
        let dn = self.names.id_to_name(txn, id)?;
        self.decode_record(txn, id, dn, &bytes)
    }

    /// Stores `record` as a new leaf under `parent`.
    ///
    /// `record.id` must come from [`Store::next_id`] or be otherwise unused.
    /// The object-class flags and out-of-line markers of `record` are
    /// updated to what was stored.
    pub fn insert_record<T: WriteTxn + ?Sized>(&self, txn: &mut T, parent: Id, record: &mut Record) -> CoreResult<()> {
        if record.id == ROOT_ID || record.id >= NOID {
            return Err(CoreError::invalid(format!("identifier {} is reserved", record.id)));
        }
        if parent == ROOT_ID {
            if record.dn.nname() != self.suffix().nname() {
                return Err(CoreError::invalid(format!(
                    "{} is not the suffix {}",
                    record.dn.name(),
                    self.suffix().name()
                )));
            }
        } else {
            let parent_dn = self.names.id_to_name(&*txn, parent)?;
            if record.dn.parent().map(|p| p.nname() == parent_dn.nname()) != Some(true) {
                return Err(CoreError::invalid(format!(
                    "{} is not a child of {}",
                    record.dn.name(),
                    parent_dn.name()
                )));
            }
        }
        for attr in &record.attrs {
            check_duplicates(attr)?;
        }
        record.refresh_oc_flags();

        let encoded = self.encode_record(txn, record)?;
        self.names.add(txn, parent, record.id, &record.dn, 1)?;
        self.primary.put(txn, record.id, &encoded.bytes)?;
        for &(adx, pos) in &encoded.side {
            self.side.put_values(txn, record.id, adx, &record.attrs[pos])?;
        }
        self.indexes.apply_write(txn, record)?;
        mark_side_attrs(record, &encoded);
        self.next_id.observe(record.id);

        tracing::debug!(
            event = "RECORD_INSERT",
            id = record.id,
            dn = record.dn.nname(),
            parent,
            size = encoded.bytes.len(),
            side = encoded.side.len()
        );
        Ok(())
    }

    /// Removes leaf record `id` with its side values and index entries.
    pub fn delete_record<T: WriteTxn + ?Sized>(&self, txn: &mut T, id: Id) -> CoreResult<()> {
        if self.names.has_children(&*txn, id)? {
            return Err(CoreError::invalid(format!("record {id} has subordinates")));
        }
        let record = self.fetch_record(&*txn, id)?;
        self.indexes.apply_delete(txn, &record)?;
        let side = self.side.delete_all(txn, id)?;
        self.primary.delete(txn, id)?;
        self.names.delete(txn, id, 1)?;
        tracing::debug!(event = "RECORD_DELETE", id, dn = record.dn.nname(), side);
        Ok(())
    }

    /// Applies `mods` in order to record `id` and stores the result.
    ///
    /// Either every modification applies or none does. Returns the stored
    /// record.
    pub fn modify_record<T: WriteTxn + ?Sized>(
        &self,
        txn: &mut T,
        id: Id,
        mods: &[Modification],
    ) -> CoreResult<Record> {
        let mut record = self.fetch_record(&*txn, id)?;
        // First state of every touched attribute, keyed by lowercased name.
        let mut before: HashMap<String, Option<Attribute>> = HashMap::new();

        for m in mods {
            let desc = self
                .schema
                .attribute(&m.attr)
                .ok_or_else(|| CoreError::invalid(format!("unknown attribute {}", m.attr)))?;
            let current = record.attr(desc.name()).cloned();
            before
                .entry(desc.name().to_ascii_lowercase())
                .or_insert_with(|| current.clone());

            let next = match m.op {
                ModOp::Add => {
                    let mut vals = current.as_ref().map(|a| a.vals.clone()).unwrap_or_default();
                    for v in &m.values {
                        if current.as_ref().is_some_and(|a| a.position_of(v).is_some()) {
                            return Err(CoreError::invalid(format!("{}: value already present", desc.name())));
                        }
                        vals.push(v.clone());
                    }
                    let attr = match &current {
                        Some(a) => a.with_values(vals),
                        None => Attribute::new(desc.clone(), vals),
                    };
                    check_duplicates(&attr)?;
                    Some(attr)
                }
                ModOp::Delete => {
                    let Some(current) = current else {
                        return Err(CoreError::invalid(format!("{}: no such attribute", desc.name())));
                    };
                    if m.values.is_empty() {
                        None
                    } else {
                        let mut keep = vec![true; current.len()];
                        for v in &m.values {
                            match current.position_of(v) {
                                Some(pos) if keep[pos] => keep[pos] = false,
                                _ => {
                                    return Err(CoreError::invalid(format!("{}: no such value", desc.name())));
                                }
                            }
                        }
                        let vals: Vec<Vec<u8>> = current
                            .vals
                            .iter()
                            .zip(&keep)
                            .filter(|(_, k)| **k)
                            .map(|(v, _)| v.clone())
                            .collect();
                        (!vals.is_empty()).then(|| current.with_values(vals))
                    }
                }
                ModOp::Replace => {
                    if m.values.is_empty() {
                        None
                    } else {
                        let attr = match &current {
                            Some(a) => a.with_values(m.values.clone()),
                            None => Attribute::new(desc.clone(), m.values.clone()),
                        };
                        check_duplicates(&attr)?;
                        Some(attr)
                    }
                }
            };
            match next {
                Some(attr) => record.put_attribute(attr),
                None => {
                    record.remove_attribute(desc.name());
                }
            }
        }
        record.refresh_oc_flags();

        let encoded = self.encode_record(txn, &record)?;
        self.primary.update(txn, id, &encoded.bytes)?;

        for (name, old) in &before {
            let was_big = old.as_ref().is_some_and(|a| a.flags.contains(AttrFlags::BIG_MULTI));
            if was_big {
                if let Some(adx) = self.ads.index_of(name) {
                    self.side.delete_attr(txn, id, adx)?;
                }
            }
        }
        for &(adx, pos) in &encoded.side {
            let attr = &record.attrs[pos];
            if before.contains_key(&attr.name().to_ascii_lowercase()) {
                self.side.put_values(txn, id, adx, attr)?;
            }
        }
        for (name, old) in &before {
            self.indexes.reindex_attribute(txn, id, old.as_ref(), record.attr(name))?;
        }
        mark_side_attrs(&mut record, &encoded);

        tracing::debug!(
            event = "RECORD_MODIFY",
            id,
            mods = mods.len(),
            attrs = before.len(),
            size = encoded.bytes.len()
        );
        Ok(record)
    }

    /// Renames record `id` to `new_rdn`, optionally under `new_parent`.
    ///
    /// Descendants move with it. Returns the new name. The record's naming
    /// attribute values are left to the caller.
    pub fn rename_record<T: WriteTxn + ?Sized>(
        &self,
        txn: &mut T,
        id: Id,
        new_rdn: &str,
        new_parent: Option<Id>,
    ) -> CoreResult<Dn> {
        let old_parent = self.names.parent(&*txn, id)?;
        if old_parent == ROOT_ID {
            return Err(CoreError::invalid("the suffix cannot be renamed"));
        }
        let target = new_parent.unwrap_or(old_parent);
        if target == ROOT_ID {
            return Err(CoreError::invalid("cannot move a record above the suffix"));
        }
        let mut cur = target;
        while cur != ROOT_ID {
            if cur == id {
                return Err(CoreError::invalid(format!("record {id} cannot move below itself")));
            }
            cur = self.names.parent(&*txn, cur)?;
        }

        let parent_dn = self.names.id_to_name(&*txn, target)?;
        let new_dn = parent_dn.child(new_rdn)?;
        let nsubs = self.names.subtree_size(&*txn, id)?;
        self.names.delete(txn, id, nsubs)?;
        self.names.add(txn, target, id, &new_dn, nsubs)?;

        tracing::debug!(event = "RECORD_RENAME", id, dn = new_dn.nname(), parent = target, nsubs);
        Ok(new_dn)
    }
}
