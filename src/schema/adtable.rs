//! Attribute-description interning table
//!
//! Records store attributes by a compact index instead of by name. The
//! table mapping indexes to attribute types is persisted in its own key
//! space (index as a 4-byte big-endian key, attribute name as the value)
//! and mirrored in memory.
//!
//! - Readers resolve indexes without touching storage
//! - New entries are written only inside a write transaction
//! - Interning an already known attribute is a no-op
//! - Entries added by an aborted transaction are unwound by the caller

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::kv::{Environment, KvResult, PutFlags, ReadTxn, SpaceId, SpaceOptions, WriteTxn};

use super::errors::{SchemaError, SchemaResult};
use super::registry::Schema;
use super::types::AttrDesc;

/// Key space holding the persisted table.
pub const AD_TABLE_SPACE: &str = "ad2i";

/// Largest number of interned attribute descriptions.
pub const MAX_ADS: usize = 1 << 16;

#[derive(Default)]
struct AdState {
    // Slot is None when a persisted name is unknown to the current schema.
    slots: Vec<Option<AttrDesc>>,
    by_name: HashMap<String, u32>,
}

/// Process-wide interning table for one store.
pub struct AdTable {
    space: SpaceId,
    schema: Arc<dyn Schema>,
    state: RwLock<AdState>,
}

impl AdTable {
    /// Opens the table's key space. Call [`AdTable::refresh`] to load it.
    pub fn open<E: Environment>(env: &E, schema: Arc<dyn Schema>) -> KvResult<Self> {
        let space = env.open_space(AD_TABLE_SPACE, SpaceOptions::plain())?;
        Ok(Self {
            space,
            schema,
            state: RwLock::new(AdState::default()),
        })
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    /// Number of known indexes.
    pub fn len(&self) -> usize {
        self.state.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attribute type interned at `adx`.
    pub fn resolve(&self, adx: u32) -> Option<AttrDesc> {
        self.state.read().slots.get(adx as usize).cloned().flatten()
    }

    /// Index of the attribute called `name`, if interned.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.state.read().by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Loads persisted entries the in-memory table has not seen yet.
    ///
    /// Returns how many entries were added.
    pub fn refresh<T: ReadTxn + ?Sized>(&self, txn: &T) -> SchemaResult<usize> {
        let mut state = self.state.write();
        self.load_locked(&mut state, txn)
    }

    fn load_locked<T: ReadTxn + ?Sized>(&self, state: &mut AdState, txn: &T) -> SchemaResult<usize> {
        let start = state.slots.len() as u32;
        let mut added = 0;
        let mut cursor = txn.seek_key(self.space, &start.to_be_bytes())?;
        while let Some(key) = cursor {
            let raw: [u8; 4] = key
                .as_slice()
                .try_into()
                .map_err(|_| SchemaError::Corrupt(format!("key of {} bytes", key.len())))?;
            let adx = u32::from_be_bytes(raw);
            if adx as usize != state.slots.len() {
                return Err(SchemaError::Corrupt(format!(
                    "expected index {}, found {}",
                    state.slots.len(),
                    adx
                )));
            }
            let value = txn
                .first_dup(self.space, &key)?
                .ok_or_else(|| SchemaError::Corrupt(format!("index {adx} has no name")))?;
            let name = String::from_utf8(value)
                .map_err(|_| SchemaError::Corrupt(format!("index {adx} name is not UTF-8")))?;

            let desc = self.schema.attribute(&name);
            if desc.is_none() {
                tracing::warn!(event = "AD_UNKNOWN_PERSISTED", adx, name = %name);
            }
            state.slots.push(desc);
            state.by_name.insert(name.to_ascii_lowercase(), adx);
            added += 1;
            cursor = txn.next_key(self.space, &key)?;
        }
        if added > 0 {
            tracing::debug!(event = "AD_TABLE_LOAD", added, total = state.slots.len());
        }
        Ok(added)
    }

    /// Returns the index of `desc`, persisting a new entry if needed.
    pub fn intern<T: WriteTxn + ?Sized>(&self, txn: &mut T, desc: &AttrDesc) -> SchemaResult<u32> {
        if let Some(adx) = self.index_of(desc.name()) {
            return Ok(adx);
        }

        let name = desc.name().to_ascii_lowercase();
        let mut state = self.state.write();
        // A stale table means another transaction committed entries we have
        // not loaded; reload once and try again.
        for _ in 0..2 {
            if let Some(adx) = state.by_name.get(&name) {
                return Ok(*adx);
            }
            let adx = state.slots.len();
            if adx >= MAX_ADS {
                return Err(SchemaError::TableFull(MAX_ADS));
            }
            let key = (adx as u32).to_be_bytes();
            match txn.put(self.space, &key, desc.name().as_bytes(), PutFlags::NO_OVERWRITE) {
                Ok(()) => {
                    state.slots.push(Some(Arc::clone(desc)));
                    state.by_name.insert(name, adx as u32);
                    tracing::debug!(event = "AD_INTERN", adx, name = desc.name());
                    return Ok(adx as u32);
                }
                Err(e) if e.is_key_exist() => {
                    tracing::warn!(event = "AD_TABLE_STALE", adx);
                    self.load_locked(&mut state, &*txn)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SchemaError::Corrupt(format!(
            "could not intern {} after reload",
            desc.name()
        )))
    }

    /// Current high-water mark, for [`AdTable::unwind`].
    pub fn mark(&self) -> usize {
        self.len()
    }

    /// Drops entries added after `mark`; their transaction was aborted.
    pub fn unwind(&self, mark: usize) {
        let mut state = self.state.write();
        if state.slots.len() <= mark {
            return;
        }
        let dropped = state.slots.len() - mark;
        state.slots.truncate(mark);
        state.by_name.retain(|_, adx| (*adx as usize) < mark);
        tracing::debug!(event = "AD_TABLE_UNWIND", dropped, total = mark);
    }
}

impl std::fmt::Debug for AdTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdTable")
            .field("space", &self.space)
            .field("len", &self.len())
            .finish()
    }
}
