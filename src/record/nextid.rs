//! Identifier allocation
//!
//! The counter is seeded lazily from the highest stored identifier and then
//! advanced in memory. Identifiers are never reused while the counter is
//! valid; after an aborted insert the caller invalidates it so the next
//! allocation reseeds from storage.
//!
//! Only the write transaction seeds the counter. A read snapshot may be
//! older than the last commit, so readers compute the seed without keeping
//! it.

use parking_lot::Mutex;

use crate::idl::{Id, NOID};
use crate::kv::{KvError, KvResult, ReadTxn, WriteTxn};

use super::id2entry::PrimaryStore;

#[derive(Debug, Default)]
pub struct NextId {
    last: Mutex<Option<Id>>,
}

impl NextId {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next identifier.
    pub fn assign<T: WriteTxn + ?Sized>(&self, txn: &T, primary: &PrimaryStore) -> KvResult<Id> {
        let mut last = self.last.lock();
        let current = match *last {
            Some(id) => id,
            None => primary.max_id(txn)?.unwrap_or(0),
        };
        let next = current + 1;
        if next >= NOID {
            return Err(KvError::Engine("identifier space exhausted".into()));
        }
        *last = Some(next);
        tracing::trace!(event = "NEXTID_ASSIGN", id = next);
        Ok(next)
    }

    /// Highest identifier handed out or stored, 0 if none.
    pub fn last_assigned<T: ReadTxn + ?Sized>(&self, txn: &T, primary: &PrimaryStore) -> KvResult<Id> {
        if let Some(id) = *self.last.lock() {
            return Ok(id);
        }
        Ok(primary.max_id(txn)?.unwrap_or(0))
    }

    /// Records that `id` was stored by a caller-chosen assignment.
    pub fn observe(&self, id: Id) {
        let mut last = self.last.lock();
        if let Some(current) = *last {
            if id > current {
                *last = Some(id);
            }
        }
    }

    /// Forgets the cached counter.
    pub fn invalidate(&self) {
        *self.last.lock() = None;
    }
}
