//! Primary record store
//!
//! Encoded records keyed by identifier (u64 big-endian), so the last key is
//! the highest identifier ever stored.

use crate::idl::{id_to_key, key_to_id, Id};
use crate::kv::{Environment, KvError, KvResult, PutFlags, ReadTxn, SpaceId, SpaceOptions, WriteTxn};

/// Key space holding encoded records.
pub const PRIMARY_SPACE: &str = "id2entry";

#[derive(Debug, Clone, Copy)]
pub struct PrimaryStore {
    space: SpaceId,
}

impl PrimaryStore {
    pub fn open<E: Environment>(env: &E) -> KvResult<Self> {
        Ok(Self {
            space: env.open_space(PRIMARY_SPACE, SpaceOptions::plain())?,
        })
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    /// Stores a new record. Fails with `KeyExist` if `id` is taken.
    pub fn put<T: WriteTxn + ?Sized>(&self, txn: &mut T, id: Id, bytes: &[u8]) -> KvResult<()> {
        txn.put(self.space, &id_to_key(id), bytes, PutFlags::NO_OVERWRITE)
    }

    /// Replaces the image of an existing record.
    pub fn update<T: WriteTxn + ?Sized>(&self, txn: &mut T, id: Id, bytes: &[u8]) -> KvResult<()> {
        let key = id_to_key(id);
        if txn.first_dup(self.space, &key)?.is_none() {
            return Err(KvError::NotFound(format!("record {id}")));
        }
        txn.put(self.space, &key, bytes, PutFlags::empty())
    }

    pub fn get<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> KvResult<Option<Vec<u8>>> {
        txn.first_dup(self.space, &id_to_key(id))
    }

    pub fn delete<T: WriteTxn + ?Sized>(&self, txn: &mut T, id: Id) -> KvResult<bool> {
        txn.del_key(self.space, &id_to_key(id))
    }

    /// Highest stored identifier.
    pub fn max_id<T: ReadTxn + ?Sized>(&self, txn: &T) -> KvResult<Option<Id>> {
        Ok(txn.last_key(self.space)?.as_deref().and_then(key_to_id))
    }
}
