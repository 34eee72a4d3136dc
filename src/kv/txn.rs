//! Transaction and key-space contract consumed by the data engine.
//!
//! The engine never owns storage. It is handed a transaction and issues
//! keyed reads/writes against named key spaces. A key space is either plain
//! (one value per key) or duplicate-sorted (many values per key, ordered by a
//! per-space comparator).
//!
//! Keys are ordered bytewise. Callers that need numeric key order encode
//! identifiers big-endian.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use super::errors::KvResult;

/// Opaque handle for an opened key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(u32);

impl SpaceId {
    /// Creates a handle from its raw value.
    #[inline]
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw handle value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Ordering of duplicate values stored under one key.
///
/// The key is passed along so a single comparator can serve key spaces
/// whose value order depends on what the key names (e.g. the attribute a
/// side-table key belongs to).
pub trait DupOrder: Send + Sync {
    fn compare(&self, key: &[u8], a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain lexicographic byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseOrder;

impl DupOrder for BytewiseOrder {
    fn compare(&self, _key: &[u8], a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Options applied when a key space is opened.
#[derive(Clone, Default)]
pub struct SpaceOptions {
    /// Whether several values may be stored under one key.
    pub dup_sort: bool,
    /// Comparator for duplicate values. Bytewise when `None`.
    pub dup_order: Option<Arc<dyn DupOrder>>,
}

impl SpaceOptions {
    /// One value per key.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Sorted duplicates, bytewise order.
    pub fn dup_sorted() -> Self {
        Self {
            dup_sort: true,
            dup_order: None,
        }
    }

    /// Sorted duplicates with a custom comparator.
    pub fn dup_sorted_by(order: Arc<dyn DupOrder>) -> Self {
        Self {
            dup_sort: true,
            dup_order: Some(order),
        }
    }
}

impl fmt::Debug for SpaceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceOptions")
            .field("dup_sort", &self.dup_sort)
            .field("custom_order", &self.dup_order.is_some())
            .finish()
    }
}

bitflags! {
    /// Write flags for [`WriteTxn::put`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PutFlags: u8 {
        /// Fail with `KeyExist` if the exact duplicate is already stored.
        const NO_DUP_DATA = 1 << 0;
        /// Fail with `KeyExist` if the key already holds any value.
        const NO_OVERWRITE = 1 << 1;
    }
}

/// Read operations available inside any transaction.
///
/// All duplicate lookups use the key space's duplicate comparator; "equal"
/// means the comparator returns `Ordering::Equal`, not byte equality.
pub trait ReadTxn {
    /// First (lowest) value stored under `key`.
    fn first_dup(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Last (highest) value stored under `key`.
    fn last_dup(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Stored duplicate comparing equal to `probe`.
    fn get_both(&self, space: SpaceId, key: &[u8], probe: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// First duplicate strictly greater than `after`.
    fn next_dup(&self, space: SpaceId, key: &[u8], after: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Number of values stored under `key`.
    fn dup_count(&self, space: SpaceId, key: &[u8]) -> KvResult<usize>;

    /// All values stored under `key`, in duplicate order.
    fn dups(&self, space: SpaceId, key: &[u8]) -> KvResult<Vec<Vec<u8>>>;

    /// First key greater than or equal to `key`.
    fn seek_key(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// First key strictly greater than `key`.
    fn next_key(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Greatest key in the space.
    fn last_key(&self, space: SpaceId) -> KvResult<Option<Vec<u8>>>;
}

/// Mutations, only available inside a write transaction.
///
/// Dropping a write transaction without calling [`WriteTxn::commit`] aborts
/// it and discards every write made through it.
pub trait WriteTxn: ReadTxn {
    /// Stores `value` under `key`.
    ///
    /// Plain spaces replace the current value unless `NO_OVERWRITE` is set.
    /// Duplicate-sorted spaces add the value to the set under `key`.
    fn put(&mut self, space: SpaceId, key: &[u8], value: &[u8], flags: PutFlags) -> KvResult<()>;

    /// Replaces the duplicate comparing equal to `probe` with `value`.
    ///
    /// `value` must compare equal to `probe` as well; a replacement may not
    /// move the duplicate to a different sort position.
    fn replace_dup(&mut self, space: SpaceId, key: &[u8], probe: &[u8], value: &[u8]) -> KvResult<()>;

    /// Deletes the duplicate comparing equal to `probe`. Returns whether one
    /// was found.
    fn del_dup(&mut self, space: SpaceId, key: &[u8], probe: &[u8]) -> KvResult<bool>;

    /// Deletes `key` and every value under it. Returns whether it existed.
    fn del_key(&mut self, space: SpaceId, key: &[u8]) -> KvResult<bool>;

    /// Makes every write visible to transactions started afterwards.
    fn commit(self) -> KvResult<()>
    where
        Self: Sized;
}

/// A store of key spaces that hands out transactions.
///
/// Transactions are owned values: a read transaction is a snapshot, a write
/// transaction holds the single-writer lock until committed or dropped.
pub trait Environment {
    type Read: ReadTxn;
    type Write: WriteTxn;

    /// Opens (creating if needed) the key space called `name`.
    ///
    /// Re-opening an existing name returns the same handle; the options of
    /// the first open win.
    fn open_space(&self, name: &str, options: SpaceOptions) -> KvResult<SpaceId>;

    /// Starts a read-only snapshot transaction.
    fn begin_read(&self) -> KvResult<Self::Read>;

    /// Starts the write transaction, waiting for any current writer.
    fn begin_write(&self) -> KvResult<Self::Write>;
}
