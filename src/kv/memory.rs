//! In-memory snapshot engine
//!
//! A reference implementation of the key-value contract, used by tests and
//! by embedders that do not need durability.
//!
//! - Readers see the state committed when they began (snapshot isolation)
//! - One writer at a time; `begin_write` blocks while another is live
//! - Each key space is copied on its first write inside a transaction
//! - Commit publishes the working copy atomically; drop discards it

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock};

use super::errors::{KvError, KvResult};
use super::txn::{
    BytewiseOrder, DupOrder, Environment, PutFlags, ReadTxn, SpaceId, SpaceOptions, WriteTxn,
};

type SpaceMap = BTreeMap<Vec<u8>, Vec<Vec<u8>>>;

#[derive(Clone)]
struct SpaceMeta {
    dup_sort: bool,
    order: Arc<dyn DupOrder>,
}

#[derive(Default)]
struct Catalog {
    names: HashMap<String, SpaceId>,
    spaces: Vec<SpaceMeta>,
}

#[derive(Clone, Default)]
struct Snapshot {
    spaces: Vec<Arc<SpaceMap>>,
}

impl Snapshot {
    fn space(&self, space: SpaceId) -> Option<&SpaceMap> {
        self.spaces.get(space.value() as usize).map(|m| m.as_ref())
    }
}

struct Inner {
    catalog: RwLock<Catalog>,
    current: RwLock<Arc<Snapshot>>,
    writer: Arc<Mutex<()>>,
}

impl Inner {
    fn meta(&self, space: SpaceId) -> KvResult<SpaceMeta> {
        self.catalog
            .read()
            .spaces
            .get(space.value() as usize)
            .cloned()
            .ok_or(KvError::UnknownSpace(space.value()))
    }
}

/// In-memory transactional key-value environment.
///
/// Cloning is cheap and yields another handle to the same store.
#[derive(Clone)]
pub struct MemEnv {
    inner: Arc<Inner>,
}

impl Default for MemEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog: RwLock::new(Catalog::default()),
                current: RwLock::new(Arc::new(Snapshot::default())),
                writer: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Returns the handle of an already opened space.
    pub fn space(&self, name: &str) -> Option<SpaceId> {
        self.inner.catalog.read().names.get(name).copied()
    }
}

impl Environment for MemEnv {
    type Read = MemReadTxn;
    type Write = MemWriteTxn;

    fn open_space(&self, name: &str, options: SpaceOptions) -> KvResult<SpaceId> {
        let mut catalog = self.inner.catalog.write();
        if let Some(id) = catalog.names.get(name) {
            return Ok(*id);
        }
        let id = SpaceId::new(catalog.spaces.len() as u32);
        let order: Arc<dyn DupOrder> = options
            .dup_order
            .clone()
            .unwrap_or_else(|| Arc::new(BytewiseOrder));
        catalog.spaces.push(SpaceMeta {
            dup_sort: options.dup_sort,
            order,
        });
        catalog.names.insert(name.to_string(), id);
        tracing::trace!(event = "KV_SPACE_OPEN", name, space = id.value());
        Ok(id)
    }

    fn begin_read(&self) -> KvResult<MemReadTxn> {
        let snapshot = self.inner.current.read().clone();
        Ok(MemReadTxn {
            inner: Arc::clone(&self.inner),
            snapshot,
        })
    }

    fn begin_write(&self) -> KvResult<MemWriteTxn> {
        let guard = self.inner.writer.lock_arc();
        let working = self.inner.current.read().as_ref().clone();
        Ok(MemWriteTxn {
            inner: Arc::clone(&self.inner),
            working,
            _writer: guard,
        })
    }
}

/// Read-only snapshot.
pub struct MemReadTxn {
    inner: Arc<Inner>,
    snapshot: Arc<Snapshot>,
}

impl MemReadTxn {
    /// Moves the snapshot forward to the latest committed state.
    ///
    /// Lets a pooled reader be reused across requests without reallocating.
    pub fn renew(&mut self) {
        self.snapshot = self.inner.current.read().clone();
    }
}

/// The single live writer.
pub struct MemWriteTxn {
    inner: Arc<Inner>,
    working: Snapshot,
    _writer: ArcMutexGuard<RawMutex, ()>,
}

impl MemWriteTxn {
    fn space_mut(&mut self, space: SpaceId) -> &mut SpaceMap {
        let idx = space.value() as usize;
        if self.working.spaces.len() <= idx {
            self.working.spaces.resize_with(idx + 1, Default::default);
        }
        Arc::make_mut(&mut self.working.spaces[idx])
    }
}

fn find_dup(meta: &SpaceMeta, key: &[u8], dups: &[Vec<u8>], probe: &[u8]) -> Result<usize, usize> {
    dups.binary_search_by(|stored| meta.order.compare(key, stored, probe))
}

// Shared read path for both transaction kinds.
fn read_ops<'a>(inner: &'a Inner, snapshot: &'a Snapshot) -> Reader<'a> {
    Reader { inner, snapshot }
}

struct Reader<'a> {
    inner: &'a Inner,
    snapshot: &'a Snapshot,
}

impl Reader<'_> {
    fn dups_of(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<&Vec<Vec<u8>>>> {
        self.inner.meta(space)?;
        Ok(self.snapshot.space(space).and_then(|m| m.get(key)))
    }

    fn first_dup(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.dups_of(space, key)?.and_then(|d| d.first().cloned()))
    }

    fn last_dup(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.dups_of(space, key)?.and_then(|d| d.last().cloned()))
    }

    fn get_both(&self, space: SpaceId, key: &[u8], probe: &[u8]) -> KvResult<Option<Vec<u8>>> {
        let meta = self.inner.meta(space)?;
        let Some(dups) = self.snapshot.space(space).and_then(|m| m.get(key)) else {
            return Ok(None);
        };
        Ok(find_dup(&meta, key, dups, probe).ok().map(|pos| dups[pos].clone()))
    }

    fn next_dup(&self, space: SpaceId, key: &[u8], after: &[u8]) -> KvResult<Option<Vec<u8>>> {
        let meta = self.inner.meta(space)?;
        let Some(dups) = self.snapshot.space(space).and_then(|m| m.get(key)) else {
            return Ok(None);
        };
        let pos = match find_dup(&meta, key, dups, after) {
            Ok(pos) => pos + 1,
            Err(pos) => pos,
        };
        Ok(dups.get(pos).cloned())
    }

    fn dup_count(&self, space: SpaceId, key: &[u8]) -> KvResult<usize> {
        Ok(self.dups_of(space, key)?.map_or(0, |d| d.len()))
    }

    fn dups(&self, space: SpaceId, key: &[u8]) -> KvResult<Vec<Vec<u8>>> {
        Ok(self.dups_of(space, key)?.cloned().unwrap_or_default())
    }

    fn key_after(&self, space: SpaceId, lower: Bound<&[u8]>) -> KvResult<Option<Vec<u8>>> {
        self.inner.meta(space)?;
        Ok(self.snapshot.space(space).and_then(|m| {
            m.range::<[u8], _>((lower, Bound::Unbounded))
                .next()
                .map(|(k, _)| k.clone())
        }))
    }

    fn last_key(&self, space: SpaceId) -> KvResult<Option<Vec<u8>>> {
        self.inner.meta(space)?;
        Ok(self
            .snapshot
            .space(space)
            .and_then(|m| m.keys().next_back().cloned()))
    }
}

macro_rules! impl_read_txn {
    ($ty:ty, $snap:ident) => {
        impl ReadTxn for $ty {
            fn first_dup(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
                read_ops(&self.inner, &self.$snap).first_dup(space, key)
            }

            fn last_dup(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
                read_ops(&self.inner, &self.$snap).last_dup(space, key)
            }

            fn get_both(&self, space: SpaceId, key: &[u8], probe: &[u8]) -> KvResult<Option<Vec<u8>>> {
                read_ops(&self.inner, &self.$snap).get_both(space, key, probe)
            }

            fn next_dup(&self, space: SpaceId, key: &[u8], after: &[u8]) -> KvResult<Option<Vec<u8>>> {
                read_ops(&self.inner, &self.$snap).next_dup(space, key, after)
            }

            fn dup_count(&self, space: SpaceId, key: &[u8]) -> KvResult<usize> {
                read_ops(&self.inner, &self.$snap).dup_count(space, key)
            }

            fn dups(&self, space: SpaceId, key: &[u8]) -> KvResult<Vec<Vec<u8>>> {
                read_ops(&self.inner, &self.$snap).dups(space, key)
            }

            fn seek_key(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
                read_ops(&self.inner, &self.$snap).key_after(space, Bound::Included(key))
            }

            fn next_key(&self, space: SpaceId, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
                read_ops(&self.inner, &self.$snap).key_after(space, Bound::Excluded(key))
            }

            fn last_key(&self, space: SpaceId) -> KvResult<Option<Vec<u8>>> {
                read_ops(&self.inner, &self.$snap).last_key(space)
            }
        }
    };
}

impl_read_txn!(MemReadTxn, snapshot);
impl_read_txn!(MemWriteTxn, working);

impl WriteTxn for MemWriteTxn {
    fn put(&mut self, space: SpaceId, key: &[u8], value: &[u8], flags: PutFlags) -> KvResult<()> {
        let meta = self.inner.meta(space)?;
        let map = self.space_mut(space);

        if !meta.dup_sort {
            if flags.contains(PutFlags::NO_OVERWRITE) && map.contains_key(key) {
                return Err(KvError::KeyExist);
            }
            map.insert(key.to_vec(), vec![value.to_vec()]);
            return Ok(());
        }

        if flags.contains(PutFlags::NO_OVERWRITE) && map.contains_key(key) {
            return Err(KvError::KeyExist);
        }
        let dups = map.entry(key.to_vec()).or_default();
        match find_dup(&meta, key, dups, value) {
            Ok(_) if flags.contains(PutFlags::NO_DUP_DATA) => Err(KvError::KeyExist),
            Ok(_) => Ok(()),
            Err(pos) => {
                dups.insert(pos, value.to_vec());
                Ok(())
            }
        }
    }

    fn replace_dup(&mut self, space: SpaceId, key: &[u8], probe: &[u8], value: &[u8]) -> KvResult<()> {
        let meta = self.inner.meta(space)?;
        if meta.order.compare(key, value, probe) != std::cmp::Ordering::Equal {
            return Err(KvError::BadReplace);
        }
        let map = self.space_mut(space);
        let Some(dups) = map.get_mut(key) else {
            return Err(KvError::NotFound("replace target key".into()));
        };
        match find_dup(&meta, key, dups, probe) {
            Ok(pos) => {
                dups[pos] = value.to_vec();
                Ok(())
            }
            Err(_) => Err(KvError::NotFound("replace target value".into())),
        }
    }

    fn del_dup(&mut self, space: SpaceId, key: &[u8], probe: &[u8]) -> KvResult<bool> {
        let meta = self.inner.meta(space)?;
        let map = self.space_mut(space);
        let Some(dups) = map.get_mut(key) else {
            return Ok(false);
        };
        let removed = match find_dup(&meta, key, dups, probe) {
            Ok(pos) => {
                dups.remove(pos);
                true
            }
            Err(_) => false,
        };
        if dups.is_empty() {
            map.remove(key);
        }
        Ok(removed)
    }

    fn del_key(&mut self, space: SpaceId, key: &[u8]) -> KvResult<bool> {
        self.inner.meta(space)?;
        Ok(self.space_mut(space).remove(key).is_some())
    }

    fn commit(self) -> KvResult<()> {
        let MemWriteTxn { inner, working, _writer } = self;
        *inner.current.write() = Arc::new(working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    struct ReverseOrder;

    impl DupOrder for ReverseOrder {
        fn compare(&self, _key: &[u8], a: &[u8], b: &[u8]) -> Ordering {
            b.cmp(a)
        }
    }

    #[test]
    fn test_plain_put_and_overwrite() {
        let env = MemEnv::new();
        let s = env.open_space("plain", SpaceOptions::plain()).unwrap();
        let mut txn = env.begin_write().unwrap();
        txn.put(s, b"k", b"v1", PutFlags::empty()).unwrap();
        txn.put(s, b"k", b"v2", PutFlags::empty()).unwrap();
        assert_eq!(txn.first_dup(s, b"k").unwrap(), Some(b"v2".to_vec()));

        let err = txn.put(s, b"k", b"v3", PutFlags::NO_OVERWRITE).unwrap_err();
        assert!(err.is_key_exist());
    }

    #[test]
    fn test_dup_sorted_order_and_navigation() {
        let env = MemEnv::new();
        let s = env.open_space("dups", SpaceOptions::dup_sorted()).unwrap();
        let mut txn = env.begin_write().unwrap();
        for v in [b"c", b"a", b"b"] {
            txn.put(s, b"k", v, PutFlags::empty()).unwrap();
        }
        assert_eq!(txn.dups(s, b"k").unwrap(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(txn.next_dup(s, b"k", b"a").unwrap(), Some(b"b".to_vec()));
        assert_eq!(txn.next_dup(s, b"k", b"c").unwrap(), None);
        assert_eq!(txn.dup_count(s, b"k").unwrap(), 3);

        let err = txn.put(s, b"k", b"b", PutFlags::NO_DUP_DATA).unwrap_err();
        assert!(err.is_key_exist());
    }

    #[test]
    fn test_custom_dup_order() {
        let env = MemEnv::new();
        let s = env
            .open_space("rev", SpaceOptions::dup_sorted_by(Arc::new(ReverseOrder)))
            .unwrap();
        let mut txn = env.begin_write().unwrap();
        for v in [b"a", b"c", b"b"] {
            txn.put(s, b"k", v, PutFlags::empty()).unwrap();
        }
        assert_eq!(txn.first_dup(s, b"k").unwrap(), Some(b"c".to_vec()));
        assert_eq!(txn.last_dup(s, b"k").unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn test_delete_dup_removes_empty_key() {
        let env = MemEnv::new();
        let s = env.open_space("dups", SpaceOptions::dup_sorted()).unwrap();
        let mut txn = env.begin_write().unwrap();
        txn.put(s, b"k", b"a", PutFlags::empty()).unwrap();
        assert!(txn.del_dup(s, b"k", b"a").unwrap());
        assert!(!txn.del_dup(s, b"k", b"a").unwrap());
        assert_eq!(txn.seek_key(s, b"").unwrap(), None);
    }

    #[test]
    fn test_key_navigation() {
        let env = MemEnv::new();
        let s = env.open_space("keys", SpaceOptions::plain()).unwrap();
        let mut txn = env.begin_write().unwrap();
        for k in [b"b", b"d", b"f"] {
            txn.put(s, k, b"", PutFlags::empty()).unwrap();
        }
        assert_eq!(txn.seek_key(s, b"c").unwrap(), Some(b"d".to_vec()));
        assert_eq!(txn.seek_key(s, b"d").unwrap(), Some(b"d".to_vec()));
        assert_eq!(txn.next_key(s, b"d").unwrap(), Some(b"f".to_vec()));
        assert_eq!(txn.last_key(s).unwrap(), Some(b"f".to_vec()));
    }

    #[test]
    fn test_snapshot_isolation() {
        let env = MemEnv::new();
        let s = env.open_space("iso", SpaceOptions::plain()).unwrap();

        let mut reader = env.begin_read().unwrap();
        let mut txn = env.begin_write().unwrap();
        txn.put(s, b"k", b"v", PutFlags::empty()).unwrap();
        txn.commit().unwrap();

        assert_eq!(reader.first_dup(s, b"k").unwrap(), None);
        reader.renew();
        assert_eq!(reader.first_dup(s, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_dropped_writer_aborts() {
        let env = MemEnv::new();
        let s = env.open_space("abort", SpaceOptions::plain()).unwrap();
        {
            let mut txn = env.begin_write().unwrap();
            txn.put(s, b"k", b"v", PutFlags::empty()).unwrap();
        }
        let reader = env.begin_read().unwrap();
        assert_eq!(reader.first_dup(s, b"k").unwrap(), None);
    }

    #[test]
    fn test_replace_dup_must_keep_position() {
        let env = MemEnv::new();
        let s = env.open_space("dups", SpaceOptions::dup_sorted()).unwrap();
        let mut txn = env.begin_write().unwrap();
        txn.put(s, b"k", b"a", PutFlags::empty()).unwrap();
        assert_eq!(txn.replace_dup(s, b"k", b"a", b"b").unwrap_err(), KvError::BadReplace);
    }

    #[test]
    fn test_unknown_space() {
        let env = MemEnv::new();
        let txn = env.begin_read().unwrap();
        assert_eq!(
            txn.first_dup(SpaceId::new(9), b"k").unwrap_err(),
            KvError::UnknownSpace(9)
        );
    }
}
