//! On-disk identifier lists
//!
//! An index key holds its identifiers as sorted duplicate values, each an
//! 8-byte big-endian id. Once a key reaches `db_max` identifiers it is
//! rewritten in range form: three duplicates `{0, lo, hi}`. Identifier 0 is
//! never assigned to a record, so a leading zero marks the range form.

use crate::kv::{KvError, KvResult, PutFlags, ReadTxn, SpaceId, WriteTxn};

use super::list::{Id, Idl, IDL_UM_SIZE};

/// Encodes an identifier as an order-preserving key or value.
#[inline]
pub fn id_to_key(id: Id) -> [u8; 8] {
    id.to_be_bytes()
}

/// Decodes an 8-byte big-endian identifier.
#[inline]
pub fn key_to_id(bytes: &[u8]) -> Option<Id> {
    let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    Some(Id::from_be_bytes(raw))
}

fn decode_value(bytes: &[u8]) -> KvResult<Id> {
    if bytes.len() != 8 {
        return Err(KvError::Engine(format!(
            "index value has {} bytes, expected 8",
            bytes.len()
        )));
    }
    key_to_id(bytes).ok_or_else(|| KvError::Engine("index value unreadable".into()))
}

fn read_range<T: ReadTxn + ?Sized>(txn: &T, space: SpaceId, key: &[u8]) -> KvResult<(Id, Id)> {
    let zero = id_to_key(0);
    let lo = txn
        .next_dup(space, key, &zero)?
        .ok_or_else(|| KvError::Engine("range key missing lower bound".into()))?;
    let hi = txn
        .next_dup(space, key, &lo)?
        .ok_or_else(|| KvError::Engine("range key missing upper bound".into()))?;
    Ok((decode_value(&lo)?, decode_value(&hi)?))
}

fn write_range<T: WriteTxn + ?Sized>(txn: &mut T, space: SpaceId, key: &[u8], lo: Id, hi: Id) -> KvResult<()> {
    txn.del_key(space, key)?;
    for id in [0, lo, hi] {
        txn.put(space, key, &id_to_key(id), PutFlags::empty())?;
    }
    Ok(())
}

/// Reads the identifiers stored under `key`. A missing key is empty.
pub fn read_key<T: ReadTxn + ?Sized>(txn: &T, space: SpaceId, key: &[u8]) -> KvResult<Idl> {
    let values = txn.dups(space, key)?;
    let Some(first) = values.first() else {
        return Ok(Idl::empty());
    };
    if decode_value(first)? == 0 {
        if values.len() != 3 {
            return Err(KvError::Engine(format!(
                "range key holds {} values, expected 3",
                values.len()
            )));
        }
        let lo = decode_value(&values[1])?;
        let hi = decode_value(&values[2])?;
        return Ok(Idl::range(lo, hi));
    }
    if values.len() > IDL_UM_SIZE {
        let lo = decode_value(first)?;
        let hi = decode_value(&values[values.len() - 1])?;
        return Ok(Idl::range(lo, hi));
    }
    let ids = values
        .iter()
        .map(|v| decode_value(v))
        .collect::<KvResult<Vec<Id>>>()?;
    Ok(Idl::List(ids))
}

/// Adds `id` under every key in `keys`.
pub fn insert_keys<T, K>(txn: &mut T, space: SpaceId, keys: &[K], id: Id, db_max: usize) -> KvResult<()>
where
    T: WriteTxn + ?Sized,
    K: AsRef<[u8]>,
{
    let value = id_to_key(id);
    for key in keys {
        let key = key.as_ref();
        let Some(first) = txn.first_dup(space, key)? else {
            txn.put(space, key, &value, PutFlags::empty())?;
            continue;
        };
        let first = decode_value(&first)?;
        if first != 0 {
            if txn.dup_count(space, key)? < db_max {
                txn.put(space, key, &value, PutFlags::empty())?;
                continue;
            }
            let last = match txn.last_dup(space, key)? {
                Some(bytes) => decode_value(&bytes)?,
                None => first,
            };
            let (lo, hi) = (first.min(id), last.max(id));
            write_range(txn, space, key, lo, hi)?;
            tracing::debug!(event = "IDL_KEY_TO_RANGE", space = space.value(), lo, hi);
            continue;
        }

        let (lo, hi) = read_range(&*txn, space, key)?;
        if id < lo || id > hi {
            write_range(txn, space, key, lo.min(id), hi.max(id))?;
        }
    }
    Ok(())
}

/// Removes `id` from every key in `keys`.
///
/// Removing from the inside of a range key is a no-op. Removing a bound
/// shrinks the range; a range left with one member is rewritten as an
/// explicit single identifier, and an emptied key is deleted.
pub fn delete_keys<T, K>(txn: &mut T, space: SpaceId, keys: &[K], id: Id) -> KvResult<()>
where
    T: WriteTxn + ?Sized,
    K: AsRef<[u8]>,
{
    let value = id_to_key(id);
    for key in keys {
        let key = key.as_ref();
        let Some(first) = txn.first_dup(space, key)? else {
            continue;
        };
        if decode_value(&first)? != 0 {
            txn.del_dup(space, key, &value)?;
            continue;
        }

        let (mut lo, mut hi) = read_range(&*txn, space, key)?;
        if id == lo {
            lo += 1;
        } else if id == hi {
            hi -= 1;
        } else {
            continue;
        }
        if lo > hi {
            txn.del_key(space, key)?;
        } else if lo == hi {
            txn.del_key(space, key)?;
            txn.put(space, key, &id_to_key(lo), PutFlags::empty())?;
        } else {
            write_range(txn, space, key, lo, hi)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{Environment, MemEnv, SpaceOptions};

    fn setup() -> (MemEnv, SpaceId) {
        let env = MemEnv::new();
        let space = env.open_space("idx.test", SpaceOptions::dup_sorted()).unwrap();
        (env, space)
    }

    #[test]
    fn test_missing_key_reads_empty() {
        let (env, space) = setup();
        let txn = env.begin_read().unwrap();
        assert!(read_key(&txn, space, b"nope").unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_read_explicit() {
        let (env, space) = setup();
        let mut txn = env.begin_write().unwrap();
        for id in [7, 3, 5] {
            insert_keys(&mut txn, space, &[b"k"], id, 16).unwrap();
        }
        assert_eq!(read_key(&txn, space, b"k").unwrap(), Idl::List(vec![3, 5, 7]));
    }

    #[test]
    fn test_key_becomes_range_at_threshold() {
        let (env, space) = setup();
        let mut txn = env.begin_write().unwrap();
        for id in 1..=4 {
            insert_keys(&mut txn, space, &[b"k"], id, 4).unwrap();
        }
        assert_eq!(txn.dup_count(space, b"k").unwrap(), 4);

        insert_keys(&mut txn, space, &[b"k"], 9, 4).unwrap();
        assert_eq!(read_key(&txn, space, b"k").unwrap(), Idl::range(1, 9));

        // Inside the range: unchanged. Outside: widened.
        insert_keys(&mut txn, space, &[b"k"], 5, 4).unwrap();
        assert_eq!(read_key(&txn, space, b"k").unwrap(), Idl::range(1, 9));
        insert_keys(&mut txn, space, &[b"k"], 12, 4).unwrap();
        assert_eq!(read_key(&txn, space, b"k").unwrap(), Idl::range(1, 12));
    }

    #[test]
    fn test_delete_from_range_bounds() {
        let (env, space) = setup();
        let mut txn = env.begin_write().unwrap();
        for id in 1..=3 {
            insert_keys(&mut txn, space, &[b"k"], id, 2).unwrap();
        }
        assert_eq!(read_key(&txn, space, b"k").unwrap(), Idl::range(1, 3));

        delete_keys(&mut txn, space, &[b"k"], 2).unwrap();
        assert_eq!(read_key(&txn, space, b"k").unwrap(), Idl::range(1, 3));

        delete_keys(&mut txn, space, &[b"k"], 1).unwrap();
        assert_eq!(read_key(&txn, space, b"k").unwrap(), Idl::range(2, 3));

        delete_keys(&mut txn, space, &[b"k"], 3).unwrap();
        assert_eq!(read_key(&txn, space, b"k").unwrap(), Idl::List(vec![2]));

        delete_keys(&mut txn, space, &[b"k"], 2).unwrap();
        assert_eq!(txn.first_dup(space, b"k").unwrap(), None);
    }

    #[test]
    fn test_delete_explicit_removes_empty_key() {
        let (env, space) = setup();
        let mut txn = env.begin_write().unwrap();
        insert_keys(&mut txn, space, &[b"a", b"b"], 4, 16).unwrap();
        delete_keys(&mut txn, space, &[b"a"], 4).unwrap();
        assert_eq!(txn.first_dup(space, b"a").unwrap(), None);
        assert_eq!(read_key(&txn, space, b"b").unwrap(), Idl::List(vec![4]));
    }

    #[test]
    fn test_id_key_order_matches_numeric_order() {
        assert!(id_to_key(255) < id_to_key(256));
        assert_eq!(key_to_id(&id_to_key(42)), Some(42));
        assert_eq!(key_to_id(&[1, 2]), None);
    }
}
