//! Side table for big multi-valued attributes
//!
//! Attributes with more values than their threshold are stored outside the
//! primary record, one duplicate per value under a key made of the record
//! id and the attribute index:
//!
//! ```text
//! key:   id (u64 BE) | adx (u32 BE)
//! value: normalized | 0x00 | [raw | 0x00] | trailer (u32 LE)
//! ```
//!
//! The trailer is the raw length plus one, or zero when the raw value is the
//! normalized value. Duplicates are ordered by the attribute's equality rule
//! applied to the normalized part.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::idl::{id_to_key, Id};
use crate::kv::{DupOrder, Environment, KvResult, PutFlags, ReadTxn, SpaceId, SpaceOptions, WriteTxn};
use crate::schema::AdTable;

use super::entry::Attribute;
use super::errors::{CodecError, CodecResult};

/// Key space holding side-table values.
pub const SIDE_VALUE_SPACE: &str = "id2v";

const KEY_LEN: usize = 12;
const TRAILER_LEN: usize = 4;

fn side_key(id: Id, adx: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..8].copy_from_slice(&id_to_key(id));
    key[8..].copy_from_slice(&adx.to_be_bytes());
    key
}

/// Builds one stored value.
pub fn encode_side_value(normalized: &[u8], raw: Option<&[u8]>) -> Vec<u8> {
    let raw_len = raw.map_or(0, |r| r.len() + 1);
    let mut out = Vec::with_capacity(normalized.len() + 1 + raw_len + TRAILER_LEN);
    out.extend_from_slice(normalized);
    out.push(0);
    let trailer = match raw {
        Some(raw) => {
            out.extend_from_slice(raw);
            out.push(0);
            raw.len() as u32 + 1
        }
        None => 0,
    };
    out.extend_from_slice(&trailer.to_le_bytes());
    out
}

/// Splits a stored value into its normalized and raw parts.
pub fn split_side_value(bytes: &[u8]) -> Option<(&[u8], Option<&[u8]>)> {
    if bytes.len() < TRAILER_LEN + 1 {
        return None;
    }
    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
    let trailer = u32::from_le_bytes(trailer.try_into().ok()?) as usize;
    if trailer == 0 {
        let (cmp, nul) = body.split_at(body.len() - 1);
        return (nul == [0]).then_some((cmp, None));
    }
    // normalized NUL raw NUL, where raw is trailer - 1 bytes
    let raw_end = body.len() - 1;
    let raw_start = raw_end.checked_sub(trailer - 1)?;
    let cmp_end = raw_start.checked_sub(1)?;
    if body[raw_end] != 0 || body[cmp_end] != 0 {
        return None;
    }
    Some((&body[..cmp_end], Some(&body[raw_start..raw_end])))
}

/// Equality-rule order over side-table values.
///
/// The attribute comes from the key; values of attributes the interning
/// table cannot resolve fall back to byte order.
pub struct SideValueOrder {
    ads: Arc<AdTable>,
}

impl SideValueOrder {
    pub fn new(ads: Arc<AdTable>) -> Self {
        Self { ads }
    }
}

impl DupOrder for SideValueOrder {
    fn compare(&self, key: &[u8], a: &[u8], b: &[u8]) -> Ordering {
        let (Some((a, _)), Some((b, _))) = (split_side_value(a), split_side_value(b)) else {
            return a.cmp(b);
        };
        let desc = key
            .get(8..KEY_LEN)
            .and_then(|raw| raw.try_into().ok())
            .map(u32::from_be_bytes)
            .and_then(|adx| self.ads.resolve(adx));
        match desc {
            Some(desc) => desc.compare_values(a, b),
            None => a.cmp(b),
        }
    }
}

/// Handle on the side-table key space.
#[derive(Debug, Clone, Copy)]
pub struct SideTable {
    space: SpaceId,
}

impl SideTable {
    pub fn open<E: Environment>(env: &E, ads: Arc<AdTable>) -> KvResult<Self> {
        let order = Arc::new(SideValueOrder::new(ads));
        let space = env.open_space(SIDE_VALUE_SPACE, SpaceOptions::dup_sorted_by(order))?;
        Ok(Self { space })
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    /// Stores every value of `attr` for record `id`.
    pub fn put_values<T: WriteTxn + ?Sized>(&self, txn: &mut T, id: Id, adx: u32, attr: &Attribute) -> CodecResult<()> {
        let key = side_key(id, adx);
        let distinct = attr.has_distinct_normalized();
        for (raw, norm) in attr.vals.iter().zip(attr.normalized()) {
            let value = encode_side_value(norm, distinct.then_some(raw.as_slice()));
            match txn.put(self.space, &key, &value, PutFlags::NO_DUP_DATA) {
                Ok(()) => {}
                Err(e) if e.is_key_exist() => {
                    return Err(CodecError::DuplicateValue {
                        attr: attr.name().to_string(),
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::trace!(event = "SIDE_PUT", id, adx, count = attr.len());
        Ok(())
    }

    /// Reads the `count` values of one attribute back, in stored order.
    ///
    /// Returns the raw values and, when `distinct`, the normalized ones.
    #[allow(clippy::type_complexity)]
    pub fn read_values<T: ReadTxn + ?Sized>(
        &self,
        txn: &T,
        id: Id,
        adx: u32,
        count: usize,
        distinct: bool,
    ) -> CodecResult<(Vec<Vec<u8>>, Option<Vec<Vec<u8>>>)> {
        let stored = txn.dups(self.space, &side_key(id, adx))?;
        if stored.len() != count {
            return Err(CodecError::malformed(
                id,
                format!("attribute {adx} has {} side values, record says {count}", stored.len()),
            ));
        }
        let mut vals = Vec::with_capacity(count);
        let mut nvals = Vec::with_capacity(if distinct { count } else { 0 });
        for bytes in &stored {
            let (norm, raw) = split_side_value(bytes)
                .ok_or_else(|| CodecError::malformed(id, format!("bad side value for attribute {adx}")))?;
            match (raw, distinct) {
                (Some(raw), true) => {
                    vals.push(raw.to_vec());
                    nvals.push(norm.to_vec());
                }
                (None, true) => {
                    vals.push(norm.to_vec());
                    nvals.push(norm.to_vec());
                }
                (_, false) => vals.push(norm.to_vec()),
            }
        }
        Ok((vals, distinct.then_some(nvals)))
    }

    /// Whether record `id` holds `normalized` for attribute `adx`.
    pub fn contains<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id, adx: u32, normalized: &[u8]) -> KvResult<bool> {
        let probe = encode_side_value(normalized, None);
        Ok(txn.get_both(self.space, &side_key(id, adx), &probe)?.is_some())
    }

    /// Removes the given normalized values. Returns how many were stored.
    pub fn delete_values<T, V>(&self, txn: &mut T, id: Id, adx: u32, normalized: &[V]) -> KvResult<usize>
    where
        T: WriteTxn + ?Sized,
        V: AsRef<[u8]>,
    {
        let key = side_key(id, adx);
        let mut removed = 0;
        for norm in normalized {
            if txn.del_dup(self.space, &key, &encode_side_value(norm.as_ref(), None))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Removes every value of one attribute.
    pub fn delete_attr<T: WriteTxn + ?Sized>(&self, txn: &mut T, id: Id, adx: u32) -> KvResult<bool> {
        txn.del_key(self.space, &side_key(id, adx))
    }

    /// Removes every side value of record `id`.
    pub fn delete_all<T: WriteTxn + ?Sized>(&self, txn: &mut T, id: Id) -> KvResult<usize> {
        let prefix = id_to_key(id);
        let mut doomed = Vec::new();
        let mut cursor = txn.seek_key(self.space, &prefix)?;
        while let Some(key) = cursor {
            if !key.starts_with(&prefix) {
                break;
            }
            cursor = txn.next_key(self.space, &key)?;
            doomed.push(key);
        }
        for key in &doomed {
            txn.del_key(self.space, key)?;
        }
        if !doomed.is_empty() {
            tracing::trace!(event = "SIDE_DELETE_ALL", id, attrs = doomed.len());
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemEnv;
    use crate::schema::{Schema, StaticSchema};

    fn setup() -> (MemEnv, Arc<dyn Schema>, Arc<AdTable>, SideTable) {
        let env = MemEnv::new();
        let schema: Arc<dyn Schema> = Arc::new(StaticSchema::standard());
        let ads = Arc::new(AdTable::open(&env, Arc::clone(&schema)).unwrap());
        let side = SideTable::open(&env, Arc::clone(&ads)).unwrap();
        (env, schema, ads, side)
    }

    #[test]
    fn test_value_layout() {
        let plain = encode_side_value(b"abc", None);
        assert_eq!(plain, b"abc\0\0\0\0\0".to_vec());
        assert_eq!(split_side_value(&plain), Some((&b"abc"[..], None)));

        let both = encode_side_value(b"abc", Some(b"ABC"));
        assert_eq!(&both[both.len() - 4..], &4u32.to_le_bytes());
        assert_eq!(split_side_value(&both), Some((&b"abc"[..], Some(&b"ABC"[..]))));

        assert_eq!(split_side_value(b"ab"), None);
        assert_eq!(split_side_value(b"abc\x01\x09\0\0\0"), None);
    }

    #[test]
    fn test_put_read_contains() {
        let (env, schema, ads, side) = setup();
        let mail = schema.attribute("mail").unwrap();
        let mut txn = env.begin_write().unwrap();
        let adx = ads.intern(&mut txn, &mail).unwrap();
        let attr = Attribute::new(mail, vec![b"Zed@x".to_vec(), b"amy@x".to_vec(), b"Bob@x".to_vec()]);
        side.put_values(&mut txn, 7, adx, &attr).unwrap();
        txn.commit().unwrap();

        let txn = env.begin_read().unwrap();
        let (vals, nvals) = side.read_values(&txn, 7, adx, 3, true).unwrap();
        assert_eq!(vals, vec![b"amy@x".to_vec(), b"Bob@x".to_vec(), b"Zed@x".to_vec()]);
        assert_eq!(nvals.unwrap()[1], b"bob@x".to_vec());
        assert!(side.contains(&txn, 7, adx, b"zed@x").unwrap());
        assert!(!side.contains(&txn, 8, adx, b"zed@x").unwrap());

        let err = side.read_values(&txn, 7, adx, 4, true).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { id: 7, .. }));
    }

    #[test]
    fn test_duplicate_value_rejected() {
        let (env, schema, ads, side) = setup();
        let cn = schema.attribute("cn").unwrap();
        let mut txn = env.begin_write().unwrap();
        let adx = ads.intern(&mut txn, &cn).unwrap();
        let attr = Attribute::new(cn, vec![b"Same".to_vec(), b"same".to_vec()]);
        let err = side.put_values(&mut txn, 1, adx, &attr).unwrap_err();
        assert_eq!(err, CodecError::DuplicateValue { attr: "cn".into() });
    }

    #[test]
    fn test_delete_all_only_touches_one_record() {
        let (env, schema, ads, side) = setup();
        let cn = schema.attribute("cn").unwrap();
        let sn = schema.attribute("sn").unwrap();
        let mut txn = env.begin_write().unwrap();
        let cn_adx = ads.intern(&mut txn, &cn).unwrap();
        let sn_adx = ads.intern(&mut txn, &sn).unwrap();
        for id in [1, 2] {
            side.put_values(&mut txn, id, cn_adx, &Attribute::new(cn.clone(), vec![b"a".to_vec()]))
                .unwrap();
            side.put_values(&mut txn, id, sn_adx, &Attribute::new(sn.clone(), vec![b"b".to_vec()]))
                .unwrap();
        }
        assert_eq!(side.delete_all(&mut txn, 1).unwrap(), 2);
        assert!(!side.contains(&txn, 1, cn_adx, b"a").unwrap());
        assert!(side.contains(&txn, 2, cn_adx, b"a").unwrap());
        assert_eq!(side.delete_values(&mut txn, 2, sn_adx, &[b"b".as_slice(), b"zz".as_slice()]).unwrap(), 1);
    }
}
