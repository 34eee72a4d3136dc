//! Primary record encoding
//!
//! A record is stored as a flat little-endian image:
//!
//! ```text
//! +-------------------------------+
//! | nattrs      (u32)             |
//! | nvals       (u32)             |  inline value slots, see below
//! | ocflags     (u32)             |
//! | offset      (u32)             |  u32 words in the attribute area
//! +-------------------------------+
//! | per attribute:                |
//! |   adx | SORTED? | MULTI?      |  HIGH_BIT, MV_BIT
//! |   count | DISTINCT?           |  HIGH_BIT when normalized values follow
//! |   raw lengths     (inline)    |
//! |   normalized lengths (inline) |
//! +-------------------------------+
//! | value bytes, NUL-terminated   |
//! | zero padding to 8 bytes       |
//! +-------------------------------+
//! ```
//!
//! `nvals` counts, for each inline attribute, its values plus one, and the
//! same again when normalized values are present. Out-of-line attributes
//! carry only their two header words; their values live in the side table.
//!
//! The DN and the record id are not part of the image.

use serde::{Deserialize, Serialize};

use crate::dn::Dn;
use crate::idl::Id;
use crate::kv::ReadTxn;
use crate::schema::AdTable;

use super::entry::{AttrFlags, Attribute, ObjectClassFlags, Record};
use super::errors::{CodecError, CodecResult};
use super::multival::SideTable;

/// Marks a sorted attribute (index word) or present normalized values
/// (count word).
pub const HIGH_BIT: u32 = 0x8000_0000;

/// Marks an attribute whose values live in the side table.
pub const MV_BIT: u32 = 0x4000_0000;

const HEADER_LEN: usize = 16;
const ALIGN: usize = 8;

/// Out-of-line thresholds for one attribute type.
///
/// An attribute moves to the side table once it has more than `hi` values,
/// and moves back only when it drops below `lo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultivalThreshold {
    pub hi: usize,
    pub lo: usize,
}

impl Default for MultivalThreshold {
    fn default() -> Self {
        Self {
            hi: usize::MAX,
            lo: usize::MAX,
        }
    }
}

/// Thresholds per attribute type, with a store-wide default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultivalPolicy {
    #[serde(default)]
    pub default: MultivalThreshold,
    #[serde(default)]
    pub attrs: Vec<AttrThreshold>,
}

/// Threshold override for one attribute type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrThreshold {
    pub attr: String,
    pub hi: usize,
    pub lo: usize,
}

impl MultivalPolicy {
    pub fn new(default: MultivalThreshold) -> Self {
        Self {
            default,
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, attr: impl Into<String>, hi: usize, lo: usize) -> Self {
        self.attrs.push(AttrThreshold {
            attr: attr.into(),
            hi,
            lo,
        });
        self
    }

    pub fn threshold(&self, name: &str) -> MultivalThreshold {
        self.attrs
            .iter()
            .find(|t| t.attr.eq_ignore_ascii_case(name))
            .map(|t| MultivalThreshold { hi: t.hi, lo: t.lo })
            .unwrap_or(self.default)
    }

    /// Whether `attr` is stored out of line.
    pub fn is_big(&self, attr: &Attribute) -> bool {
        let t = self.threshold(attr.name());
        if attr.flags.contains(AttrFlags::BIG_MULTI) {
            attr.len() >= t.lo
        } else {
            attr.len() > t.hi
        }
    }
}

/// Sizes computed before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub nattrs: u32,
    pub nvals: u32,
    pub words: u32,
    pub value_bytes: usize,
    /// Per stored attribute, whether it goes to the side table.
    pub big: Vec<bool>,
    /// Total padded image size.
    pub size: usize,
}

/// Encoded primary image plus the attributes routed to the side table.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// `(adx, position in record.attrs)` of out-of-line attributes.
    pub side: Vec<(u32, usize)>,
}

fn word_count(len: usize) -> CodecResult<u32> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

/// Encoder and decoder bound to one interning table and policy.
pub struct RecordCodec<'a> {
    ads: &'a AdTable,
    policy: &'a MultivalPolicy,
    max_size: usize,
}

impl<'a> RecordCodec<'a> {
    pub fn new(ads: &'a AdTable, policy: &'a MultivalPolicy, max_size: usize) -> Self {
        Self { ads, policy, max_size }
    }

    /// Computes the image layout and enforces the size limit.
    ///
    /// Attributes without values are not stored.
    pub fn measure(&self, record: &Record) -> CodecResult<Layout> {
        let mut nattrs = 0usize;
        let mut nvals = 0usize;
        let mut words = 0usize;
        let mut value_bytes = 0usize;
        let mut big = Vec::with_capacity(record.attrs.len());

        for attr in record.attrs.iter().filter(|a| !a.is_empty()) {
            nattrs += 1;
            words += 2;
            let out_of_line = self.policy.is_big(attr);
            big.push(out_of_line);
            if out_of_line {
                continue;
            }
            nvals += attr.len() + 1;
            words += attr.len();
            value_bytes += attr.vals.iter().map(|v| v.len() + 1).sum::<usize>();
            if let Some(norm) = &attr.nvals {
                nvals += attr.len() + 1;
                words += attr.len();
                value_bytes += norm.iter().map(|v| v.len() + 1).sum::<usize>();
            }
            for v in attr.vals.iter().chain(attr.nvals.iter().flatten()) {
                word_count(v.len())?;
            }
        }

        let raw = HEADER_LEN + words * 4 + value_bytes;
        let size = raw.div_ceil(ALIGN) * ALIGN;
        if size > self.max_size {
            return Err(CodecError::TooLarge {
                size,
                max: self.max_size,
            });
        }
        Ok(Layout {
            nattrs: word_count(nattrs)?,
            nvals: word_count(nvals)?,
            words: word_count(words)?,
            value_bytes,
            big,
            size,
        })
    }

    /// Encodes `record`. Every stored attribute must already be interned.
    pub fn encode(&self, record: &Record) -> CodecResult<Encoded> {
        let layout = self.measure(record)?;
        let mut head = Vec::with_capacity(HEADER_LEN + layout.words as usize * 4);
        let mut values = Vec::with_capacity(layout.value_bytes);
        let mut side = Vec::new();

        head.extend_from_slice(&layout.nattrs.to_le_bytes());
        head.extend_from_slice(&layout.nvals.to_le_bytes());
        head.extend_from_slice(&record.oc_flags.bits().to_le_bytes());
        head.extend_from_slice(&layout.words.to_le_bytes());

        let stored = record.attrs.iter().enumerate().filter(|(_, a)| !a.is_empty());
        for ((pos, attr), &out_of_line) in stored.zip(&layout.big) {
            let adx = self
                .ads
                .index_of(attr.name())
                .ok_or_else(|| CodecError::NotInterned(attr.name().to_string()))?;
            let mut adx_word = adx;
            if attr.flags.contains(AttrFlags::SORTED) {
                adx_word |= HIGH_BIT;
            }
            if out_of_line {
                adx_word |= MV_BIT;
            }
            let mut count_word = attr.len() as u32;
            if attr.has_distinct_normalized() {
                count_word |= HIGH_BIT;
            }
            head.extend_from_slice(&adx_word.to_le_bytes());
            head.extend_from_slice(&count_word.to_le_bytes());

            if out_of_line {
                side.push((adx, pos));
                continue;
            }
            for v in attr.vals.iter().chain(attr.nvals.iter().flatten()) {
                head.extend_from_slice(&(v.len() as u32).to_le_bytes());
                values.extend_from_slice(v);
                values.push(0);
            }
        }

        let mut bytes = head;
        bytes.extend_from_slice(&values);
        bytes.resize(layout.size, 0);
        tracing::trace!(event = "RECORD_ENCODE", id = record.id, size = bytes.len(), side = side.len());
        Ok(Encoded { bytes, side })
    }

    /// Decodes a stored image back into a record.
    ///
    /// Side-table attributes are read through `txn`. An attribute index the
    /// table does not know triggers one reload of the table from `txn`.
    pub fn decode<T: ReadTxn + ?Sized>(
        &self,
        txn: &T,
        side: &SideTable,
        id: Id,
        dn: Dn,
        bytes: &[u8],
    ) -> CodecResult<Record> {
        let mut head = Reader::new(bytes);
        let mut word = |what: &str| head.u32().ok_or_else(|| CodecError::malformed(id, format!("truncated {what}")));
        let nattrs = word("header")?;
        let nvals = word("header")?;
        let oc_bits = word("header")?;
        let words = word("header")? as usize;

        let area_end = words
            .checked_mul(4)
            .and_then(|w| w.checked_add(HEADER_LEN))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| CodecError::malformed(id, format!("attribute area of {words} words overruns image")))?;
        let mut area = Reader::new(&bytes[HEADER_LEN..area_end]);
        let mut data = Reader::new(&bytes[area_end..]);

        let mut attrs = Vec::with_capacity((nattrs as usize).min(words / 2));
        let mut seen_vals = 0usize;
        let mut refreshed = false;

        for _ in 0..nattrs {
            let (Some(adx_word), Some(count_word)) = (area.u32(), area.u32()) else {
                return Err(CodecError::malformed(id, "truncated attribute header"));
            };
            let sorted = adx_word & HIGH_BIT != 0;
            let out_of_line = adx_word & MV_BIT != 0;
            let adx = adx_word & !(HIGH_BIT | MV_BIT);
            let distinct = count_word & HIGH_BIT != 0;
            let count = (count_word & !HIGH_BIT) as usize;

            let desc = match self.ads.resolve(adx) {
                Some(desc) => desc,
                None if !refreshed => {
                    refreshed = true;
                    tracing::warn!(event = "RECORD_AD_REFRESH", id, adx);
                    self.ads.refresh(txn)?;
                    self.ads.resolve(adx).ok_or(CodecError::UnknownAttribute { id, adx })?
                }
                None => return Err(CodecError::UnknownAttribute { id, adx }),
            };

            let mut flags = AttrFlags::empty();
            if sorted {
                flags |= AttrFlags::SORTED;
            }
            let (vals, nvals_out) = if out_of_line {
                flags |= AttrFlags::BIG_MULTI;
                side.read_values(txn, id, adx, count, distinct)?
            } else {
                seen_vals += count + 1;
                let vals = read_values(&mut area, &mut data, id, count)?;
                let norm = if distinct {
                    seen_vals += count + 1;
                    Some(read_values(&mut area, &mut data, id, count)?)
                } else {
                    None
                };
                (vals, norm)
            };

            let mut attr = Attribute::from_parts(desc, vals, nvals_out, flags);
            if attr.desc.sorted_values() && !sorted {
                attr.sort_values();
                attr.flags |= AttrFlags::SORTED_ON_READ;
            }
            attrs.push(attr);
        }

        if seen_vals != nvals as usize {
            return Err(CodecError::malformed(
                id,
                format!("header counts {nvals} value slots, found {seen_vals}"),
            ));
        }

        tracing::trace!(event = "RECORD_DECODE", id, attrs = attrs.len());
        Ok(Record {
            id,
            dn,
            attrs,
            oc_flags: ObjectClassFlags::from_bits_retain(oc_bits),
        })
    }
}

fn read_values(area: &mut Reader<'_>, data: &mut Reader<'_>, id: Id, count: usize) -> CodecResult<Vec<Vec<u8>>> {
    let mut lens = Vec::with_capacity(count.min(area.remaining() / 4));
    for _ in 0..count {
        let len = area
            .u32()
            .ok_or_else(|| CodecError::malformed(id, "truncated value lengths"))?;
        lens.push(len as usize);
    }
    let mut out = Vec::with_capacity(lens.len());
    for len in lens {
        let value = data
            .take(len)
            .ok_or_else(|| CodecError::malformed(id, "value overruns image"))?;
        if data.take(1) != Some(&[0][..]) {
            return Err(CodecError::malformed(id, "value is not NUL-terminated"));
        }
        out.push(value.to_vec());
    }
    Ok(out)
}

// Bounds-checked forward reader.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    fn u32(&mut self) -> Option<u32> {
        let raw = self.take(4)?;
        Some(u32::from_le_bytes(raw.try_into().ok()?))
    }
}
