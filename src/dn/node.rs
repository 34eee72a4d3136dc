//! Tree node layout
//!
//! Every record has two nodes in the tree space:
//!
//! - a child entry, stored under the parent's key, naming the record and
//!   carrying its identifier and subtree size
//! - a self entry, stored under the record's own key, naming the record and
//!   carrying the parent's identifier
//!
//! ```text
//! +----------+-------+-----+-----+-----+----------+-------------+
//! | len (BE) | nrdn  | NUL | rdn | NUL | id (LE)  | nsubs (LE)  |
//! | 2 bytes  | n     | 1   | r   | 1   | 8        | 8, children |
//! +----------+-------+-----+-----+-----+----------+-------------+
//! ```
//!
//! The high bit of the length marks a child entry. Duplicates under one key
//! sort by the two length bytes, then by the normalized name, so a key's
//! self entry (high bit clear) always comes first.

use std::cmp::{min, Ordering};

use crate::idl::Id;
use crate::kv::DupOrder;

const CHILD_FLAG: u8 = 0x80;

/// Longest normalized RDN a node can carry.
pub const MAX_NRDN_LEN: usize = 0x7fff;

const ID_LEN: usize = 8;

/// A decoded tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskNode {
    /// Child entry (under the parent) rather than self entry.
    pub child: bool,
    pub nrdn: Vec<u8>,
    pub rdn: Vec<u8>,
    /// Child id in child entries, parent id in self entries.
    pub id: Id,
    /// Subtree size; always 0 in self entries.
    pub nsubs: u64,
}

impl DiskNode {
    pub fn child(nrdn: &[u8], rdn: &[u8], id: Id, nsubs: u64) -> Self {
        Self {
            child: true,
            nrdn: nrdn.to_vec(),
            rdn: rdn.to_vec(),
            id,
            nsubs,
        }
    }

    pub fn self_entry(nrdn: &[u8], rdn: &[u8], parent: Id) -> Self {
        Self {
            child: false,
            nrdn: nrdn.to_vec(),
            rdn: rdn.to_vec(),
            id: parent,
            nsubs: 0,
        }
    }

    /// Serialized form. The caller checks `nrdn` against [`MAX_NRDN_LEN`].
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = header(&self.nrdn, self.child);
        buf.reserve(self.rdn.len() + 2 + 2 * ID_LEN);
        buf.extend_from_slice(&self.nrdn);
        buf.push(0);
        buf.extend_from_slice(&self.rdn);
        buf.push(0);
        buf.extend_from_slice(&self.id.to_le_bytes());
        if self.child {
            buf.extend_from_slice(&self.nsubs.to_le_bytes());
        }
        buf
    }

    /// Parses a node. The error names what was wrong with it.
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < 2 {
            return Err(format!("node of {} bytes", bytes.len()));
        }
        let child = bytes[0] & CHILD_FLAG != 0;
        let n = nrdn_len(bytes);
        let tail = if child { 2 * ID_LEN } else { ID_LEN };
        // header, nrdn, NUL, rdn, NUL, tail
        let fixed = 2 + n + 1 + 1 + tail;
        if bytes.len() < fixed {
            return Err(format!("node of {} bytes, need at least {fixed}", bytes.len()));
        }
        let r = bytes.len() - fixed;
        let rdn_start = 2 + n + 1;
        let rdn_end = rdn_start + r;
        if bytes[2 + n] != 0 || bytes[rdn_end] != 0 {
            return Err("missing name terminator".into());
        }
        let read_u64 = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + ID_LEN]);
            u64::from_le_bytes(raw)
        };
        let id = read_u64(rdn_end + 1);
        let nsubs = if child { read_u64(rdn_end + 1 + ID_LEN) } else { 0 };
        Ok(Self {
            child,
            nrdn: bytes[2..2 + n].to_vec(),
            rdn: bytes[rdn_start..rdn_end].to_vec(),
            id,
            nsubs,
        })
    }

    /// Lookup probe matching any node with this name and kind.
    pub fn probe(nrdn: &[u8], child: bool) -> Vec<u8> {
        let mut buf = header(nrdn, child);
        buf.extend_from_slice(nrdn);
        buf
    }
}

fn header(nrdn: &[u8], child: bool) -> Vec<u8> {
    let len = min(nrdn.len(), MAX_NRDN_LEN) as u16;
    let mut buf = Vec::with_capacity(2 + nrdn.len());
    let [hi, lo] = len.to_be_bytes();
    buf.push(if child { hi | CHILD_FLAG } else { hi });
    buf.push(lo);
    buf
}

fn nrdn_len(bytes: &[u8]) -> usize {
    (((bytes[0] & !CHILD_FLAG) as usize) << 8) | bytes[1] as usize
}

/// Duplicate order for the tree space: length bytes, then normalized name.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeOrder;

impl DupOrder for NodeOrder {
    fn compare(&self, _key: &[u8], a: &[u8], b: &[u8]) -> Ordering {
        if a.len() < 2 || b.len() < 2 {
            return a.cmp(b);
        }
        a[0].cmp(&b[0]).then(a[1].cmp(&b[1])).then_with(|| {
            let n = nrdn_len(a);
            let ea = min(a.len(), 2 + n);
            let eb = min(b.len(), 2 + n);
            a[2..ea].cmp(&b[2..eb])
        })
    }
}
