//! Index key layout
//!
//! All kinds of index for one attribute share its key space. A key is a
//! one-byte kind prefix followed by the matching rule's key bytes; the
//! presence key is the bare prefix.

use super::config::IndexMask;

pub const PRESENCE_KEY: &[u8] = b"+";

const PREFIX_EQUALITY: u8 = b'=';
const PREFIX_APPROX: u8 = b'~';
const PREFIX_SUBSTR: u8 = b'*';
pub(crate) const PREFIX_ORDERED: u8 = b'<';
const PREFIX_COMPONENT: u8 = b'#';

fn prefix(kind: IndexMask) -> Option<u8> {
    Some(if kind == IndexMask::EQUALITY {
        PREFIX_EQUALITY
    } else if kind == IndexMask::APPROX {
        PREFIX_APPROX
    } else if kind == IndexMask::SUBSTR {
        PREFIX_SUBSTR
    } else if kind == IndexMask::ORDERED {
        PREFIX_ORDERED
    } else if kind == IndexMask::COMPONENT {
        PREFIX_COMPONENT
    } else {
        return None;
    })
}

/// Storage key for a rule key of one kind.
///
/// `kind` must be a single kind other than presence.
pub fn storage_key(kind: IndexMask, key: &[u8]) -> Vec<u8> {
    if kind == IndexMask::PRESENT {
        return PRESENCE_KEY.to_vec();
    }
    let mut out = Vec::with_capacity(key.len() + 1);
    out.push(prefix(kind).unwrap_or(PREFIX_EQUALITY));
    out.extend_from_slice(key);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_keep_kinds_apart() {
        assert_eq!(storage_key(IndexMask::PRESENT, b"ignored"), b"+".to_vec());
        assert_eq!(storage_key(IndexMask::EQUALITY, b"k"), b"=k".to_vec());
        assert_eq!(storage_key(IndexMask::ORDERED, b"k"), b"<k".to_vec());
        assert_ne!(storage_key(IndexMask::SUBSTR, b"k"), storage_key(IndexMask::APPROX, b"k"));
    }
}
