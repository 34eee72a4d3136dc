//! Identifier lists
//!
//! An IDL is either an explicit ascending, duplicate-free vector of
//! identifiers or an inclusive range. Ranges stand in for sets too large to
//! enumerate; they are always a superset of the identifiers they replaced.
//!
//! An upper bound of [`NOID`] means "open": every identifier from `first`
//! on. Open ranges must be closed with [`Idl::resolve_upper`] before
//! iteration.

use std::cmp::{max, min};

/// Record identifier.
pub type Id = u64;

/// Sentinel "no identifier" / open upper bound.
pub const NOID: Id = u64::MAX;

/// log2 of the on-disk per-key list size.
pub const IDL_LOGN: u32 = 16;

/// Identifiers one index key may hold before it is rewritten as a range.
pub const IDL_DB_SIZE: usize = 1 << IDL_LOGN;

/// Identifiers an in-memory list may hold before it is widened to a range.
pub const IDL_UM_SIZE: usize = 1 << (IDL_LOGN + 1);

/// Outcome of [`Idl::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The identifier was added.
    Inserted,
    /// The identifier was already a member (or inside the range).
    Present,
    /// The list was full and has been widened to a range spanning its old
    /// bounds and the new identifier. The set now over-approximates.
    Overflow,
}

/// A sorted set of identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Idl {
    /// Explicit ascending identifiers.
    List(Vec<Id>),
    /// Every identifier in `first..=last`.
    Range { first: Id, last: Id },
}

impl Default for Idl {
    fn default() -> Self {
        Idl::empty()
    }
}

impl Idl {
    /// The empty set.
    pub fn empty() -> Self {
        Idl::List(Vec::new())
    }

    /// Every identifier the store could hold: `[1, NOID]`.
    pub fn all() -> Self {
        Idl::Range { first: 1, last: NOID }
    }

    /// A single identifier.
    pub fn singleton(id: Id) -> Self {
        Idl::List(vec![id])
    }

    /// Inclusive range; empty when `first > last`.
    pub fn range(first: Id, last: Id) -> Self {
        if first > last {
            Idl::empty()
        } else {
            Idl::Range { first, last }
        }
    }

    /// Builds a list from identifiers in any order, dropping duplicates.
    pub fn from_unsorted(mut ids: Vec<Id>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        if ids.len() > IDL_UM_SIZE {
            let first = ids[0];
            let last = ids[ids.len() - 1];
            return Idl::Range { first, last };
        }
        Idl::List(ids)
    }

    /// Returns true if no identifier is a member.
    pub fn is_empty(&self) -> bool {
        match self {
            Idl::List(ids) => ids.is_empty(),
            Idl::Range { first, last } => first > last,
        }
    }

    /// Returns true for the range form.
    pub fn is_range(&self) -> bool {
        matches!(self, Idl::Range { .. })
    }

    /// Returns true for a range with an open upper bound.
    pub fn is_open(&self) -> bool {
        matches!(self, Idl::Range { last, .. } if *last == NOID)
    }

    /// Number of identifiers covered.
    pub fn len(&self) -> u64 {
        match self {
            Idl::List(ids) => ids.len() as u64,
            Idl::Range { first, last } if first > last => 0,
            Idl::Range { first, last } => (last - first).saturating_add(1),
        }
    }

    /// Lowest member.
    pub fn first(&self) -> Option<Id> {
        match self {
            Idl::List(ids) => ids.first().copied(),
            Idl::Range { first, last } if first <= last => Some(*first),
            Idl::Range { .. } => None,
        }
    }

    /// Highest member.
    pub fn last(&self) -> Option<Id> {
        match self {
            Idl::List(ids) => ids.last().copied(),
            Idl::Range { first, last } if first <= last => Some(*last),
            Idl::Range { .. } => None,
        }
    }

    /// Smallest member strictly greater than `id`.
    ///
    /// Together with [`Idl::first`] this is a restartable cursor: the only
    /// state a caller keeps is the last identifier it saw.
    pub fn next_after(&self, id: Id) -> Option<Id> {
        match self {
            Idl::List(ids) => {
                let pos = ids.partition_point(|&x| x <= id);
                ids.get(pos).copied()
            }
            Idl::Range { first, last } => {
                if id < *first {
                    (first <= last).then_some(*first)
                } else if id < *last {
                    Some(id + 1)
                } else {
                    None
                }
            }
        }
    }

    /// Returns true if `id` is a member.
    pub fn contains(&self, id: Id) -> bool {
        match self {
            Idl::List(ids) => ids.binary_search(&id).is_ok(),
            Idl::Range { first, last } => *first <= id && id <= *last,
        }
    }

    /// Ascending iterator over the members.
    pub fn iter(&self) -> IdlIter<'_> {
        IdlIter {
            idl: self,
            cursor: None,
            done: false,
        }
    }

    /// Adds `id`, keeping order and uniqueness.
    pub fn insert(&mut self, id: Id) -> InsertOutcome {
        match self {
            Idl::Range { first, last } => {
                if id < *first {
                    *first = id;
                    InsertOutcome::Inserted
                } else if id > *last {
                    *last = id;
                    InsertOutcome::Inserted
                } else {
                    InsertOutcome::Present
                }
            }
            Idl::List(ids) => match ids.binary_search(&id) {
                Ok(_) => InsertOutcome::Present,
                Err(pos) => {
                    if ids.len() >= IDL_UM_SIZE {
                        let first = min(ids[0], id);
                        let last = max(ids[ids.len() - 1], id);
                        *self = Idl::Range { first, last };
                        return InsertOutcome::Overflow;
                    }
                    ids.insert(pos, id);
                    InsertOutcome::Inserted
                }
            },
        }
    }

    /// Removes `id`. Returns whether the set changed.
    ///
    /// Only a range's bounds can be removed; deleting from the inside of a
    /// range leaves it as is, since ranges already over-approximate.
    pub fn delete(&mut self, id: Id) -> bool {
        match self {
            Idl::List(ids) => match ids.binary_search(&id) {
                Ok(pos) => {
                    ids.remove(pos);
                    true
                }
                Err(_) => false,
            },
            Idl::Range { first, last } => {
                if *first == *last && id == *first {
                    *self = Idl::empty();
                    true
                } else if id == *first && *first < *last {
                    *first += 1;
                    true
                } else if id == *last && *first < *last {
                    *last -= 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Members of both `a` and `b`.
    ///
    /// Two ranges shrink to their overlap. A range that covers every member
    /// of an explicit list yields the list; otherwise the range is applied
    /// as a filter and the result is explicit.
    pub fn intersection(a: &Idl, b: &Idl) -> Idl {
        if a.is_empty() || b.is_empty() {
            return Idl::empty();
        }
        if let (Idl::Range { first: f1, last: l1 }, Idl::Range { first: f2, last: l2 }) = (a, b) {
            return Idl::range(max(*f1, *f2), min(*l1, *l2));
        }

        // Both non-empty, so first/last exist.
        let idmin = max(a.first().unwrap_or(0), b.first().unwrap_or(0));
        let idmax = min(a.last().unwrap_or(0), b.last().unwrap_or(0));
        if idmin > idmax {
            return Idl::empty();
        }
        if idmin == idmax {
            return if a.contains(idmin) && b.contains(idmin) {
                Idl::singleton(idmin)
            } else {
                Idl::empty()
            };
        }

        match (a, b) {
            (Idl::List(list), Idl::Range { first, last })
            | (Idl::Range { first, last }, Idl::List(list)) => {
                let covered = *first <= list[0] && *last >= list[list.len() - 1];
                if covered {
                    return Idl::List(list.clone());
                }
                Idl::List(
                    list.iter()
                        .copied()
                        .filter(|id| first <= id && id <= last)
                        .collect(),
                )
            }
            (Idl::List(x), Idl::List(y)) => Idl::List(intersect_sorted(x, y, idmin, idmax)),
            (Idl::Range { .. }, Idl::Range { .. }) => unreachable!("handled above"),
        }
    }

    /// Members of `a` or `b`.
    ///
    /// Any range operand, or a merged list past [`IDL_UM_SIZE`], yields a
    /// range spanning both operands.
    pub fn union(a: &Idl, b: &Idl) -> Idl {
        if b.is_empty() {
            return a.clone();
        }
        if a.is_empty() {
            return b.clone();
        }
        let span = || {
            let first = min(a.first().unwrap_or(NOID), b.first().unwrap_or(NOID));
            let last = max(a.last().unwrap_or(0), b.last().unwrap_or(0));
            Idl::Range { first, last }
        };
        match (a, b) {
            (Idl::List(x), Idl::List(y)) => {
                let merged = union_sorted(x, y);
                if merged.len() > IDL_UM_SIZE {
                    span()
                } else {
                    Idl::List(merged)
                }
            }
            _ => span(),
        }
    }

    /// In-place form of [`Idl::intersection`].
    pub fn intersect_with(&mut self, other: &Idl) {
        *self = Idl::intersection(self, other);
    }

    /// In-place form of [`Idl::union`].
    pub fn union_with(&mut self, other: &Idl) {
        *self = Idl::union(self, other);
    }

    /// Closes an open upper bound at `last`.
    ///
    /// Explicit lists and closed ranges are returned unchanged.
    pub fn resolve_upper(self, last: Id) -> Idl {
        match self {
            Idl::Range { first, last: NOID } => Idl::range(first, last),
            other => other,
        }
    }
}

fn intersect_sorted(x: &[Id], y: &[Id], idmin: Id, idmax: Id) -> Vec<Id> {
    let (small, large) = if x.len() <= y.len() { (x, y) } else { (y, x) };
    let start = small.partition_point(|&id| id < idmin);
    let mut out = Vec::with_capacity(small.len() - start);
    let mut from = 0;
    for &id in &small[start..] {
        if id > idmax {
            break;
        }
        match large[from..].binary_search(&id) {
            Ok(pos) => {
                out.push(id);
                from += pos + 1;
            }
            Err(pos) => from += pos,
        }
        if from >= large.len() {
            break;
        }
    }
    out
}

fn union_sorted(x: &[Id], y: &[Id]) -> Vec<Id> {
    let mut out = Vec::with_capacity(x.len() + y.len());
    let (mut i, mut j) = (0, 0);
    while i < x.len() && j < y.len() {
        if x[i] < y[j] {
            out.push(x[i]);
            i += 1;
        } else if x[i] > y[j] {
            out.push(y[j]);
            j += 1;
        } else {
            out.push(x[i]);
            i += 1;
            j += 1;
        }
    }
    out.extend_from_slice(&x[i..]);
    out.extend_from_slice(&y[j..]);
    out
}

impl FromIterator<Id> for Idl {
    fn from_iter<I: IntoIterator<Item = Id>>(iter: I) -> Self {
        Idl::from_unsorted(iter.into_iter().collect())
    }
}

/// Lazy ascending iterator over an [`Idl`].
pub struct IdlIter<'a> {
    idl: &'a Idl,
    cursor: Option<Id>,
    done: bool,
}

impl Iterator for IdlIter<'_> {
    type Item = Id;

    fn next(&mut self) -> Option<Id> {
        if self.done {
            return None;
        }
        let next = match self.cursor {
            None => self.idl.first(),
            Some(prev) => self.idl.next_after(prev),
        };
        match next {
            Some(id) => self.cursor = Some(id),
            None => self.done = true,
        }
        next
    }
}
