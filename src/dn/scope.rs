//! Scoped traversal of the name tree
//!
//! A walk lists every child of a level before descending, and only descends
//! into children whose stored subtree size says they have descendants. The
//! walk state is one position per level, so it can be suspended between
//! calls and resumed from where it stopped.

use std::collections::HashMap;

use crate::idl::{id_to_key, Id, Idl};
use crate::kv::{ReadTxn, SpaceId};

use super::errors::{DnError, DnResult};
use super::node::DiskNode;
use super::tree::{NameIndex, ROOT_ID};

/// Breadth of a traversal relative to its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The base only
    Base,
    /// Immediate children of the base
    OneLevel,
    /// The base and all its descendants
    Subtree,
    /// All descendants, without the base
    Subordinate,
}

struct Level {
    key: [u8; 8],
    // Last node visited at this level; None before the first child.
    cursor: Option<Vec<u8>>,
    descending: bool,
}

impl Level {
    fn new(id: Id) -> Self {
        Self {
            key: id_to_key(id),
            cursor: None,
            descending: false,
        }
    }
}

fn next_child<T: ReadTxn + ?Sized>(txn: &T, space: SpaceId, level: &Level) -> DnResult<Option<(Vec<u8>, DiskNode)>> {
    let mut raw = match &level.cursor {
        None => txn.first_dup(space, &level.key)?,
        Some(after) => txn.next_dup(space, &level.key, after)?,
    };
    while let Some(bytes) = raw {
        let node = DiskNode::decode(&bytes).map_err(|r| DnError::corrupt(Id::from_be_bytes(level.key), r))?;
        if node.child {
            return Ok(Some((bytes, node)));
        }
        raw = txn.next_dup(space, &level.key, &bytes)?;
    }
    Ok(None)
}

/// Lazy iterator over the identifiers in a scope.
pub struct ScopeWalk<'t, T: ReadTxn + ?Sized> {
    txn: &'t T,
    space: SpaceId,
    scope: Scope,
    base: Id,
    started: bool,
    done: bool,
    stack: Vec<Level>,
}

impl<'t, T: ReadTxn + ?Sized> ScopeWalk<'t, T> {
    fn new(txn: &'t T, space: SpaceId, base: Id, scope: Scope) -> Self {
        Self {
            txn,
            space,
            scope,
            base,
            started: false,
            done: false,
            stack: Vec::new(),
        }
    }

    /// Number of levels currently open.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl<T: ReadTxn + ?Sized> Iterator for ScopeWalk<'_, T> {
    type Item = DnResult<Id>;

    fn next(&mut self) -> Option<DnResult<Id>> {
        loop {
            if self.done {
                return None;
            }
            if !self.started {
                self.started = true;
                match self.scope {
                    Scope::Base => {
                        self.done = true;
                        return Some(Ok(self.base));
                    }
                    Scope::Subtree => {
                        self.stack.push(Level::new(self.base));
                        return Some(Ok(self.base));
                    }
                    Scope::OneLevel | Scope::Subordinate => {
                        self.stack.push(Level::new(self.base));
                        continue;
                    }
                }
            }

            let txn = self.txn;
            let space = self.space;
            let one_level = self.scope == Scope::OneLevel;
            let Some(level) = self.stack.last_mut() else {
                self.done = true;
                return None;
            };
            match next_child(txn, space, level) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(None) => {
                    if !level.descending && !one_level {
                        // Every child listed; second pass pushes down.
                        level.descending = true;
                        level.cursor = None;
                    } else {
                        self.stack.pop();
                    }
                }
                Ok(Some((bytes, node))) => {
                    level.cursor = Some(bytes);
                    if !level.descending {
                        return Some(Ok(node.id));
                    }
                    if node.nsubs >= 2 {
                        self.stack.push(Level::new(node.id));
                    }
                }
            }
        }
    }
}

impl NameIndex {
    /// Walks `scope` around `base`.
    pub fn walk<'t, T: ReadTxn + ?Sized>(&self, txn: &'t T, base: Id, scope: Scope) -> ScopeWalk<'t, T> {
        tracing::trace!(event = "DN_WALK", base, scope = ?scope);
        ScopeWalk::new(txn, self.space(), base, scope)
    }

    /// Every identifier in `scope` around `base`.
    pub fn scope_ids<T: ReadTxn + ?Sized>(&self, txn: &T, base: Id, scope: Scope) -> DnResult<Idl> {
        let ids = self.walk(txn, base, scope).collect::<DnResult<Vec<Id>>>()?;
        Ok(Idl::from_unsorted(ids))
    }

    /// Keeps the candidates that fall in `scope` around `base`.
    ///
    /// Each candidate's parent chain is walked once; chains already seen in
    /// this call are answered from a memo. Candidates with no tree entry
    /// are dropped.
    pub fn classify<T: ReadTxn + ?Sized>(&self, txn: &T, candidates: &Idl, base: Id, scope: Scope) -> DnResult<Idl> {
        if candidates.is_open() {
            return self.scope_ids(txn, base, scope);
        }
        if scope == Scope::Base {
            return Ok(if candidates.contains(base) {
                Idl::singleton(base)
            } else {
                Idl::empty()
            });
        }

        let mut memo: HashMap<Id, bool> = HashMap::new();
        memo.insert(base, true);
        memo.insert(ROOT_ID, false);
        let mut kept = Vec::new();
        for id in candidates.iter() {
            let keep = match scope {
                Scope::OneLevel => id != base && self.parent_or_none(txn, id)? == Some(base),
                Scope::Subtree => self.within(txn, id, &mut memo)?,
                Scope::Subordinate => id != base && self.within(txn, id, &mut memo)?,
                Scope::Base => unreachable!("handled above"),
            };
            if keep {
                kept.push(id);
            }
        }
        tracing::trace!(event = "DN_CLASSIFY", base, scope = ?scope, candidates = candidates.len(), kept = kept.len());
        Ok(Idl::List(kept))
    }

    fn parent_or_none<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> DnResult<Option<Id>> {
        match self.parent(txn, id) {
            Ok(parent) => Ok(Some(parent)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn within<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id, memo: &mut HashMap<Id, bool>) -> DnResult<bool> {
        let mut path = Vec::new();
        let mut cur = id;
        let verdict = loop {
            if let Some(&known) = memo.get(&cur) {
                break known;
            }
            if path.len() > u16::MAX as usize {
                return Err(DnError::corrupt(id, "parent chain does not end"));
            }
            path.push(cur);
            match self.parent_or_none(txn, cur)? {
                Some(parent) => cur = parent,
                None => break false,
            }
        };
        for seen in path {
            memo.insert(seen, verdict);
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;
    use crate::kv::{Environment, MemEnv};
    use crate::kv::WriteTxn;

    // dc=example,dc=com (1)
    //   ou=people (2)
    //     cn=a (3)
    //       cn=deep (6)
    //     cn=b (4)
    //   ou=groups (5)
    fn setup() -> (MemEnv, NameIndex) {
        let env = MemEnv::new();
        let index = NameIndex::open(&env, Dn::parse("dc=example,dc=com").unwrap()).unwrap();
        let mut txn = env.begin_write().unwrap();
        for (parent, id, name) in [
            (ROOT_ID, 1, "dc=example,dc=com"),
            (1, 2, "ou=people,dc=example,dc=com"),
            (2, 3, "cn=a,ou=people,dc=example,dc=com"),
            (2, 4, "cn=b,ou=people,dc=example,dc=com"),
            (1, 5, "ou=groups,dc=example,dc=com"),
            (3, 6, "cn=deep,cn=a,ou=people,dc=example,dc=com"),
        ] {
            index.add(&mut txn, parent, id, &Dn::parse(name).unwrap(), 1).unwrap();
        }
        txn.commit().unwrap();
        (env, index)
    }

    fn collect<T: ReadTxn>(index: &NameIndex, txn: &T, base: Id, scope: Scope) -> Vec<Id> {
        index.walk(txn, base, scope).map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_base_and_one_level() {
        let (env, index) = setup();
        let txn = env.begin_read().unwrap();
        assert_eq!(collect(&index, &txn, 2, Scope::Base), vec![2]);
        let mut kids = collect(&index, &txn, 2, Scope::OneLevel);
        kids.sort();
        assert_eq!(kids, vec![3, 4]);
        assert!(collect(&index, &txn, 4, Scope::OneLevel).is_empty());
    }

    #[test]
    fn test_subtree_lists_level_before_descending() {
        let (env, index) = setup();
        let txn = env.begin_read().unwrap();
        let ids = collect(&index, &txn, 1, Scope::Subtree);
        assert_eq!(ids[0], 1);
        let mut first_level = ids[1..3].to_vec();
        first_level.sort();
        assert_eq!(first_level, vec![2, 5]);
        let mut all = ids.clone();
        all.sort();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_subordinate_excludes_base() {
        let (env, index) = setup();
        let txn = env.begin_read().unwrap();
        assert_eq!(index.scope_ids(&txn, 2, Scope::Subordinate).unwrap(), Idl::List(vec![3, 4, 6]));
        assert_eq!(index.scope_ids(&txn, 2, Scope::Subtree).unwrap(), Idl::List(vec![2, 3, 4, 6]));
    }

    #[test]
    fn test_classify_matches_walk() {
        let (env, index) = setup();
        let txn = env.begin_read().unwrap();
        let candidates = Idl::List(vec![1, 3, 5, 6, 42]);
        assert_eq!(index.classify(&txn, &candidates, 2, Scope::Subtree).unwrap(), Idl::List(vec![3, 6]));
        assert_eq!(index.classify(&txn, &candidates, 3, Scope::Subordinate).unwrap(), Idl::List(vec![6]));
        assert_eq!(index.classify(&txn, &candidates, 1, Scope::OneLevel).unwrap(), Idl::List(vec![5]));
        assert_eq!(index.classify(&txn, &candidates, 5, Scope::Base).unwrap(), Idl::List(vec![5]));
        assert_eq!(
            index.classify(&txn, &Idl::all(), 2, Scope::Subtree).unwrap(),
            Idl::List(vec![2, 3, 4, 6])
        );
    }
}
