//! Name index
//!
//! Maps distinguished names to record identifiers through parent/child
//! adjacency. Keys are 8-byte big-endian identifiers; identifier 0 is the
//! pseudo-root above the suffix. The suffix is stored as a single component
//! under key 0, whatever its number of relative names.
//!
//! Subtree sizes live in child entries only. Every insert or delete walks
//! from the parent to the pseudo-root adjusting them, inside the caller's
//! write transaction.

use std::sync::Arc;

use crate::idl::{id_to_key, Id, Idl};
use crate::kv::{Environment, PutFlags, ReadTxn, SpaceId, SpaceOptions, WriteTxn};

use super::errors::{DnError, DnResult};
use super::name::Dn;
use super::node::{DiskNode, NodeOrder, MAX_NRDN_LEN};

/// Key space holding the tree.
pub const NAME_INDEX_SPACE: &str = "dn2id";

/// Identifier of the pseudo-root.
pub const ROOT_ID: Id = 0;

/// Result of a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnMatch {
    /// The entry exists.
    Exact { id: Id, nsubs: u64 },
    /// Only an ancestor exists. `matched` is the deepest existing DN, `id`
    /// its identifier and `chain` the identifiers walked from the suffix.
    Closest { matched: Dn, id: Id, chain: Vec<Id> },
}

/// One matched step of a downward walk.
#[derive(Debug, Clone, Copy)]
struct Step {
    id: Id,
    nsubs: u64,
}

/// The tree index over one suffix.
#[derive(Debug, Clone)]
pub struct NameIndex {
    space: SpaceId,
    suffix: Dn,
}

impl NameIndex {
    /// Opens the tree space for `suffix`.
    pub fn open<E: Environment>(env: &E, suffix: Dn) -> DnResult<Self> {
        let space = env.open_space(NAME_INDEX_SPACE, SpaceOptions::dup_sorted_by(Arc::new(NodeOrder)))?;
        Ok(Self { space, suffix })
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn suffix(&self) -> &Dn {
        &self.suffix
    }

    /// Components of `dn` from the suffix down, as (normalized, original).
    fn components<'d>(&self, dn: &'d Dn) -> DnResult<Vec<(&'d str, &'d str)>> {
        if !dn.is_within(&self.suffix) {
            return Err(DnError::NotFound(dn.name().to_string()));
        }
        let below = dn.len() - self.suffix.len();
        let mut comps = Vec::with_capacity(below + 1);
        comps.push((
            // The suffix part of `dn`, kept as one component.
            &dn.nname()[dn.nname().len() - self.suffix.nname().len()..],
            &dn.name()[dn.name().len() - self.suffix_name_len(dn)..],
        ));
        for i in (0..below).rev() {
            comps.push((dn.nrdns()[i].as_str(), dn.rdns()[i].as_str()));
        }
        Ok(comps)
    }

    // Byte length of the suffix portion of `dn`'s original-case name.
    fn suffix_name_len(&self, dn: &Dn) -> usize {
        let rdns = &dn.rdns()[dn.len() - self.suffix.len()..];
        rdns.iter().map(String::len).sum::<usize>() + rdns.len().saturating_sub(1)
    }

    fn child_entry<T: ReadTxn + ?Sized>(&self, txn: &T, parent: Id, nrdn: &[u8]) -> DnResult<Option<DiskNode>> {
        let probe = DiskNode::probe(nrdn, true);
        match txn.get_both(self.space, &id_to_key(parent), &probe)? {
            Some(bytes) => Ok(Some(DiskNode::decode(&bytes).map_err(|r| DnError::corrupt(parent, r))?)),
            None => Ok(None),
        }
    }

    fn self_entry<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> DnResult<DiskNode> {
        let bytes = txn
            .first_dup(self.space, &id_to_key(id))?
            .ok_or_else(|| DnError::NotFound(format!("id {id}")))?;
        let node = DiskNode::decode(&bytes).map_err(|r| DnError::corrupt(id, r))?;
        if node.child {
            // Only children are left under this key; the record is gone.
            return Err(DnError::NotFound(format!("id {id}")));
        }
        Ok(node)
    }

    fn walk_down<T: ReadTxn + ?Sized>(&self, txn: &T, comps: &[(&str, &str)]) -> DnResult<Vec<Step>> {
        let mut steps = Vec::with_capacity(comps.len());
        let mut parent = ROOT_ID;
        for (nrdn, _) in comps {
            match self.child_entry(txn, parent, nrdn.as_bytes())? {
                Some(node) => {
                    steps.push(Step {
                        id: node.id,
                        nsubs: node.nsubs,
                    });
                    parent = node.id;
                }
                None => break,
            }
        }
        Ok(steps)
    }

    /// Finds the identifier for `dn`.
    ///
    /// With `closest`, a partial match returns the deepest existing
    /// ancestor instead of failing. A DN outside the suffix, or one whose
    /// suffix is not stored, is never a partial match.
    pub fn lookup<T: ReadTxn + ?Sized>(&self, txn: &T, dn: &Dn, closest: bool) -> DnResult<DnMatch> {
        let comps = self.components(dn)?;
        let steps = self.walk_down(txn, &comps)?;
        tracing::trace!(event = "DN_LOOKUP", dn = dn.nname(), matched = steps.len(), depth = comps.len());

        if steps.len() == comps.len() {
            let last = steps[steps.len() - 1];
            return Ok(DnMatch::Exact {
                id: last.id,
                nsubs: last.nsubs,
            });
        }
        if !closest || steps.is_empty() {
            return Err(DnError::NotFound(dn.name().to_string()));
        }
        let matched_rdns = self.suffix.len() + steps.len() - 1;
        let chain: Vec<Id> = steps.iter().map(|s| s.id).collect();
        Ok(DnMatch::Closest {
            matched: dn.tail(matched_rdns),
            id: chain[chain.len() - 1],
            chain,
        })
    }

    /// Identifier of `dn`, or NotFound.
    pub fn id_of<T: ReadTxn + ?Sized>(&self, txn: &T, dn: &Dn) -> DnResult<Id> {
        match self.lookup(txn, dn, false)? {
            DnMatch::Exact { id, .. } => Ok(id),
            DnMatch::Closest { .. } => Err(DnError::NotFound(dn.name().to_string())),
        }
    }

    /// Adds `dn` as `id` under `parent` with subtree size `nsubs`.
    ///
    /// `nsubs` is 1 for a new leaf, or the size of a subtree being moved.
    pub fn add<T: WriteTxn + ?Sized>(&self, txn: &mut T, parent: Id, id: Id, dn: &Dn, nsubs: u64) -> DnResult<()> {
        let (nrdn, rdn) = if parent == ROOT_ID {
            (dn.nname(), dn.name())
        } else {
            match (dn.nrdn(), dn.rdn()) {
                (Some(n), Some(r)) => (n, r),
                _ => return Err(DnError::invalid(dn.name(), "root DN cannot be added")),
            }
        };
        if nrdn.len() > MAX_NRDN_LEN {
            return Err(DnError::invalid(dn.name(), "relative name too long"));
        }

        let root_key = id_to_key(ROOT_ID);
        if parent == ROOT_ID && txn.first_dup(self.space, &root_key)?.is_none() {
            let placeholder = DiskNode::self_entry(b"", b"", ROOT_ID).encode();
            txn.put(self.space, &root_key, &placeholder, PutFlags::empty())?;
        }

        let child = DiskNode::child(nrdn.as_bytes(), rdn.as_bytes(), id, nsubs).encode();
        match txn.put(self.space, &id_to_key(parent), &child, PutFlags::NO_DUP_DATA) {
            Ok(()) => {}
            Err(e) if e.is_key_exist() => return Err(DnError::Conflict(dn.name().to_string())),
            Err(e) => return Err(e.into()),
        }

        let own = DiskNode::self_entry(nrdn.as_bytes(), rdn.as_bytes(), parent).encode();
        match txn.put(self.space, &id_to_key(id), &own, PutFlags::NO_DUP_DATA) {
            Ok(()) => {}
            Err(e) if e.is_key_exist() => return Err(DnError::Conflict(format!("id {id}"))),
            Err(e) => return Err(e.into()),
        }

        self.adjust_ancestors(txn, parent, nsubs as i64)?;
        tracing::debug!(event = "DN_ADD", dn = dn.nname(), id, parent, nsubs);
        Ok(())
    }

    /// Removes `id` from the tree and subtracts `nsubs` from its ancestors.
    ///
    /// Child entries under `id` are left in place.
    pub fn delete<T: WriteTxn + ?Sized>(&self, txn: &mut T, id: Id, nsubs: u64) -> DnResult<()> {
        let own = self.self_entry(&*txn, id)?;
        let parent = own.id;

        txn.del_dup(self.space, &id_to_key(id), &DiskNode::probe(&own.nrdn, false))?;
        let removed = txn.del_dup(self.space, &id_to_key(parent), &DiskNode::probe(&own.nrdn, true))?;
        if !removed {
            return Err(DnError::corrupt(id, format!("no child entry under parent {parent}")));
        }

        self.adjust_ancestors(txn, parent, -(nsubs as i64))?;
        tracing::debug!(event = "DN_DELETE", id, parent, nsubs);
        Ok(())
    }

    fn adjust_ancestors<T: WriteTxn + ?Sized>(&self, txn: &mut T, from: Id, delta: i64) -> DnResult<()> {
        let mut id = from;
        while id != ROOT_ID {
            let own = self.self_entry(&*txn, id)?;
            let parent = own.id;
            let mut entry = self
                .child_entry(&*txn, parent, &own.nrdn)?
                .ok_or_else(|| DnError::corrupt(id, format!("no child entry under parent {parent}")))?;
            entry.nsubs = entry
                .nsubs
                .checked_add_signed(delta)
                .ok_or_else(|| DnError::corrupt(id, format!("subtree size {} underflows", entry.nsubs)))?;
            let probe = DiskNode::probe(&own.nrdn, true);
            txn.replace_dup(self.space, &id_to_key(parent), &probe, &entry.encode())?;
            id = parent;
        }
        Ok(())
    }

    /// Parent identifier of `id`.
    pub fn parent<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> DnResult<Id> {
        Ok(self.self_entry(txn, id)?.id)
    }

    /// True if any child entry is stored under `id`.
    pub fn has_children<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> DnResult<bool> {
        let key = id_to_key(id);
        match txn.first_dup(self.space, &key)? {
            None => Ok(false),
            Some(first) => {
                let own_is_first = first.first().is_some_and(|b| b & 0x80 == 0);
                let count = txn.dup_count(self.space, &key)?;
                Ok(if own_is_first { count > 1 } else { count > 0 })
            }
        }
    }

    /// Stored subtree size of `id`. For the pseudo-root, the number of
    /// records in the tree.
    pub fn subtree_size<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> DnResult<u64> {
        if id == ROOT_ID {
            return self.children(txn, ROOT_ID).map(|c| c.iter().map(|n| n.nsubs).sum());
        }
        let own = self.self_entry(txn, id)?;
        let entry = self
            .child_entry(txn, own.id, &own.nrdn)?
            .ok_or_else(|| DnError::corrupt(id, "no child entry under parent"))?;
        Ok(entry.nsubs)
    }

    /// Child entries stored under `id`, in tree order.
    pub fn children<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> DnResult<Vec<DiskNode>> {
        txn.dups(self.space, &id_to_key(id))?
            .iter()
            .map(|bytes| DiskNode::decode(bytes).map_err(|r| DnError::corrupt(id, r)))
            .filter(|node| !matches!(node, Ok(n) if !n.child))
            .collect()
    }

    /// Rebuilds the DN of `id` from self entries.
    pub fn id_to_name<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> DnResult<Dn> {
        let mut rdns = Vec::new();
        let mut cur = id;
        while cur != ROOT_ID {
            let own = self.self_entry(txn, cur)?;
            let rdn = String::from_utf8(own.rdn).map_err(|_| DnError::corrupt(cur, "name is not UTF-8"))?;
            rdns.push(rdn);
            if rdns.len() > u16::MAX as usize {
                return Err(DnError::corrupt(id, "parent chain does not end"));
            }
            cur = own.id;
        }
        Dn::parse(&rdns.join(","))
    }

    /// Identifiers of the existing strict ancestors of `dn`.
    pub fn superiors<T: ReadTxn + ?Sized>(&self, txn: &T, dn: &Dn) -> DnResult<Idl> {
        let comps = match self.components(dn) {
            Ok(comps) => comps,
            Err(DnError::NotFound(_)) => return Ok(Idl::empty()),
            Err(e) => return Err(e),
        };
        let mut steps = self.walk_down(txn, &comps)?;
        if steps.len() == comps.len() {
            steps.pop();
        }
        Ok(Idl::from_unsorted(steps.iter().map(|s| s.id).collect()))
    }

    /// Verifies that `id`'s two nodes agree and that its subtree size is
    /// one more than the sum of its children's. Returns the subtree size.
    pub fn check_node<T: ReadTxn + ?Sized>(&self, txn: &T, id: Id) -> DnResult<u64> {
        let own = self.self_entry(txn, id)?;
        let entry = self
            .child_entry(txn, own.id, &own.nrdn)?
            .ok_or_else(|| DnError::corrupt(id, format!("no child entry under parent {}", own.id)))?;
        if entry.id != id {
            return Err(DnError::corrupt(id, format!("child entry names id {}", entry.id)));
        }
        if entry.rdn != own.rdn {
            return Err(DnError::corrupt(id, "child and self entries disagree on name"));
        }
        let below: u64 = self.children(txn, id)?.iter().map(|c| c.nsubs).sum();
        if entry.nsubs != below + 1 {
            return Err(DnError::corrupt(
                id,
                format!("subtree size {} but children sum to {below}", entry.nsubs),
            ));
        }
        Ok(entry.nsubs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemEnv;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn setup() -> (MemEnv, NameIndex) {
        let env = MemEnv::new();
        let index = NameIndex::open(&env, dn("dc=example,dc=com")).unwrap();
        (env, index)
    }

    fn populate(env: &MemEnv, index: &NameIndex) {
        let mut txn = env.begin_write().unwrap();
        index.add(&mut txn, ROOT_ID, 1, &dn("dc=example,dc=com"), 1).unwrap();
        index.add(&mut txn, 1, 2, &dn("ou=people,dc=example,dc=com"), 1).unwrap();
        index.add(&mut txn, 2, 3, &dn("cn=a,ou=people,dc=example,dc=com"), 1).unwrap();
        index.add(&mut txn, 2, 4, &dn("cn=b,ou=people,dc=example,dc=com"), 1).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn test_lookup_exact_and_sizes() {
        let (env, index) = setup();
        populate(&env, &index);
        let txn = env.begin_read().unwrap();
        assert_eq!(
            index.lookup(&txn, &dn("DC=Example,DC=com"), false).unwrap(),
            DnMatch::Exact { id: 1, nsubs: 4 }
        );
        assert_eq!(index.id_of(&txn, &dn("cn=B,ou=People,dc=example,dc=com")).unwrap(), 4);
        assert_eq!(index.subtree_size(&txn, 2).unwrap(), 3);
        assert_eq!(index.subtree_size(&txn, ROOT_ID).unwrap(), 4);
    }

    #[test]
    fn test_lookup_closest() {
        let (env, index) = setup();
        populate(&env, &index);
        let txn = env.begin_read().unwrap();
        let target = dn("cn=x,cn=a,ou=people,dc=example,dc=com");
        match index.lookup(&txn, &target, true).unwrap() {
            DnMatch::Closest { matched, id, chain } => {
                assert_eq!(matched.nname(), "cn=a,ou=people,dc=example,dc=com");
                assert_eq!(id, 3);
                assert_eq!(chain, vec![1, 2, 3]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(index.lookup(&txn, &target, false).unwrap_err().is_not_found());
        assert!(index.lookup(&txn, &dn("dc=other,dc=org"), true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_duplicate_name_conflicts() {
        let (env, index) = setup();
        populate(&env, &index);
        let mut txn = env.begin_write().unwrap();
        let err = index
            .add(&mut txn, 2, 9, &dn("CN=A,ou=people,dc=example,dc=com"), 1)
            .unwrap_err();
        assert!(matches!(err, DnError::Conflict(_)));
    }

    #[test]
    fn test_delete_restores_sizes() {
        let (env, index) = setup();
        populate(&env, &index);
        let mut txn = env.begin_write().unwrap();
        index.delete(&mut txn, 3, 1).unwrap();
        assert_eq!(index.subtree_size(&txn, 1).unwrap(), 3);
        assert!(index.id_of(&txn, &dn("cn=a,ou=people,dc=example,dc=com")).is_err());
        index.delete(&mut txn, 4, 1).unwrap();
        assert!(!index.has_children(&txn, 2).unwrap());
        assert_eq!(index.check_node(&txn, 1).unwrap(), 2);
        assert_eq!(index.check_node(&txn, 2).unwrap(), 1);
    }

    #[test]
    fn test_parent_name_and_superiors() {
        let (env, index) = setup();
        populate(&env, &index);
        let txn = env.begin_read().unwrap();
        assert_eq!(index.parent(&txn, 3).unwrap(), 2);
        assert_eq!(index.parent(&txn, 1).unwrap(), ROOT_ID);
        assert_eq!(index.id_to_name(&txn, 4).unwrap().nname(), "cn=b,ou=people,dc=example,dc=com");
        assert!(index.has_children(&txn, 2).unwrap());
        assert!(!index.has_children(&txn, 3).unwrap());

        let sups = index.superiors(&txn, &dn("cn=a,ou=people,dc=example,dc=com")).unwrap();
        assert_eq!(sups, Idl::List(vec![1, 2]));
        let sups = index.superiors(&txn, &dn("cn=zz,cn=a,ou=people,dc=example,dc=com")).unwrap();
        assert_eq!(sups, Idl::List(vec![1, 2, 3]));
    }

    #[test]
    fn test_check_node_detects_bad_size() {
        let (env, index) = setup();
        populate(&env, &index);
        let mut txn = env.begin_write().unwrap();
        // Skew the stored size of ou=people without touching its children.
        let bad = DiskNode::child(b"ou=people", b"ou=people", 2, 7).encode();
        txn.replace_dup(index.space(), &id_to_key(1), &DiskNode::probe(b"ou=people", true), &bad)
            .unwrap();
        assert!(matches!(index.check_node(&txn, 2), Err(DnError::Corrupt { .. })));
    }
}
