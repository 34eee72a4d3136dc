//! Name Index Tests
//!
//! Tests for tree invariants:
//! - Every inserted name resolves to its identifier, deleted names do not
//! - Subtree sizes track inserts and deletes exactly
//! - Scoped enumeration returns exactly the transitive closure

mod common;

use std::collections::BTreeSet;

use common::{dn, insert, insert_suffix, open_store, SUFFIX};
use dirstore::{DnMatch, Environment, Id, Scope, ROOT_ID};

// =============================================================================
// Helper Functions
// =============================================================================

fn exact(store: &dirstore::Store<dirstore::MemEnv>, name: &str) -> Option<Id> {
    let txn = store.env().begin_read().unwrap();
    match store.dn_to_id(&txn, &dn(name), false) {
        Ok(DnMatch::Exact { id, .. }) => Some(id),
        Ok(DnMatch::Closest { .. }) => None,
        Err(e) if e.is_not_found() => None,
        Err(e) => panic!("lookup failed: {e}"),
    }
}

fn subtree_size(store: &dirstore::Store<dirstore::MemEnv>, id: Id) -> u64 {
    let txn = store.env().begin_read().unwrap();
    store.names().subtree_size(&txn, id).unwrap()
}

// =============================================================================
// Concrete Scenario
// =============================================================================

/// Four records: one-level scope and suffix subtree size.
#[test]
fn test_people_scenario() {
    let store = open_store();
    let top = insert_suffix(&store);
    let people = insert(&store, top, "ou=people,dc=example,dc=com", &[]).unwrap();
    let a = insert(&store, people, "cn=a,ou=people,dc=example,dc=com", &[]).unwrap();
    let b = insert(&store, people, "cn=b,ou=people,dc=example,dc=com", &[]).unwrap();

    let txn = store.env().begin_read().unwrap();
    let one = store
        .scope_enumerate(&txn, people, Scope::OneLevel)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(one, vec![a, b]);
    assert_eq!(store.names().subtree_size(&txn, top).unwrap(), 4);
    assert_eq!(store.check_tree(&txn).unwrap(), 4);
}

/// Lookup is case-insensitive and reports the closest ancestor on a miss.
#[test]
fn test_lookup_exact_and_closest() {
    let store = open_store();
    let top = insert_suffix(&store);
    let people = insert(&store, top, "ou=People,dc=example,dc=com", &[]).unwrap();

    assert_eq!(exact(&store, "OU=people,DC=Example,dc=com"), Some(people));

    let txn = store.env().begin_read().unwrap();
    match store
        .dn_to_id(&txn, &dn("cn=nobody,ou=people,dc=example,dc=com"), true)
        .unwrap()
    {
        DnMatch::Closest { id, matched, .. } => {
            assert_eq!(id, people);
            assert_eq!(matched.nname(), "ou=people,dc=example,dc=com");
        }
        other => panic!("expected closest match, got {other:?}"),
    }

    let err = store.dn_to_id(&txn, &dn("dc=other,dc=org"), true).unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Insert / Delete Bookkeeping
// =============================================================================

/// Names resolve after insert and stop resolving after delete.
#[test]
fn test_insert_then_delete_resolves() {
    let store = open_store();
    let top = insert_suffix(&store);
    let id = insert(&store, top, "cn=x,dc=example,dc=com", &[]).unwrap();
    assert_eq!(exact(&store, "cn=x,dc=example,dc=com"), Some(id));

    store.write(|txn| store.delete_record(txn, id)).unwrap();
    assert_eq!(exact(&store, "cn=x,dc=example,dc=com"), None);
    assert_eq!(subtree_size(&store, top), 1);
}

/// N descendants raise the ancestor's size by N; deleting them in any
/// order lowers it by N.
#[test]
fn test_subtree_size_tracks_inserts_and_deletes() {
    let store = open_store();
    let top = insert_suffix(&store);
    let unit = insert(&store, top, "ou=unit,dc=example,dc=com", &[]).unwrap();
    assert_eq!(subtree_size(&store, top), 2);

    let mut leaves = Vec::new();
    for i in 0..5 {
        let team = insert(&store, unit, &format!("ou=t{i},ou=unit,dc=example,dc=com"), &[]).unwrap();
        for j in 0..3 {
            let name = format!("cn=m{j},ou=t{i},ou=unit,dc=example,dc=com");
            leaves.push(insert(&store, team, &name, &[]).unwrap());
        }
        leaves.push(team);
    }
    assert_eq!(subtree_size(&store, top), 2 + 20);
    assert_eq!(subtree_size(&store, unit), 1 + 20);

    // Leaves first, each team after its members.
    for id in leaves {
        store.write(|txn| store.delete_record(txn, id)).unwrap();
    }
    assert_eq!(subtree_size(&store, unit), 1);
    assert_eq!(subtree_size(&store, top), 2);

    let txn = store.env().begin_read().unwrap();
    assert_eq!(store.check_tree(&txn).unwrap(), 2);
    assert_eq!(store.names().subtree_size(&txn, ROOT_ID).unwrap(), 2);
}

/// A second record with the same name under the same parent conflicts.
#[test]
fn test_duplicate_name_conflicts() {
    let store = open_store();
    let top = insert_suffix(&store);
    insert(&store, top, "cn=x,dc=example,dc=com", &[]).unwrap();
    let err = insert(&store, top, "CN=X,dc=example,dc=com", &[]).unwrap_err();
    assert_eq!(err.kind(), dirstore::ErrorKind::Conflict);
    assert_eq!(subtree_size(&store, top), 2);
}

// =============================================================================
// Scope Closure
// =============================================================================

/// 50 records over 4 levels: SUBTREE returns exactly each base's closure.
#[test]
fn test_subtree_scope_is_transitive_closure() {
    let store = open_store();
    let top = insert_suffix(&store);
    let mut nodes: Vec<(Id, String)> = vec![(top, SUFFIX.to_string())];

    let mut level2 = Vec::new();
    for i in 0..4 {
        let name = format!("ou=d{i},{SUFFIX}");
        let id = insert(&store, top, &name, &[]).unwrap();
        level2.push((id, name.clone()));
        nodes.push((id, name));
    }
    let mut level3 = Vec::new();
    for (parent, parent_name) in &level2 {
        for j in 0..3 {
            let name = format!("ou=g{j},{parent_name}");
            let id = insert(&store, *parent, &name, &[]).unwrap();
            level3.push((id, name.clone()));
            nodes.push((id, name));
        }
    }
    for k in 0..33 {
        let (parent, parent_name) = &level3[k % level3.len()];
        let name = format!("cn=u{k},{parent_name}");
        let id = insert(&store, *parent, &name, &[]).unwrap();
        nodes.push((id, name));
    }
    assert_eq!(nodes.len(), 50);

    let txn = store.env().begin_read().unwrap();
    assert_eq!(store.names().subtree_size(&txn, top).unwrap(), 50);
    for (base, base_name) in &nodes {
        let base_dn = dn(base_name);
        let expected: BTreeSet<Id> = nodes
            .iter()
            .filter(|(_, name)| dn(name).is_within(&base_dn))
            .map(|(id, _)| *id)
            .collect();

        let found: BTreeSet<Id> = store
            .scope_enumerate(&txn, *base, Scope::Subtree)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(found, expected, "subtree of {base_name}");

        let below: BTreeSet<Id> = store
            .scope_enumerate(&txn, *base, Scope::Subordinate)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(below.len() + 1, expected.len());
        assert!(!below.contains(base));

        assert_eq!(store.names().subtree_size(&txn, *base).unwrap(), expected.len() as u64);
    }
    assert_eq!(store.check_tree(&txn).unwrap(), 50);
}

/// The walk yields one level at a time without reading the whole subtree.
#[test]
fn test_scope_walk_is_lazy() {
    let store = open_store();
    let top = insert_suffix(&store);
    let mut units = Vec::new();
    for i in 0..3 {
        let unit = insert(&store, top, &format!("ou=u{i},{SUFFIX}"), &[]).unwrap();
        insert(&store, unit, &format!("cn=m,ou=u{i},{SUFFIX}"), &[]).unwrap();
        units.push(unit);
    }

    let txn = store.env().begin_read().unwrap();
    let mut walk = store.scope_enumerate(&txn, top, Scope::Subtree);
    assert_eq!(walk.next().unwrap().unwrap(), top);
    assert_eq!(walk.depth(), 1);
    let first_level: Vec<Id> = walk.by_ref().take(3).map(|r| r.unwrap()).collect();
    assert_eq!(first_level, units);
    assert_eq!(walk.depth(), 1);
    assert_eq!(walk.count(), 3);
}

/// Renaming a subtree keeps sizes and moves every descendant's name.
#[test]
fn test_rename_moves_descendants() {
    let store = open_store();
    let top = insert_suffix(&store);
    let old = insert(&store, top, "ou=old,dc=example,dc=com", &[]).unwrap();
    let child = insert(&store, old, "cn=c,ou=old,dc=example,dc=com", &[]).unwrap();

    store.write(|txn| store.rename_record(txn, old, "ou=new", None)).unwrap();

    assert_eq!(exact(&store, "cn=c,ou=new,dc=example,dc=com"), Some(child));
    assert_eq!(exact(&store, "cn=c,ou=old,dc=example,dc=com"), None);
    assert_eq!(subtree_size(&store, top), 3);
    assert_eq!(subtree_size(&store, old), 2);
}
