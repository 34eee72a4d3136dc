//! Candidate Evaluation Tests
//!
//! Tests for filter invariants:
//! - AND is intersection and OR is union, for indexed and unindexed leaves
//! - entryDN equality answers exactly what the name index answers
//! - Unindexed assertions widen the candidate set instead of failing

mod common;

use std::collections::BTreeSet;

use common::{insert, insert_suffix, open_store};
use dirstore::filter::{ComponentFilter, ComponentItem, MatchingRuleAssertion};
use dirstore::{DnMatch, Environment, Filter, Id, MemEnv, Store};
use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};

// =============================================================================
// Fixture
// =============================================================================

const PEOPLE: &str = "ou=people,dc=example,dc=com";

struct Directory {
    store: Store<MemEnv>,
    people: Id,
    by_cn: Vec<(String, Id)>,
}

impl Directory {
    fn id(&self, cn: &str) -> Id {
        self.by_cn.iter().find(|(n, _)| n == cn).map(|(_, id)| *id).unwrap()
    }

    fn ids(&self, cns: &[&str]) -> BTreeSet<Id> {
        cns.iter().map(|cn| self.id(cn)).collect()
    }

    fn eval(&self, filter: &Filter) -> BTreeSet<Id> {
        let txn = self.store.env().begin_read().unwrap();
        self.store.evaluate_filter(&txn, filter).unwrap().iter().collect()
    }
}

fn directory() -> Directory {
    let store = open_store();
    let top = insert_suffix(&store);
    let people = insert(&store, top, PEOPLE, &[]).unwrap();

    let rows: [(&str, Option<&str>, Option<&str>); 6] = [
        ("alice", Some("smith"), Some("10")),
        ("bob", Some("smith"), Some("20")),
        ("carol", Some("jones"), Some("30")),
        ("dave", Some("brown"), Some("40")),
        ("eve", Some("jones"), Some("50")),
        ("frank", None, None),
    ];
    let mut by_cn = Vec::new();
    for (cn, sn, uid) in rows {
        let mut attrs: Vec<(&str, &[&str])> = vec![("cn", std::slice::from_ref(&cn))];
        let sn_vals: Vec<&str> = sn.into_iter().collect();
        let uid_vals: Vec<&str> = uid.into_iter().collect();
        if !sn_vals.is_empty() {
            attrs.push(("sn", sn_vals.as_slice()));
        }
        if !uid_vals.is_empty() {
            attrs.push(("uidNumber", uid_vals.as_slice()));
        }
        let id = insert(&store, people, &format!("cn={cn},{PEOPLE}"), &attrs).unwrap();
        by_cn.push((cn.to_string(), id));
    }
    Directory { store, people, by_cn }
}

fn arb_leaf() -> impl Strategy<Value = Filter> {
    let names = vec!["alice", "bob", "carol", "dave", "eve", "frank", "zoe"];
    prop_oneof![
        prop::sample::select(names.clone()).prop_map(|n| Filter::eq("cn", n)),
        prop::sample::select(vec!["smith", "jones", "brown", "nobody"]).prop_map(|s| Filter::eq("sn", s)),
        Just(Filter::eq("givenName", "x")),
        Just(Filter::present("cn")),
        Just(Filter::present("sn")),
        Just(Filter::present("givenName")),
        Just(Filter::present("objectClass")),
        prop::sample::select(vec!["al", "ca", "d", "xy"]).prop_map(|p| Filter::substrings("cn", Some(p), &[], None)),
        (0u32..60).prop_map(|n| Filter::ge("uidNumber", n.to_string())),
        (0u32..60).prop_map(|n| Filter::le("uidNumber", n.to_string())),
        prop::sample::select(names).prop_map(|n| Filter::not(Filter::eq("cn", n))),
        prop::sample::select(vec!["alice", "bob", "nobody"])
            .prop_map(|n| Filter::eq("entryDN", format!("cn={n},{PEOPLE}"))),
        Just(Filter::extensible(Some("dnOneLevelMatch"), Some("entryDN"), PEOPLE)),
        Just(Filter::eq("undefinedAttr", "x")),
    ]
}

// =============================================================================
// Algebra Laws
// =============================================================================

/// AND of two leaves equals the intersection of their candidates.
#[test]
fn test_and_is_intersection() {
    let dir = directory();
    let mut runner = TestRunner::new(Config::with_cases(128));
    runner
        .run(&(arb_leaf(), arb_leaf()), |(f1, f2)| {
            let both = dir.eval(&Filter::And(vec![f1.clone(), f2.clone()]));
            let expected: BTreeSet<Id> = dir.eval(&f1).intersection(&dir.eval(&f2)).copied().collect();
            prop_assert_eq!(both, expected, "(&{}{})", f1, f2);
            Ok(())
        })
        .unwrap();
}

/// OR of two leaves equals the union of their candidates.
#[test]
fn test_or_is_union() {
    let dir = directory();
    let mut runner = TestRunner::new(Config::with_cases(128));
    runner
        .run(&(arb_leaf(), arb_leaf()), |(f1, f2)| {
            let either = dir.eval(&Filter::Or(vec![f1.clone(), f2.clone()]));
            let expected: BTreeSet<Id> = dir.eval(&f1).union(&dir.eval(&f2)).copied().collect();
            prop_assert_eq!(either, expected, "(|{}{})", f1, f2);
            Ok(())
        })
        .unwrap();
}

// =============================================================================
// Leaf Semantics
// =============================================================================

/// entryDN equality is the name index lookup, or empty when absent.
#[test]
fn test_entry_dn_equality_matches_lookup() {
    let dir = directory();
    let txn = dir.store.env().begin_read().unwrap();
    let target = format!("cn=carol,{PEOPLE}");
    let found = match dir.store.dn_to_id(&txn, &common::dn(&target), false).unwrap() {
        DnMatch::Exact { id, .. } => id,
        other => panic!("expected exact match, got {other:?}"),
    };
    assert_eq!(dir.eval(&Filter::eq("entryDN", target.as_str())), BTreeSet::from([found]));
    assert!(dir.eval(&Filter::eq("entryDN", format!("cn=x,{PEOPLE}"))).is_empty());
    assert!(dir.eval(&Filter::eq("entryDN", "not a dn")).is_empty());
}

/// Indexed equality, substrings and ranges narrow to the matching records.
#[test]
fn test_indexed_leaves() {
    let dir = directory();
    assert_eq!(dir.eval(&Filter::eq("cn", "ALICE")), dir.ids(&["alice"]));
    assert_eq!(dir.eval(&Filter::eq("sn", "smith")), dir.ids(&["alice", "bob"]));
    assert_eq!(
        dir.eval(&Filter::substrings("cn", Some("ca"), &[], None)),
        dir.ids(&["carol"])
    );
    assert_eq!(
        dir.eval(&Filter::ge("uidNumber", "30")),
        dir.ids(&["carol", "dave", "eve"])
    );
    assert_eq!(dir.eval(&Filter::le("uidNumber", "20")), dir.ids(&["alice", "bob"]));
    assert_eq!(
        dir.eval(&Filter::present("cn")),
        dir.ids(&["alice", "bob", "carol", "dave", "eve", "frank"])
    );
}

/// Approximate match on an attribute indexed only for equality uses the
/// equality index.
#[test]
fn test_approx_falls_back_to_equality_index() {
    let dir = directory();
    assert_eq!(dir.eval(&Filter::approx("sn", "Jones")), dir.ids(&["carol", "eve"]));
}

/// Unindexed and unknown attributes widen to every record.
#[test]
fn test_unindexed_widens_to_everything() {
    let dir = directory();
    let everything = dir.eval(&Filter::present("objectClass"));
    assert_eq!(everything.len(), 8);
    assert_eq!(dir.eval(&Filter::eq("givenName", "x")), everything);
    assert_eq!(dir.eval(&Filter::present("givenName")), everything);
    assert_eq!(dir.eval(&Filter::eq("undefinedAttr", "x")), everything);
    assert_eq!(dir.eval(&Filter::not(Filter::eq("cn", "alice"))), everything);
}

/// Scope rules on entryDN come from the tree.
#[test]
fn test_dn_scope_rules() {
    let dir = directory();
    let one = dir.eval(&Filter::extensible(Some("dnOneLevelMatch"), Some("entryDN"), PEOPLE));
    assert_eq!(one, dir.ids(&["alice", "bob", "carol", "dave", "eve", "frank"]));

    let mut sub = dir.ids(&["alice", "bob", "carol", "dave", "eve", "frank"]);
    sub.insert(dir.people);
    assert_eq!(
        dir.eval(&Filter::extensible(Some("dnSubtreeMatch"), Some("entryDN"), PEOPLE)),
        sub
    );

    let superiors = dir.eval(&Filter::extensible(
        Some("dnSuperiorMatch"),
        Some("entryDN"),
        format!("cn=alice,{PEOPLE}"),
    ));
    assert_eq!(superiors.len(), 2);
    assert!(superiors.contains(&dir.people));
}

/// A component assertion without a component index widens to everything.
#[test]
fn test_component_filter_without_index() {
    let dir = directory();
    let filter = Filter::Extensible(MatchingRuleAssertion {
        attr: Some("cn".to_string()),
        component: Some(ComponentFilter::Item(ComponentItem::new("1", b"x".to_vec()))),
        ..Default::default()
    });
    assert_eq!(dir.eval(&filter).len(), 8);
}

/// AND stops at an empty intermediate set.
#[test]
fn test_and_with_empty_child_is_empty() {
    let dir = directory();
    let filter = Filter::And(vec![
        Filter::eq("cn", "nobody"),
        Filter::present("objectClass"),
        Filter::eq("sn", "smith"),
    ]);
    assert!(dir.eval(&filter).is_empty());
}
