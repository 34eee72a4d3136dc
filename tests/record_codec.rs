//! Record Codec Tests
//!
//! Tests for storage invariants:
//! - Stored records decode to the same attributes, values and flags
//! - Attributes above the multi-value threshold round-trip via the side table
//! - Oversized records are rejected before anything is written
//! - A corrupt image fails only that record

mod common;

use common::{insert, insert_suffix, open_with, base_config, SUFFIX};
use dirstore::idl::id_to_key;
use dirstore::kv::PutFlags;
use dirstore::record::{AttrFlags, MultivalPolicy, MultivalThreshold, ObjectClassFlags, PRIMARY_SPACE};
use dirstore::schema::Schema;
use dirstore::{Environment, ErrorKind, Record, WriteTxn, ROOT_ID};
use proptest::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn sorted(values: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut values = values.to_vec();
    values.sort();
    values
}

fn arb_values(max: usize) -> impl Strategy<Value = (Vec<String>, bool)> {
    (
        prop::collection::btree_set("[a-z]{1,8}", 0..max).prop_map(|s| s.into_iter().collect()),
        any::<bool>(),
    )
}

fn arb_object_classes() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(vec!["top", "person", "alias", "referral", "subentry", "glue"], 1..4)
}

// =============================================================================
// Round Trip
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Stored then fetched records keep values, the raw/normalized split
    /// and the object-class flags, below and above the threshold.
    #[test]
    fn prop_round_trip((descs, upper) in arb_values(8), (mails, _) in arb_values(3), ocs in arb_object_classes()) {
        let mut config = base_config();
        config.multival = MultivalPolicy::new(MultivalThreshold::default()).with_attr("description", 3, 2);
        let store = open_with(config);
        let schema = store.schema().clone();

        let descs: Vec<String> = if upper {
            descs.iter().map(|d| d.to_ascii_uppercase()).collect()
        } else {
            descs
        };

        let mut original = Record::new(0, common::dn(SUFFIX))
            .with_attr(schema.attribute("objectClass").unwrap(), &ocs);
        if !descs.is_empty() {
            original = original.with_attr(schema.attribute("description").unwrap(), &descs);
        }
        if !mails.is_empty() {
            original = original.with_attr(schema.attribute("mail").unwrap(), &mails);
        }

        let id = store.write(|txn| {
            original.id = store.next_id(&*txn)?;
            store.insert_record(txn, ROOT_ID, &mut original)?;
            Ok(original.id)
        }).unwrap();

        let txn = store.env().begin_read().unwrap();
        let fetched = store.fetch_record(&txn, id).unwrap();

        prop_assert_eq!(fetched.oc_flags, ObjectClassFlags::from_object_classes(&ocs));
        prop_assert_eq!(fetched.oc_flags, original.oc_flags);
        prop_assert_eq!(fetched.attrs.len(), original.attrs.len());
        for attr in &original.attrs {
            let got = fetched.attr(attr.name()).unwrap();
            prop_assert_eq!(sorted(&got.vals), sorted(&attr.vals));
            prop_assert_eq!(sorted(got.normalized()), sorted(attr.normalized()));
            prop_assert_eq!(got.has_distinct_normalized(), attr.has_distinct_normalized());
            prop_assert_eq!(
                got.flags.contains(AttrFlags::BIG_MULTI),
                attr.name() == "description" && attr.len() > 3
            );
        }
    }
}

// =============================================================================
// Limits and Faults
// =============================================================================

/// An oversized record fails with TooLarge and leaves nothing behind.
#[test]
fn test_too_large_rejected_before_write() {
    let mut config = base_config();
    config.max_record_size = 256;
    let store = open_with(config);
    let top = insert_suffix(&store);
    let interned = store.ad_table().len();

    let big = "x".repeat(512);
    let err = insert(&store, top, "cn=big,dc=example,dc=com", &[("description", &[big.as_str()])]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooLarge);

    let txn = store.env().begin_read().unwrap();
    assert_eq!(store.names().subtree_size(&txn, top).unwrap(), 1);
    assert_eq!(store.ad_table().len(), interned);
    assert_eq!(store.check_tree(&txn).unwrap(), 1);
}

/// A garbled image is a decode fault for that record only.
#[test]
fn test_corrupt_image_is_decode_fault() {
    let store = open_with(base_config());
    let top = insert_suffix(&store);
    let good = insert(&store, top, "cn=good,dc=example,dc=com", &[("cn", &["good"])]).unwrap();
    let bad = insert(&store, top, "cn=bad,dc=example,dc=com", &[("cn", &["bad"])]).unwrap();

    let space = store.env().space(PRIMARY_SPACE).unwrap();
    let mut txn = store.env().begin_write().unwrap();
    txn.put(space, &id_to_key(bad), &[0xff; 20], PutFlags::empty()).unwrap();
    txn.commit().unwrap();

    let txn = store.env().begin_read().unwrap();
    let err = store.fetch_record(&txn, bad).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeFault);
    assert!(!err.is_fatal());

    let rec = store.fetch_record(&txn, good).unwrap();
    assert_eq!(rec.attr("cn").unwrap().vals, vec![b"good".to_vec()]);
}

/// Values of a multi-valued attribute above the threshold are readable
/// after the record is fetched in a later snapshot.
#[test]
fn test_big_attribute_survives_fetch() {
    let mut config = base_config();
    config.multival = MultivalPolicy::new(MultivalThreshold { hi: 2, lo: 1 });
    let store = open_with(config);
    let top = insert_suffix(&store);
    let members = [
        "cn=a,dc=example,dc=com",
        "cn=b,dc=example,dc=com",
        "cn=c,dc=example,dc=com",
    ];
    let group = insert(&store, top, "cn=group,dc=example,dc=com", &[("member", &members)]).unwrap();

    let txn = store.env().begin_read().unwrap();
    let rec = store.fetch_record(&txn, group).unwrap();
    let member = rec.attr("member").unwrap();
    assert!(member.flags.contains(AttrFlags::BIG_MULTI));
    assert_eq!(member.len(), 3);
    assert_eq!(rec.attr("objectClass").unwrap().vals, vec![b"top".to_vec()]);
}
