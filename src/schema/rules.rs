//! Matching rules
//!
//! A matching rule is a capability: it normalizes and compares values, and
//! turns stored values or an asserted value into index keys. The engine is
//! polymorphic over [`MatchingRule`]; the rules below are the built-in set.
//!
//! Keys that only need equality (equality, approximate, substring) are
//! CRC-32 digests of a tag byte and the normalized bytes. Digest collisions
//! only widen a candidate set. Ordered keys preserve value order instead.

use std::cmp::{min, Ordering};
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dn::Dn;

/// Index kind a key is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Equality,
    Approx,
    Substr,
    Ordered,
}

/// Relation a DN-valued assertion expresses against the name tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnRelation {
    /// The named entry itself
    Exact,
    /// The named entry and all its descendants
    Subtree,
    /// Immediate children of the named entry
    OneLevel,
    /// Descendants, excluding the named entry
    Subordinate,
    /// Strict ancestors of the named entry
    Superior,
}

/// Substring assertion pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substrings {
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub final_value: Option<Vec<u8>>,
}

/// Asserted value handed to a rule for key generation.
#[derive(Debug, Clone, Copy)]
pub enum Assertion<'a> {
    Value(&'a [u8]),
    Substrings(&'a Substrings),
}

fn default_initial_min_len() -> usize {
    2
}

fn default_initial_max_len() -> usize {
    4
}

fn default_any_len() -> usize {
    4
}

fn default_any_step() -> usize {
    2
}

/// Substring index key parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstrParams {
    /// Shortest initial/final piece that gets a key
    #[serde(default = "default_initial_min_len")]
    pub initial_min_len: usize,
    /// Longest initial/final prefix indexed
    #[serde(default = "default_initial_max_len")]
    pub initial_max_len: usize,
    /// Window length for "any" keys
    #[serde(default = "default_any_len")]
    pub any_len: usize,
    /// Window step used when generating "any" keys for an assertion
    #[serde(default = "default_any_step")]
    pub any_step: usize,
}

impl Default for SubstrParams {
    fn default() -> Self {
        Self {
            initial_min_len: default_initial_min_len(),
            initial_max_len: default_initial_max_len(),
            any_len: default_any_len(),
            any_step: default_any_step(),
        }
    }
}

/// Comparison and index key generation for one kind of value.
pub trait MatchingRule: Send + Sync + fmt::Debug {
    /// Rule name, as used in extensible match assertions.
    fn name(&self) -> &str;

    /// Comparison form of a value.
    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        value.to_vec()
    }

    /// Orders two normalized values.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    /// Keys under which a record holding `values` is indexed.
    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], params: &SubstrParams) -> Vec<Vec<u8>>;

    /// Keys an assertion must find. Empty means the assertion cannot be
    /// answered from the index.
    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, params: &SubstrParams) -> Vec<Vec<u8>>;

    /// For DN-valued rules, the tree relation the rule tests.
    fn dn_relation(&self) -> Option<DnRelation> {
        None
    }
}

const TAG_EQUALITY: u8 = b'=';
const TAG_APPROX: u8 = b'~';
const TAG_INITIAL: u8 = b'^';
const TAG_ANY: u8 = b'*';
const TAG_FINAL: u8 = b'$';

/// Longest ordered key; longer values share their prefix's key.
pub const ORDERED_KEY_MAX: usize = 32;

/// Four-byte digest key for `bytes` under `tag`.
pub fn digest(tag: u8, bytes: &[u8]) -> Vec<u8> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[tag]);
    hasher.update(bytes);
    hasher.finalize().to_be_bytes().to_vec()
}

fn equality_keys<R: MatchingRule + ?Sized>(rule: &R, values: &[Vec<u8>]) -> Vec<Vec<u8>> {
    values
        .iter()
        .map(|v| digest(TAG_EQUALITY, &rule.normalize(v)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn fold_space_and_case(value: &[u8], trim_start: bool, trim_end: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    let mut pending_space = false;
    for &b in value {
        if b.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && (!out.is_empty() || !trim_start) {
            out.push(b' ');
        }
        pending_space = false;
        out.push(b.to_ascii_lowercase());
    }
    if pending_space && !trim_end {
        out.push(b' ');
    }
    out
}

fn case_ignore(value: &[u8]) -> Vec<u8> {
    fold_space_and_case(value, true, true)
}

/// Exact byte equality.
#[derive(Debug, Default)]
pub struct OctetStringMatch;

impl MatchingRule for OctetStringMatch {
    fn name(&self) -> &str {
        "octetStringMatch"
    }

    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], _params: &SubstrParams) -> Vec<Vec<u8>> {
        match kind {
            KeyKind::Equality => equality_keys(self, values),
            _ => Vec::new(),
        }
    }

    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, _params: &SubstrParams) -> Vec<Vec<u8>> {
        match (kind, assertion) {
            (KeyKind::Equality, Assertion::Value(v)) => vec![digest(TAG_EQUALITY, v)],
            _ => Vec::new(),
        }
    }
}

/// Case-insensitive equality with insignificant whitespace folded.
#[derive(Debug, Default)]
pub struct CaseIgnoreMatch;

impl MatchingRule for CaseIgnoreMatch {
    fn name(&self) -> &str {
        "caseIgnoreMatch"
    }

    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        case_ignore(value)
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        case_ignore(a).cmp(&case_ignore(b))
    }

    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], _params: &SubstrParams) -> Vec<Vec<u8>> {
        match kind {
            KeyKind::Equality => equality_keys(self, values),
            _ => Vec::new(),
        }
    }

    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, _params: &SubstrParams) -> Vec<Vec<u8>> {
        match (kind, assertion) {
            (KeyKind::Equality, Assertion::Value(v)) => vec![digest(TAG_EQUALITY, &case_ignore(v))],
            _ => Vec::new(),
        }
    }
}

/// Case-insensitive substring match.
///
/// Stored values get every "any" window, and every initial and final
/// prefix between the configured lengths. Assertions step through their
/// "any" pieces, always covering the last window.
#[derive(Debug, Default)]
pub struct CaseIgnoreSubstringsMatch;

impl CaseIgnoreSubstringsMatch {
    fn value_keys(values: &[Vec<u8>], p: &SubstrParams) -> Vec<Vec<u8>> {
        let mut keys = BTreeSet::new();
        for value in values {
            let v = case_ignore(value);
            let len = v.len();
            if p.any_len > 0 && len >= p.any_len {
                for i in 0..=len - p.any_len {
                    keys.insert(digest(TAG_ANY, &v[i..i + p.any_len]));
                }
            }
            if len >= p.initial_min_len {
                for j in p.initial_min_len..=min(len, p.initial_max_len) {
                    keys.insert(digest(TAG_INITIAL, &v[..j]));
                    keys.insert(digest(TAG_FINAL, &v[len - j..]));
                }
            }
        }
        keys.into_iter().collect()
    }

    fn piece_keys(s: &Substrings, p: &SubstrParams) -> Vec<Vec<u8>> {
        let mut keys = BTreeSet::new();
        if let Some(initial) = &s.initial {
            let v = fold_space_and_case(initial, true, false);
            if v.len() >= p.initial_min_len {
                keys.insert(digest(TAG_INITIAL, &v[..min(v.len(), p.initial_max_len)]));
            }
        }
        for piece in &s.any {
            let v = fold_space_and_case(piece, false, false);
            if p.any_len == 0 || v.len() < p.any_len {
                continue;
            }
            let last = v.len() - p.any_len;
            let mut i = 0;
            loop {
                keys.insert(digest(TAG_ANY, &v[i..i + p.any_len]));
                if i == last {
                    break;
                }
                i = min(i + p.any_step.max(1), last);
            }
        }
        if let Some(fin) = &s.final_value {
            let v = fold_space_and_case(fin, false, true);
            let len = v.len();
            if len >= p.initial_min_len {
                keys.insert(digest(TAG_FINAL, &v[len - min(len, p.initial_max_len)..]));
            }
        }
        keys.into_iter().collect()
    }
}

impl MatchingRule for CaseIgnoreSubstringsMatch {
    fn name(&self) -> &str {
        "caseIgnoreSubstringsMatch"
    }

    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        case_ignore(value)
    }

    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], params: &SubstrParams) -> Vec<Vec<u8>> {
        match kind {
            KeyKind::Substr => Self::value_keys(values, params),
            _ => Vec::new(),
        }
    }

    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, params: &SubstrParams) -> Vec<Vec<u8>> {
        match (kind, assertion) {
            (KeyKind::Substr, Assertion::Substrings(s)) => Self::piece_keys(s, params),
            _ => Vec::new(),
        }
    }
}

/// Case-insensitive ordering over a bounded key prefix.
#[derive(Debug, Default)]
pub struct CaseIgnoreOrderingMatch;

impl MatchingRule for CaseIgnoreOrderingMatch {
    fn name(&self) -> &str {
        "caseIgnoreOrderingMatch"
    }

    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        case_ignore(value)
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        case_ignore(a).cmp(&case_ignore(b))
    }

    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], _params: &SubstrParams) -> Vec<Vec<u8>> {
        if kind != KeyKind::Ordered {
            return Vec::new();
        }
        values
            .iter()
            .map(|v| {
                let mut n = case_ignore(v);
                n.truncate(ORDERED_KEY_MAX);
                n
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, _params: &SubstrParams) -> Vec<Vec<u8>> {
        match (kind, assertion) {
            (KeyKind::Ordered, Assertion::Value(v)) => {
                let mut n = case_ignore(v);
                n.truncate(ORDERED_KEY_MAX);
                vec![n]
            }
            _ => Vec::new(),
        }
    }
}

fn parse_integer(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value).ok()?.trim().parse().ok()
}

/// Sign-flipped big-endian form; sorts bytewise in numeric order.
fn integer_key(n: i64) -> Vec<u8> {
    ((n as u64) ^ (1 << 63)).to_be_bytes().to_vec()
}

fn integer_normalize(value: &[u8]) -> Vec<u8> {
    match parse_integer(value) {
        Some(n) => n.to_string().into_bytes(),
        None => value.to_vec(),
    }
}

fn integer_compare(a: &[u8], b: &[u8]) -> Ordering {
    match (parse_integer(a), parse_integer(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Integer equality.
#[derive(Debug, Default)]
pub struct IntegerMatch;

impl MatchingRule for IntegerMatch {
    fn name(&self) -> &str {
        "integerMatch"
    }

    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        integer_normalize(value)
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        integer_compare(a, b)
    }

    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], _params: &SubstrParams) -> Vec<Vec<u8>> {
        match kind {
            KeyKind::Equality => equality_keys(self, values),
            _ => Vec::new(),
        }
    }

    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, _params: &SubstrParams) -> Vec<Vec<u8>> {
        match (kind, assertion) {
            (KeyKind::Equality, Assertion::Value(v)) => {
                vec![digest(TAG_EQUALITY, &integer_normalize(v))]
            }
            _ => Vec::new(),
        }
    }
}

/// Integer ordering. Values that do not parse are not indexed.
#[derive(Debug, Default)]
pub struct IntegerOrderingMatch;

impl MatchingRule for IntegerOrderingMatch {
    fn name(&self) -> &str {
        "integerOrderingMatch"
    }

    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        integer_normalize(value)
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        integer_compare(a, b)
    }

    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], _params: &SubstrParams) -> Vec<Vec<u8>> {
        if kind != KeyKind::Ordered {
            return Vec::new();
        }
        values
            .iter()
            .filter_map(|v| parse_integer(v))
            .map(integer_key)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, _params: &SubstrParams) -> Vec<Vec<u8>> {
        match (kind, assertion) {
            (KeyKind::Ordered, Assertion::Value(v)) => {
                parse_integer(v).map(integer_key).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Crude phonetic approximate match.
///
/// Each word is reduced to its first letter followed by its remaining
/// consonants with repeats collapsed; every word becomes one key.
#[derive(Debug, Default)]
pub struct ApproxMatch;

impl ApproxMatch {
    fn squash(word: &[u8]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(word.len());
        for (i, &b) in word.iter().enumerate() {
            let c = b.to_ascii_lowercase();
            if i > 0 && b"aeiouyhw".contains(&c) {
                continue;
            }
            if out.last() == Some(&c) {
                continue;
            }
            out.push(c);
        }
        out
    }

    fn keys(value: &[u8], out: &mut BTreeSet<Vec<u8>>) {
        for word in value
            .split(|b| b.is_ascii_whitespace() || b.is_ascii_punctuation())
            .filter(|w| !w.is_empty())
        {
            out.insert(digest(TAG_APPROX, &Self::squash(word)));
        }
    }
}

impl MatchingRule for ApproxMatch {
    fn name(&self) -> &str {
        "approxMatch"
    }

    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        case_ignore(value)
    }

    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], _params: &SubstrParams) -> Vec<Vec<u8>> {
        if kind != KeyKind::Approx {
            return Vec::new();
        }
        let mut keys = BTreeSet::new();
        for v in values {
            Self::keys(v, &mut keys);
        }
        keys.into_iter().collect()
    }

    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, _params: &SubstrParams) -> Vec<Vec<u8>> {
        match (kind, assertion) {
            (KeyKind::Approx, Assertion::Value(v)) => {
                let mut keys = BTreeSet::new();
                Self::keys(v, &mut keys);
                keys.into_iter().collect()
            }
            _ => Vec::new(),
        }
    }
}

fn dn_normalize(value: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(value).ok().and_then(|s| Dn::parse(s).ok()) {
        Some(dn) => dn.nname().as_bytes().to_vec(),
        None => case_ignore(value),
    }
}

/// Equality of distinguished names.
#[derive(Debug, Default)]
pub struct DistinguishedNameMatch;

impl MatchingRule for DistinguishedNameMatch {
    fn name(&self) -> &str {
        "distinguishedNameMatch"
    }

    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        dn_normalize(value)
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        dn_normalize(a).cmp(&dn_normalize(b))
    }

    fn index_keys(&self, kind: KeyKind, values: &[Vec<u8>], _params: &SubstrParams) -> Vec<Vec<u8>> {
        match kind {
            KeyKind::Equality => equality_keys(self, values),
            _ => Vec::new(),
        }
    }

    fn assertion_keys(&self, kind: KeyKind, assertion: Assertion<'_>, _params: &SubstrParams) -> Vec<Vec<u8>> {
        match (kind, assertion) {
            (KeyKind::Equality, Assertion::Value(v)) => vec![digest(TAG_EQUALITY, &dn_normalize(v))],
            _ => Vec::new(),
        }
    }

    fn dn_relation(&self) -> Option<DnRelation> {
        Some(DnRelation::Exact)
    }
}

/// Scope relations between distinguished names.
///
/// These are never indexed; they are answered from the name tree.
#[derive(Debug)]
pub struct DnScopeMatch {
    relation: DnRelation,
}

impl DnScopeMatch {
    pub fn new(relation: DnRelation) -> Self {
        Self { relation }
    }
}

impl MatchingRule for DnScopeMatch {
    fn name(&self) -> &str {
        match self.relation {
            DnRelation::Exact => "distinguishedNameMatch",
            DnRelation::Subtree => "dnSubtreeMatch",
            DnRelation::OneLevel => "dnOneLevelMatch",
            DnRelation::Subordinate => "dnSubordinateMatch",
            DnRelation::Superior => "dnSuperiorMatch",
        }
    }

    fn normalize(&self, value: &[u8]) -> Vec<u8> {
        dn_normalize(value)
    }

    fn index_keys(&self, _kind: KeyKind, _values: &[Vec<u8>], _params: &SubstrParams) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn assertion_keys(&self, _kind: KeyKind, _assertion: Assertion<'_>, _params: &SubstrParams) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn dn_relation(&self) -> Option<DnRelation> {
        Some(self.relation)
    }
}
