//! Index-based candidate evaluation
//!
//! Turns a filter into a superset of the identifiers that can match it,
//! using only the name tree and the attribute indexes. Anything the indexes
//! cannot answer widens the set: first to the attribute's presence
//! candidates, then to every identifier. The result is never narrower than
//! the true match set; the caller tests each candidate against the filter.
//!
//! # Decisions
//!
//! - NOT yields every identifier
//! - A computed TRUE child does not restrict an AND
//! - An AND stops at the first empty intermediate result
//! - A subtree assertion on the suffix itself yields every identifier

use crate::dn::{Dn, DnMatch, NameIndex, Scope};
use crate::idl::{Id, Idl};
use crate::index::{storage_key, AttrIndex, IndexManager, IndexMask, PRESENCE_KEY};
use crate::kv::ReadTxn;
use crate::schema::{AttrDesc, Assertion, DnRelation, KeyKind, MatchingRule, Schema};

use super::ast::{Ava, Computed, Filter, MatchingRuleAssertion, SubstringAssertion};
use super::component::ComponentFilter;
use super::errors::FilterResult;

/// Evaluates filters inside one transaction.
pub struct CandidateEvaluator<'a, T: ReadTxn + ?Sized> {
    txn: &'a T,
    names: &'a NameIndex,
    indexes: &'a IndexManager,
    schema: &'a dyn Schema,
    entry_dn_attr: &'a str,
}

impl<'a, T: ReadTxn + ?Sized> CandidateEvaluator<'a, T> {
    pub fn new(
        txn: &'a T,
        names: &'a NameIndex,
        indexes: &'a IndexManager,
        schema: &'a dyn Schema,
        entry_dn_attr: &'a str,
    ) -> Self {
        Self {
            txn,
            names,
            indexes,
            schema,
            entry_dn_attr,
        }
    }

    /// Candidates for `filter`, with an open upper bound closed at `last_id`.
    pub fn candidates(&self, filter: &Filter, last_id: Id) -> FilterResult<Idl> {
        let ids = self.evaluate(filter)?.resolve_upper(last_id);
        tracing::debug!(event = "FILTER_CANDIDATES", filter = %filter, first = ?ids.first(), last = ?ids.last(), count = ids.len());
        Ok(ids)
    }

    /// Candidates for `filter`; an open range means "everything".
    pub fn evaluate(&self, filter: &Filter) -> FilterResult<Idl> {
        match filter {
            Filter::Computed(Computed::True) => Ok(Idl::all()),
            Filter::Computed(Computed::False | Computed::Undefined) => Ok(Idl::empty()),
            Filter::Not(_) => Ok(Idl::all()),
            Filter::And(children) => self.and_candidates(children),
            Filter::Or(children) => self.or_candidates(children),
            Filter::Present(attr) => self.presence_candidates(attr),
            Filter::Equality(ava) => self.equality_candidates(ava),
            Filter::Approx(ava) => self.approx_candidates(ava),
            Filter::Substrings(sa) => self.substring_candidates(sa),
            Filter::GreaterOrEqual(ava) => self.inequality_candidates(ava, true),
            Filter::LessOrEqual(ava) => self.inequality_candidates(ava, false),
            Filter::Extensible(mra) => self.extensible_candidates(mra),
        }
    }

    fn and_candidates(&self, children: &[Filter]) -> FilterResult<Idl> {
        let mut ids = Idl::all();
        for child in children {
            if matches!(child, Filter::Computed(Computed::True)) {
                continue;
            }
            let found = self.evaluate(child)?;
            ids.intersect_with(&found);
            if ids.is_empty() {
                tracing::trace!(event = "FILTER_AND_EMPTY", at = %child);
                break;
            }
        }
        Ok(ids)
    }

    fn or_candidates(&self, children: &[Filter]) -> FilterResult<Idl> {
        let mut ids = Idl::empty();
        for child in children {
            let found = self.evaluate(child)?;
            ids.union_with(&found);
        }
        Ok(ids)
    }

    fn is_entry_dn(&self, desc: &AttrDesc) -> bool {
        desc.is(self.entry_dn_attr)
    }

    fn presence_candidates(&self, attr: &str) -> FilterResult<Idl> {
        let Some(desc) = self.schema.attribute(attr) else {
            return Ok(Idl::all());
        };
        // Every record has these.
        if desc.is("objectClass") || self.is_entry_dn(&desc) {
            return Ok(Idl::all());
        }
        let Some((ai, _)) = self.indexes.index_param(attr, IndexMask::PRESENT) else {
            return Ok(Idl::all());
        };
        Ok(self.indexes.lookup_key(self.txn, ai, PRESENCE_KEY)?)
    }

    // Intersection of the IDLs under every key; empty as soon as one is.
    fn keyed_candidates(&self, ai: &AttrIndex, kind: IndexMask, keys: &[Vec<u8>]) -> FilterResult<Idl> {
        let mut ids = Idl::all();
        for key in keys {
            let found = self.indexes.lookup_key(self.txn, ai, &storage_key(kind, key))?;
            ids.intersect_with(&found);
            if ids.is_empty() {
                break;
            }
        }
        Ok(ids)
    }

    fn rule_candidates(
        &self,
        attr: &str,
        kind: IndexMask,
        rule_for: impl Fn(&AttrDesc, IndexMask) -> Option<(&dyn MatchingRule, KeyKind)>,
        assertion: Assertion<'_>,
    ) -> FilterResult<Idl> {
        let Some(desc) = self.schema.attribute(attr) else {
            return Ok(Idl::all());
        };
        let Some((ai, effective)) = self.indexes.index_param(attr, kind) else {
            tracing::trace!(event = "FILTER_UNINDEXED", attr, kind = ?kind);
            return self.presence_candidates(attr);
        };
        let Some((rule, key_kind)) = rule_for(&desc, effective) else {
            return self.presence_candidates(attr);
        };
        let keys = rule.assertion_keys(key_kind, assertion, self.indexes.params());
        if keys.is_empty() {
            return self.presence_candidates(attr);
        }
        self.keyed_candidates(ai, effective, &keys)
    }

    fn equality_candidates(&self, ava: &Ava) -> FilterResult<Idl> {
        if let Some(desc) = self.schema.attribute(&ava.attr) {
            if self.is_entry_dn(&desc) {
                return self.dn_candidates(DnRelation::Exact, &ava.value);
            }
        }
        self.rule_candidates(
            &ava.attr,
            IndexMask::EQUALITY,
            |desc, _| desc.equality().map(|r| (&**r, KeyKind::Equality)),
            Assertion::Value(&ava.value),
        )
    }

    fn approx_candidates(&self, ava: &Ava) -> FilterResult<Idl> {
        self.rule_candidates(
            &ava.attr,
            IndexMask::APPROX,
            |desc, effective| {
                if effective == IndexMask::APPROX {
                    desc.approx().map(|r| (&**r, KeyKind::Approx))
                } else {
                    desc.equality().map(|r| (&**r, KeyKind::Equality))
                }
            },
            Assertion::Value(&ava.value),
        )
    }

    fn substring_candidates(&self, sa: &SubstringAssertion) -> FilterResult<Idl> {
        self.rule_candidates(
            &sa.attr,
            IndexMask::SUBSTR,
            |desc, _| desc.substr().map(|r| (&**r, KeyKind::Substr)),
            Assertion::Substrings(&sa.pieces),
        )
    }

    fn inequality_candidates(&self, ava: &Ava, greater: bool) -> FilterResult<Idl> {
        if self.schema.attribute(&ava.attr).is_none() {
            return Ok(Idl::all());
        }
        let Some((ai, _)) = self.indexes.index_param(&ava.attr, IndexMask::ORDERED) else {
            return self.presence_candidates(&ava.attr);
        };
        let Some(rule) = ai.desc().ordering() else {
            return self.presence_candidates(&ava.attr);
        };
        let keys = rule.assertion_keys(KeyKind::Ordered, Assertion::Value(&ava.value), self.indexes.params());
        let Some(key) = keys.first() else {
            return self.presence_candidates(&ava.attr);
        };
        let ids = if greater {
            self.indexes.lookup_range(self.txn, ai, Some(key), None)?
        } else {
            self.indexes.lookup_range(self.txn, ai, None, Some(key))?
        };
        Ok(ids)
    }

    fn dn_candidates(&self, relation: DnRelation, value: &[u8]) -> FilterResult<Idl> {
        let Some(dn) = std::str::from_utf8(value).ok().and_then(|s| Dn::parse(s).ok()) else {
            return Ok(Idl::empty());
        };
        if relation == DnRelation::Superior {
            return Ok(self.names.superiors(self.txn, &dn)?);
        }
        let id = match self.names.lookup(self.txn, &dn, false) {
            Ok(DnMatch::Exact { id, .. }) => id,
            Ok(DnMatch::Closest { .. }) => return Ok(Idl::empty()),
            Err(e) if e.is_not_found() => return Ok(Idl::empty()),
            Err(e) => return Err(e.into()),
        };
        let scope = match relation {
            DnRelation::Exact => return Ok(Idl::singleton(id)),
            DnRelation::Subtree if dn.nname() == self.names.suffix().nname() => return Ok(Idl::all()),
            DnRelation::Subtree => Scope::Subtree,
            DnRelation::OneLevel => Scope::OneLevel,
            DnRelation::Subordinate => Scope::Subordinate,
            DnRelation::Superior => return Ok(Idl::empty()),
        };
        Ok(self.names.scope_ids(self.txn, id, scope)?)
    }

    fn extensible_candidates(&self, mra: &MatchingRuleAssertion) -> FilterResult<Idl> {
        if mra.dn_attributes {
            return Ok(Idl::all());
        }
        let Some(desc) = mra.attr.as_deref().and_then(|a| self.schema.attribute(a)) else {
            return Ok(Idl::all());
        };
        if let Some(component) = &mra.component {
            return self.component_candidates(&desc, component);
        }
        let rule = match mra.rule.as_deref() {
            Some(name) => match self.schema.matching_rule(name) {
                Some(rule) => Some(rule),
                None => return Ok(Idl::all()),
            },
            None => None,
        };

        if let Some(relation) = rule.as_ref().and_then(|r| r.dn_relation()) {
            if self.is_entry_dn(&desc) {
                return self.dn_candidates(relation, &mra.value);
            }
        }
        let own_equality = match (&rule, desc.equality()) {
            (None, _) => true,
            (Some(rule), Some(eq)) => rule.name().eq_ignore_ascii_case(eq.name()),
            (Some(_), None) => false,
        };
        if own_equality {
            return self.equality_candidates(&Ava::new(desc.name(), mra.value.clone()));
        }
        Ok(Idl::all())
    }

    fn component_candidates(&self, desc: &AttrDesc, filter: &ComponentFilter) -> FilterResult<Idl> {
        let (Some((ai, _)), Some(component)) = (
            self.indexes.index_param(desc.name(), IndexMask::COMPONENT),
            self.indexes.component_index(),
        ) else {
            return Ok(Idl::all());
        };
        match filter {
            ComponentFilter::Not(_) => Ok(Idl::all()),
            ComponentFilter::And(children) => {
                let mut ids = Idl::all();
                for child in children {
                    ids.intersect_with(&self.component_candidates(desc, child)?);
                    if ids.is_empty() {
                        break;
                    }
                }
                Ok(ids)
            }
            ComponentFilter::Or(children) => {
                let mut ids = Idl::empty();
                for child in children {
                    ids.union_with(&self.component_candidates(desc, child)?);
                }
                Ok(ids)
            }
            ComponentFilter::Item(item) => match component.assertion_keys(desc, item) {
                Some(keys) if !keys.is_empty() => self.keyed_candidates(ai, IndexMask::COMPONENT, &keys),
                _ => Ok(Idl::all()),
            },
        }
    }
}
