//! Candidate search and tree verification.

use crate::dn::{DnError, DnMatch, Scope, ScopeWalk, ROOT_ID};
use crate::filter::{CandidateEvaluator, Filter};
use crate::idl::{Id, Idl};
use crate::kv::{Environment, ReadTxn};

use super::{CoreResult, Store};

impl<E: Environment> Store<E> {
    fn evaluator<'a, T: ReadTxn + ?Sized>(&'a self, txn: &'a T) -> CandidateEvaluator<'a, T> {
        CandidateEvaluator::new(txn, &self.names, &self.indexes, &*self.schema, &self.config.entry_dn_attr)
    }

    /// Index candidates for `filter`, bounded by the last allocated
    /// identifier.
    pub fn evaluate_filter<T: ReadTxn + ?Sized>(&self, txn: &T, filter: &Filter) -> CoreResult<Idl> {
        let last = self.last_id(txn)?;
        Ok(self.evaluator(txn).candidates(filter, last)?)
    }

    /// Lazily walks the identifiers in `scope` around `base`.
    ///
    /// Children of a level come before any of their descendants. The walk
    /// stops after the first storage error it yields.
    pub fn scope_enumerate<'t, T: ReadTxn + ?Sized>(&self, txn: &'t T, base: Id, scope: Scope) -> ScopeWalk<'t, T> {
        self.names.walk(txn, base, scope)
    }

    /// Candidates for `filter` restricted to `scope` around `base`.
    ///
    /// Small candidate sets are classified by parent chain; large ones are
    /// intersected with the enumerated scope.
    pub fn scope_candidates<T: ReadTxn + ?Sized>(
        &self,
        txn: &T,
        base: Id,
        scope: Scope,
        filter: &Filter,
    ) -> CoreResult<Idl> {
        let candidates = self.evaluate_filter(txn, filter)?;
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let size = self.names.subtree_size(txn, base)?;
        let ids = if candidates.is_range() || candidates.len() > size {
            let mut ids = self.names.scope_ids(txn, base, scope)?;
            ids.intersect_with(&candidates);
            ids
        } else {
            self.names.classify(txn, &candidates, base, scope)?
        };
        tracing::debug!(
            event = "SEARCH_CANDIDATES",
            base,
            scope = ?scope,
            candidates = candidates.len(),
            found = ids.len()
        );
        Ok(ids)
    }

    /// Verifies every tree node below the suffix and that each one has a
    /// stored record. Returns the number of records checked.
    pub fn check_tree<T: ReadTxn + ?Sized>(&self, txn: &T) -> CoreResult<u64> {
        let top = match self.names.lookup(txn, self.suffix(), false) {
            Ok(DnMatch::Exact { id, .. }) => id,
            Ok(DnMatch::Closest { .. }) => return Ok(0),
            Err(e) if e.is_not_found() => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut checked = 0u64;
        for id in self.names.walk(txn, top, Scope::Subtree) {
            let id = id?;
            self.names.check_node(txn, id)?;
            if self.primary.get(txn, id)?.is_none() {
                return Err(DnError::corrupt(id, "no stored record").into());
            }
            checked += 1;
        }
        let total = self.names.subtree_size(txn, ROOT_ID)?;
        if checked != total {
            return Err(DnError::corrupt(ROOT_ID, format!("walk found {checked} records, tree counts {total}")).into());
        }
        tracing::info!(event = "TREE_CHECK", records = checked);
        Ok(checked)
    }
}
