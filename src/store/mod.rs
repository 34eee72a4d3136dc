//! Store façade
//!
//! Ties the name index, record codec, side table, attribute indexes and
//! candidate evaluator to one key-value environment. Every operation takes
//! the caller's transaction; [`Store::read`] and [`Store::write`] are
//! scoped helpers for callers that do not manage transactions themselves.
//!
//! # Invariants
//!
//! - A record's tree nodes, primary image, side values and index entries
//!   are written in the same write transaction
//! - An aborted write leaves no interned attribute behind in memory
//! - Identifiers are never reused

mod records;
mod search;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::dn::{Dn, DnMatch, NameIndex};
use crate::filter::ComponentIndex;
use crate::idl::Id;
use crate::index::IndexManager;
use crate::kv::{Environment, ReadTxn, WriteTxn};
use crate::record::{NextId, PrimaryStore, RecordCodec, SideTable};
use crate::schema::{AdTable, Schema};

pub use crate::error::{CoreError, CoreResult, ErrorKind, Severity};
pub use records::{ModOp, Modification};

/// One directory suffix over one environment.
pub struct Store<E: Environment> {
    env: E,
    config: EngineConfig,
    schema: Arc<dyn Schema>,
    ads: Arc<AdTable>,
    names: NameIndex,
    primary: PrimaryStore,
    side: SideTable,
    indexes: IndexManager,
    next_id: NextId,
}

impl<E: Environment> Store<E> {
    /// Opens every key space and loads the interning table.
    pub fn open(env: E, config: EngineConfig, schema: Arc<dyn Schema>) -> CoreResult<Self> {
        config.validate()?;
        let suffix = config.suffix_dn()?;

        let ads = Arc::new(AdTable::open(&env, Arc::clone(&schema))?);
        let names = NameIndex::open(&env, suffix)?;
        let primary = PrimaryStore::open(&env)?;
        let side = SideTable::open(&env, Arc::clone(&ads))?;
        let indexes = IndexManager::open(
            &env,
            &*schema,
            &config.indexes,
            config.substr.clone(),
            config.idl_db_max,
        )?;
        {
            let txn = env.begin_read()?;
            ads.refresh(&txn)?;
        }

        tracing::info!(
            event = "STORE_OPEN",
            suffix = names.suffix().nname(),
            indexes = indexes.len(),
            interned = ads.len()
        );
        Ok(Self {
            env,
            config,
            schema,
            ads,
            names,
            primary,
            side,
            indexes,
            next_id: NextId::new(),
        })
    }

    /// Installs the key generator used by component indexes.
    pub fn with_component_index(mut self, component: Arc<dyn ComponentIndex>) -> Self {
        self.indexes = self.indexes.with_component_index(component);
        self
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<dyn Schema> {
        &self.schema
    }

    pub fn names(&self) -> &NameIndex {
        &self.names
    }

    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    pub fn ad_table(&self) -> &AdTable {
        &self.ads
    }

    pub fn suffix(&self) -> &Dn {
        self.names.suffix()
    }

    fn codec(&self) -> RecordCodec<'_> {
        RecordCodec::new(&self.ads, &self.config.multival, self.config.max_record_size)
    }

    /// Runs `f` in a read snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&E::Read) -> CoreResult<R>) -> CoreResult<R> {
        let txn = self.env.begin_read()?;
        f(&txn)
    }

    /// Runs `f` in the write transaction, committing on success.
    ///
    /// On failure the transaction is dropped, interning-table entries it
    /// added are forgotten and the identifier counter is reseeded.
    pub fn write<R>(&self, f: impl FnOnce(&mut E::Write) -> CoreResult<R>) -> CoreResult<R> {
        let mark = self.ads.mark();
        let mut txn = self.env.begin_write()?;
        let outcome = f(&mut txn).and_then(|value| {
            txn.commit()?;
            Ok(value)
        });
        if let Err(e) = &outcome {
            self.ads.unwind(mark);
            self.next_id.invalidate();
            tracing::debug!(event = "STORE_WRITE_ABORT", code = e.code(), kind = %e.kind());
        }
        outcome
    }

    /// Resolves `dn` to its identifier, or to its closest existing ancestor
    /// when `closest` is set.
    pub fn dn_to_id<T: ReadTxn + ?Sized>(&self, txn: &T, dn: &Dn, closest: bool) -> CoreResult<DnMatch> {
        Ok(self.names.lookup(txn, dn, closest)?)
    }

    /// Allocates an identifier for a new record.
    pub fn next_id<T: WriteTxn + ?Sized>(&self, txn: &T) -> CoreResult<Id> {
        Ok(self.next_id.assign(txn, &self.primary)?)
    }

    /// Highest identifier allocated or stored.
    pub fn last_id<T: ReadTxn + ?Sized>(&self, txn: &T) -> CoreResult<Id> {
        Ok(self.next_id.last_assigned(txn, &self.primary)?)
    }

    /// Forgets the cached identifier counter, e.g. after a bulk load that
    /// bypassed this store.
    pub fn invalidate_next_id(&self) {
        self.next_id.invalidate();
    }
}

impl<E: Environment> std::fmt::Debug for Store<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("suffix", &self.names.suffix().nname())
            .field("indexes", &self.indexes.len())
            .field("ads", &self.ads)
            .finish()
    }
}
