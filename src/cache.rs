//! Read-through caches for state types, states and datasets.
//!
//! Each cache owns a keeper behind its own mutex and shares the store with the
//! others. A keeper lock is never held while the store is queried, so concurrent
//! misses on the same key may both fetch the row; the keeper then hands every
//! caller the construct that was kept first.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::construct::{
    Dataset, DatasetKeeper, DatasetState, DatasetStateType, StateKeeper, StateTypeKeeper,
    StateTypeRef,
};
use crate::datatype::{DatasetId, StateId, StateTypeId};
use crate::error::{LineageError, Missing, Result, lock};
use crate::lineage::Ancestry;
use crate::persist::{DatasetRow, StateRow, Store};

pub type SharedStore = Arc<Mutex<Box<dyn Store>>>;

/// Upper bound on base-dataset hops in a single ancestor walk.
pub const DEFAULT_MAX_DEPTH: usize = 100_000;

// ------------- StateTypeCache -------------
pub struct StateTypeCache {
    store: SharedStore,
    keeper: Mutex<StateTypeKeeper>,
}

impl StateTypeCache {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            keeper: Mutex::new(StateTypeKeeper::new()),
        }
    }
    pub fn resolve_by_name(&self, name: &str) -> Result<Arc<DatasetStateType>> {
        let cached = lock(&self.keeper, "state type cache")?.get(name);
        if let Some(state_type) = cached {
            return Ok(state_type);
        }
        debug!(name, "state type cache miss");
        let found = lock(&self.store, "store")?.state_type_by_name(name)?;
        match found {
            Some(state_type) => self.keep(state_type),
            None => Err(LineageError::NotFound(Missing::StateType(name.to_owned()))),
        }
    }
    pub fn resolve_by_id(&self, id: StateTypeId) -> Result<Arc<DatasetStateType>> {
        let cached = lock(&self.keeper, "state type cache")?.lookup(&id);
        if let Some(state_type) = cached {
            return Ok(state_type);
        }
        debug!(%id, "state type cache miss");
        let found = lock(&self.store, "store")?.state_type_by_id(id)?;
        match found {
            Some(state_type) => self.keep(state_type),
            None => Err(LineageError::NotFound(Missing::StateTypeId(id))),
        }
    }
    pub fn resolve(&self, state_type: &StateTypeRef) -> Result<Arc<DatasetStateType>> {
        match state_type {
            StateTypeRef::Name(name) => self.resolve_by_name(name),
            StateTypeRef::Resolved(state_type) => Ok(Arc::clone(state_type)),
        }
    }
    fn keep(&self, state_type: DatasetStateType) -> Result<Arc<DatasetStateType>> {
        let (kept, _) = lock(&self.keeper, "state type cache")?.keep(state_type);
        Ok(kept)
    }
    pub(crate) fn keep_all(&self, state_types: Vec<DatasetStateType>) -> Result<usize> {
        let mut keeper = lock(&self.keeper, "state type cache")?;
        for state_type in state_types {
            keeper.keep(state_type);
        }
        Ok(keeper.len())
    }
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.keeper, "state type cache")?.len())
    }
}

// ------------- StateCache -------------
pub struct StateCache {
    store: SharedStore,
    types: Arc<StateTypeCache>,
    keeper: Mutex<StateKeeper>,
}

impl StateCache {
    pub fn new(store: SharedStore, types: Arc<StateTypeCache>) -> Self {
        Self {
            store,
            types,
            keeper: Mutex::new(StateKeeper::new()),
        }
    }
    pub fn state_types(&self) -> &Arc<StateTypeCache> {
        &self.types
    }
    /// Resolves a state. A kept metadata-only state is fetched again, once, when the
    /// full payload is asked for; otherwise the kept state is returned as is.
    pub fn resolve(&self, id: StateId, load_full: bool) -> Result<Arc<DatasetState>> {
        if id.is_null() {
            return Err(LineageError::Validation("the null state id cannot be resolved".into()));
        }
        let cached = lock(&self.keeper, "state cache")?.get(&id);
        if let Some(state) = cached {
            if !load_full || state.is_full() {
                return Ok(state);
            }
        }
        debug!(%id, load_full, "state cache miss");
        let found = lock(&self.store, "store")?.state(id, load_full)?;
        let row = found.ok_or(LineageError::NotFound(Missing::State(id)))?;
        let state = self.materialize(row)?;
        let mut keeper = lock(&self.keeper, "state cache")?;
        if load_full {
            Ok(keeper.upgrade(state))
        } else {
            Ok(keeper.keep(state).0)
        }
    }
    /// True if the state is kept or stored. A stored state is not brought into the cache.
    pub fn exists(&self, id: StateId) -> Result<bool> {
        if lock(&self.keeper, "state cache")?.contains(&id) {
            return Ok(true);
        }
        lock(&self.store, "store")?.state_exists(id)
    }
    fn materialize(&self, row: StateRow) -> Result<DatasetState> {
        let state_type = row
            .state_type
            .map(|id| self.types.resolve_by_id(id))
            .transpose()?;
        Ok(DatasetState::new(row.id, state_type, row.time, row.data))
    }
    pub(crate) fn keep_rows(&self, rows: Vec<StateRow>) -> Result<usize> {
        let states = rows
            .into_iter()
            .map(|row| self.materialize(row))
            .collect::<Result<Vec<_>>>()?;
        let mut keeper = lock(&self.keeper, "state cache")?;
        for state in states {
            keeper.keep(state);
        }
        Ok(keeper.len())
    }
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.keeper, "state cache")?.len())
    }
}

// ------------- DatasetCache -------------
pub struct DatasetCache {
    store: SharedStore,
    states: Arc<StateCache>,
    keeper: Mutex<DatasetKeeper>,
    max_depth: usize,
}

impl DatasetCache {
    pub fn new(store: SharedStore, states: Arc<StateCache>, max_depth: usize) -> Self {
        Self {
            store,
            states,
            keeper: Mutex::new(DatasetKeeper::new()),
            max_depth,
        }
    }
    pub fn states(&self) -> &Arc<StateCache> {
        &self.states
    }
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
    pub fn resolve(&self, id: DatasetId) -> Result<Arc<Dataset>> {
        if id.is_null() {
            return Err(LineageError::Validation("the null dataset id cannot be resolved".into()));
        }
        let cached = lock(&self.keeper, "dataset cache")?.get(&id);
        if let Some(dataset) = cached {
            return Ok(dataset);
        }
        debug!(%id, "dataset cache miss");
        let found = lock(&self.store, "store")?.dataset(id)?;
        let row = found.ok_or(LineageError::NotFound(Missing::Dataset(id)))?;
        let dataset = dataset_from_row(row)?;
        Ok(lock(&self.keeper, "dataset cache")?.keep(dataset).0)
    }
    /// Parses `id` before resolving it, so a malformed id never reaches the store.
    pub fn resolve_str(&self, id: &str) -> Result<Arc<Dataset>> {
        self.resolve(id.parse()?)
    }
    pub fn state_of(&self, dataset: &Dataset) -> Result<Arc<DatasetState>> {
        self.states.resolve(dataset.state(), false)
    }
    pub fn base_of(&self, dataset: &Dataset) -> Result<Option<Arc<Dataset>>> {
        if dataset.root() {
            return Ok(None);
        }
        let linked = lock(&self.keeper, "dataset cache")?.base(&dataset.id());
        if linked.is_some() {
            return Ok(linked);
        }
        let base_id = dataset.base_dataset().ok_or_else(|| {
            LineageError::Integrity(format!("non-root dataset {} has no base", dataset.id()))
        })?;
        let base = match self.resolve(base_id) {
            Ok(base) => base,
            Err(LineageError::NotFound(_)) => {
                return Err(LineageError::Integrity(format!(
                    "dataset {} names base {} which is not stored",
                    dataset.id(),
                    base_id
                )));
            }
            Err(e) => return Err(e),
        };
        lock(&self.keeper, "dataset cache")?.link(dataset.id(), Arc::clone(&base));
        Ok(Some(base))
    }
    /// Walks `dataset` and its ancestors until one whose state has the given type.
    pub fn closest_ancestor_of_type<'a>(
        &self,
        dataset: &Arc<Dataset>,
        state_type: impl Into<StateTypeRef<'a>>,
    ) -> Result<Arc<Dataset>> {
        let state_type = state_type.into();
        let missing = || {
            LineageError::NotFound(Missing::Ancestor {
                dataset: dataset.id(),
                state_type: state_type.name().to_owned(),
            })
        };
        let target = match self.states.state_types().resolve(&state_type) {
            Ok(target) => target,
            // a type nobody has stored cannot be attached anywhere
            Err(LineageError::NotFound(_)) => return Err(missing()),
            Err(e) => return Err(e),
        };
        for node in self.ancestry(Arc::clone(dataset)) {
            let node = node?;
            if self.state_of(&node)?.has_type(&target) {
                return Ok(node);
            }
        }
        Err(missing())
    }
    pub fn ancestry(&self, start: Arc<Dataset>) -> Ancestry<'_> {
        Ancestry::new(self, start)
    }
    pub(crate) fn keep_rows(&self, rows: Vec<DatasetRow>) -> Result<Vec<Arc<Dataset>>> {
        let datasets = rows
            .into_iter()
            .map(dataset_from_row)
            .collect::<Result<Vec<_>>>()?;
        let mut keeper = lock(&self.keeper, "dataset cache")?;
        Ok(datasets
            .into_iter()
            .map(|dataset| keeper.keep(dataset).0)
            .collect())
    }
    pub(crate) fn link_all(&self, links: Vec<(DatasetId, Arc<Dataset>)>) -> Result<()> {
        let mut keeper = lock(&self.keeper, "dataset cache")?;
        for (child, base) in links {
            keeper.link(child, base);
        }
        Ok(())
    }
    /// Every dataset kept so far.
    pub fn snapshot(&self) -> Result<Vec<Arc<Dataset>>> {
        Ok(lock(&self.keeper, "dataset cache")?.datasets())
    }
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.keeper, "dataset cache")?.len())
    }
}

fn dataset_from_row(row: DatasetRow) -> Result<Dataset> {
    Dataset::new(
        row.id,
        row.root,
        row.state,
        row.time,
        row.base_dataset,
        row.state_type,
    )
}
