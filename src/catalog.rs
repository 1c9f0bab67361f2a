use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::cache::{DEFAULT_MAX_DEPTH, DatasetCache, SharedStore, StateCache, StateTypeCache};
use crate::config::Settings;
use crate::construct::{Dataset, DatasetState, DatasetStateType, StateTypeRef};
use crate::datatype::{DatasetId, StateId, StateTypeId};
use crate::error::{Result, lock};
use crate::index::{BulkIndexer, IndexSummary};
use crate::insert::{self, DatasetEntry, Inserted, StateEntry};
use crate::lineage::Lineage;
use crate::persist::{Persistor, Store};

// ------------- Catalog -------------
// Owns the store and the caches in front of it for as long as it lives.
pub struct Catalog {
    store: SharedStore,
    types: Arc<StateTypeCache>,
    states: Arc<StateCache>,
    datasets: Arc<DatasetCache>,
    // bulk indexing is run by one caller at a time
    index_lock: Mutex<()>,
}

impl Catalog {
    pub fn new<S: Store + 'static>(store: S) -> Self {
        Self::with_max_depth(store, DEFAULT_MAX_DEPTH)
    }
    pub fn with_max_depth<S: Store + 'static>(store: S, max_depth: usize) -> Self {
        let store: Box<dyn Store> = Box::new(store);
        let store: SharedStore = Arc::new(Mutex::new(store));
        let types = Arc::new(StateTypeCache::new(Arc::clone(&store)));
        let states = Arc::new(StateCache::new(Arc::clone(&store), Arc::clone(&types)));
        let datasets = Arc::new(DatasetCache::new(
            Arc::clone(&store),
            Arc::clone(&states),
            max_depth,
        ));
        Self {
            store,
            types,
            states,
            datasets,
            index_lock: Mutex::new(()),
        }
    }
    /// Opens the configured store and, if asked to, indexes it right away.
    pub fn open(settings: &Settings) -> Result<Self> {
        let persistor = match &settings.database {
            Some(path) => Persistor::open(path)?,
            None => Persistor::in_memory()?,
        };
        let catalog = Self::with_max_depth(persistor, settings.max_depth);
        if settings.index_on_start {
            catalog.build_index()?;
        }
        info!(database = ?settings.database, "catalog opened");
        Ok(catalog)
    }
    // functions to access the owned caches
    pub fn state_types(&self) -> Arc<StateTypeCache> {
        Arc::clone(&self.types)
    }
    pub fn states(&self) -> Arc<StateCache> {
        Arc::clone(&self.states)
    }
    pub fn datasets(&self) -> Arc<DatasetCache> {
        Arc::clone(&self.datasets)
    }
    pub fn lineage(&self) -> Lineage<'_> {
        Lineage::new(&self.datasets)
    }

    pub fn resolve_dataset(&self, id: DatasetId) -> Result<Arc<Dataset>> {
        self.datasets.resolve(id)
    }
    pub fn resolve_state(&self, id: StateId, full: bool) -> Result<Arc<DatasetState>> {
        self.states.resolve(id, full)
    }
    pub fn state_exists(&self, id: StateId) -> Result<bool> {
        self.states.exists(id)
    }
    pub fn resolve_type_by_name(&self, name: &str) -> Result<Arc<DatasetStateType>> {
        self.types.resolve_by_name(name)
    }
    pub fn resolve_type_by_id(&self, id: StateTypeId) -> Result<Arc<DatasetStateType>> {
        self.types.resolve_by_id(id)
    }
    pub fn state_of(&self, dataset: &Dataset) -> Result<Arc<DatasetState>> {
        self.datasets.state_of(dataset)
    }
    pub fn base_of(&self, dataset: &Dataset) -> Result<Option<Arc<Dataset>>> {
        self.datasets.base_of(dataset)
    }
    pub fn closest_ancestor_of_type<'a>(
        &self,
        dataset: &Arc<Dataset>,
        state_type: impl Into<StateTypeRef<'a>>,
    ) -> Result<Arc<Dataset>> {
        self.datasets.closest_ancestor_of_type(dataset, state_type)
    }
    pub fn in_tree(&self, node: &Arc<Dataset>, tree: &HashSet<DatasetId>) -> Result<bool> {
        self.lineage().in_tree(node, tree)
    }
    pub fn tree_size(&self, start: &Arc<Dataset>) -> Result<usize> {
        self.lineage().tree_size(start)
    }
    pub fn state_ids_of_type<'a>(
        &self,
        ids: &[DatasetId],
        state_type: impl Into<StateTypeRef<'a>>,
    ) -> Result<Vec<Option<StateId>>> {
        self.lineage().state_ids_of_type(ids, state_type)
    }
    pub fn build_index(&self) -> Result<IndexSummary> {
        let _serialized = lock(&self.index_lock, "index")?;
        BulkIndexer::new(&self.store, &self.types, &self.states, &self.datasets).build_index()
    }

    /// State types recorded as attached to a dataset.
    pub fn attached_types(&self, dataset: DatasetId) -> Result<Vec<Arc<DatasetStateType>>> {
        let dataset = self.datasets.resolve(dataset)?;
        let ids = lock(&self.store, "store")?.attached_types(dataset.id())?;
        ids.into_iter()
            .map(|id| self.types.resolve_by_id(id))
            .collect()
    }
    /// The most recent current-state pointer and when it was set.
    pub fn current_state(&self) -> Result<Option<(Arc<DatasetState>, DateTime<Utc>)>> {
        let current = lock(&self.store, "store")?.current_state()?;
        match current {
            Some((id, time)) => Ok(Some((self.states.resolve(id, false)?, time))),
            None => Ok(None),
        }
    }

    pub fn insert_state(&self, entry: &StateEntry) -> Result<Inserted> {
        let mut store = lock(&self.store, "store")?;
        insert::insert_state(&mut **store, entry)
    }
    pub fn insert_dataset(&self, entry: &DatasetEntry) -> Result<Inserted> {
        let mut store = lock(&self.store, "store")?;
        insert::insert_dataset(&mut **store, entry)
    }
}
