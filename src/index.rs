//! Bulk prefetch of every state type, state and dataset.
//!
//! Three scans, one store round trip each, regardless of how many rows there are.
//! Base datasets are then wired up from the datasets just kept, so no walk after
//! an index touches the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::cache::{DatasetCache, SharedStore, StateCache, StateTypeCache};
use crate::construct::Dataset;
use crate::datatype::DatasetId;
use crate::error::{LineageError, Result, lock};

/// Cache sizes after an index, and how long it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    pub state_types: usize,
    pub states: usize,
    pub datasets: usize,
    pub elapsed: Duration,
}

pub struct BulkIndexer<'c> {
    store: &'c SharedStore,
    types: &'c StateTypeCache,
    states: &'c StateCache,
    datasets: &'c DatasetCache,
}

impl<'c> BulkIndexer<'c> {
    pub fn new(
        store: &'c SharedStore,
        types: &'c StateTypeCache,
        states: &'c StateCache,
        datasets: &'c DatasetCache,
    ) -> Self {
        Self {
            store,
            types,
            states,
            datasets,
        }
    }

    /// Loads everything. On failure the caches keep whatever was loaded so far;
    /// running the index again is always safe.
    pub fn build_index(&self) -> Result<IndexSummary> {
        let started = Instant::now();

        // types first, so that kept states find their type without a round trip
        let type_rows = lock(self.store, "store")?.all_state_types()?;
        let state_types = self.types.keep_all(type_rows)?;

        let state_rows = lock(self.store, "store")?.all_states()?;
        let states = self.states.keep_rows(state_rows)?;

        let dataset_rows = lock(self.store, "store")?.all_datasets()?;
        let kept = self.datasets.keep_rows(dataset_rows)?;
        let by_id: HashMap<DatasetId, &Arc<Dataset>> =
            kept.iter().map(|dataset| (dataset.id(), dataset)).collect();

        let mut links = Vec::with_capacity(kept.len());
        for dataset in &kept {
            let Some(base_id) = dataset.base_dataset() else {
                continue;
            };
            let base = by_id.get(&base_id).ok_or_else(|| {
                LineageError::Integrity(format!(
                    "dataset {} names base {} which the dataset scan did not return",
                    dataset.id(),
                    base_id
                ))
            })?;
            links.push((dataset.id(), Arc::clone(base)));
        }
        self.datasets.link_all(links)?;

        let summary = IndexSummary {
            state_types,
            states,
            datasets: self.datasets.len()?,
            elapsed: started.elapsed(),
        };
        info!(
            state_types = summary.state_types,
            states = summary.states,
            datasets = summary.datasets,
            ms = summary.elapsed.as_secs_f64() * 1000.0,
            "index built"
        );
        Ok(summary)
    }
}
