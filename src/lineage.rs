//! Ancestor walks and tree queries over the dataset cache.
//!
//! A lineage tree is the set of datasets sharing one root. Everything here is
//! built on [`DatasetCache::base_of`], so the store is only touched on cache misses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::DatasetCache;
use crate::construct::{Dataset, StateTypeRef};
use crate::datatype::{DatasetId, StateId};
use crate::error::{LineageError, Result};

enum Step {
    Start(Arc<Dataset>),
    After(Arc<Dataset>),
    Done,
}

/// Iterator over a dataset and its ancestors, nearest first, ending at the root.
///
/// The walk takes at most `max_depth` base hops; one more is reported as an
/// integrity error, which is how a cyclic base chain shows up.
pub struct Ancestry<'c> {
    cache: &'c DatasetCache,
    start: DatasetId,
    step: Step,
    hops: usize,
}

impl<'c> Ancestry<'c> {
    pub fn new(cache: &'c DatasetCache, start: Arc<Dataset>) -> Self {
        Self {
            cache,
            start: start.id(),
            step: Step::Start(start),
            hops: 0,
        }
    }
}

impl Iterator for Ancestry<'_> {
    type Item = Result<Arc<Dataset>>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = match std::mem::replace(&mut self.step, Step::Done) {
            Step::Done => return None,
            Step::Start(node) => node,
            Step::After(previous) => match self.cache.base_of(&previous) {
                Ok(Some(base)) => {
                    self.hops += 1;
                    if self.hops > self.cache.max_depth() {
                        return Some(Err(LineageError::Integrity(format!(
                            "ancestry of dataset {} exceeds {} hops; its base chain may be cyclic",
                            self.start,
                            self.cache.max_depth()
                        ))));
                    }
                    base
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            },
        };
        self.step = Step::After(Arc::clone(&node));
        Some(Ok(node))
    }
}

/// Tree queries borrowing a dataset cache.
pub struct Lineage<'c> {
    datasets: &'c DatasetCache,
}

impl<'c> Lineage<'c> {
    pub fn new(datasets: &'c DatasetCache) -> Self {
        Self { datasets }
    }

    pub fn closest_ancestor_of_type<'a>(
        &self,
        dataset: &Arc<Dataset>,
        state_type: impl Into<StateTypeRef<'a>>,
    ) -> Result<Arc<Dataset>> {
        self.datasets.closest_ancestor_of_type(dataset, state_type)
    }

    /// True if `node` or one of its ancestors is in `tree`.
    pub fn in_tree(&self, node: &Arc<Dataset>, tree: &HashSet<DatasetId>) -> Result<bool> {
        for ancestor in self.datasets.ancestry(Arc::clone(node)) {
            if tree.contains(&ancestor?.id()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Ids of every cached dataset in the same tree as `start`.
    ///
    /// Only datasets already in the cache are considered, so run the bulk index
    /// first. Membership is memoized for the duration of the call: a walk stops at
    /// the first node already classified and its verdict is copied down the path.
    pub fn tree_members(&self, start: &Arc<Dataset>) -> Result<HashSet<DatasetId>> {
        let mut membership: HashMap<DatasetId, bool> = HashMap::new();
        for node in self.datasets.ancestry(Arc::clone(start)) {
            membership.insert(node?.id(), true);
        }
        for candidate in self.datasets.snapshot()? {
            if membership.contains_key(&candidate.id()) {
                continue;
            }
            let mut path = Vec::new();
            let mut verdict = false; // a root we have not seen is another tree
            for node in self.datasets.ancestry(candidate) {
                let id = node?.id();
                if let Some(&known) = membership.get(&id) {
                    verdict = known;
                    break;
                }
                path.push(id);
            }
            for id in path {
                membership.insert(id, verdict);
            }
        }
        Ok(membership
            .into_iter()
            .filter_map(|(id, member)| member.then_some(id))
            .collect())
    }

    pub fn tree_size(&self, start: &Arc<Dataset>) -> Result<usize> {
        Ok(self.tree_members(start)?.len())
    }

    /// For each dataset id, the state id of its closest ancestor of the given type.
    /// The null id maps to `None` without a lookup; any other id must have such an
    /// ancestor.
    pub fn state_ids_of_type<'a>(
        &self,
        ids: &[DatasetId],
        state_type: impl Into<StateTypeRef<'a>>,
    ) -> Result<Vec<Option<StateId>>> {
        let state_type = state_type.into();
        ids.iter()
            .map(|id| {
                if id.is_null() {
                    return Ok(None);
                }
                let dataset = self.datasets.resolve(*id)?;
                let ancestor = self
                    .datasets
                    .closest_ancestor_of_type(&dataset, state_type.clone())?;
                Ok(Some(ancestor.state()))
            })
            .collect()
    }
}
