use std::sync::Arc;

// used to keep the one-to-one mapping between state type names and their identities
use bimap::BiMap;

// keepers use HashMap with a fast non-cryptographic hasher
use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use seahash::SeaHasher;

// used to print out readable forms of a construct
use std::fmt;

use chrono::{DateTime, Utc};

// our own stuff that we need
use crate::datatype::{DatasetId, Payload, StateId, StateTypeId};
use crate::error::{LineageError, Result};

pub type ContentHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

// ------------- DatasetStateType -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetStateType {
    id: StateTypeId,
    name: String,
}

impl DatasetStateType {
    pub fn new(id: StateTypeId, name: String) -> Self {
        Self { id, name }
    }
    // Fields are only exposed through getters so that a kept
    // construct cannot change identity after creation.
    pub fn id(&self) -> StateTypeId {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
}
impl fmt::Display for DatasetStateType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<DatasetStateType: {}>", self.name)
    }
}

/// A state type given either by name or as an already resolved construct.
#[derive(Debug, Clone)]
pub enum StateTypeRef<'a> {
    Name(&'a str),
    Resolved(Arc<DatasetStateType>),
}
impl StateTypeRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            StateTypeRef::Name(name) => name,
            StateTypeRef::Resolved(state_type) => state_type.name(),
        }
    }
}
impl<'a> From<&'a str> for StateTypeRef<'a> {
    fn from(name: &'a str) -> Self {
        StateTypeRef::Name(name)
    }
}
impl<'a> From<&'a String> for StateTypeRef<'a> {
    fn from(name: &'a String) -> Self {
        StateTypeRef::Name(name)
    }
}
impl From<Arc<DatasetStateType>> for StateTypeRef<'_> {
    fn from(state_type: Arc<DatasetStateType>) -> Self {
        StateTypeRef::Resolved(state_type)
    }
}

// ------------- DatasetState -------------
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetState {
    id: StateId,
    state_type: Option<Arc<DatasetStateType>>,
    time: Option<DateTime<Utc>>,
    data: Option<Payload>, // absent when only metadata was loaded
}

impl DatasetState {
    pub fn new(
        id: StateId,
        state_type: Option<Arc<DatasetStateType>>,
        time: Option<DateTime<Utc>>,
        data: Option<Payload>,
    ) -> Self {
        Self {
            id,
            state_type,
            time,
            data,
        }
    }
    pub fn id(&self) -> StateId {
        self.id
    }
    pub fn state_type(&self) -> Option<&Arc<DatasetStateType>> {
        self.state_type.as_ref()
    }
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }
    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }
    pub fn is_full(&self) -> bool {
        self.data.is_some()
    }
    pub fn has_type(&self, state_type: &DatasetStateType) -> bool {
        self.state_type
            .as_ref()
            .is_some_and(|own| own.id() == state_type.id())
    }
}
impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.state_type {
            Some(state_type) => write!(f, "<DatasetState[{}]: {}>", state_type.name(), self.id),
            None => write!(f, "<DatasetState: {}>", self.id),
        }
    }
}

// ------------- Dataset -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    id: DatasetId,
    root: bool,
    state: StateId,
    time: DateTime<Utc>,
    base_dataset: Option<DatasetId>,
    state_type: Option<String>, // name of the type of its own state, for display
}

impl Dataset {
    /// Builds a dataset, refusing rows where `root` and the presence of a base disagree.
    pub fn new(
        id: DatasetId,
        root: bool,
        state: StateId,
        time: DateTime<Utc>,
        base_dataset: Option<DatasetId>,
        state_type: Option<String>,
    ) -> Result<Self> {
        if root != base_dataset.is_none() {
            return Err(LineageError::Integrity(format!(
                "dataset {id} has root = {root} but base dataset {base_dataset:?}"
            )));
        }
        Ok(Self {
            id,
            root,
            state,
            time,
            base_dataset,
            state_type,
        })
    }
    pub fn id(&self) -> DatasetId {
        self.id
    }
    pub fn root(&self) -> bool {
        self.root
    }
    pub fn state(&self) -> StateId {
        self.state
    }
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }
    pub fn base_dataset(&self) -> Option<DatasetId> {
        self.base_dataset
    }
    pub fn state_type(&self) -> Option<&str> {
        self.state_type.as_deref()
    }
}
impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.state_type {
            Some(name) => write!(f, "<Dataset[{}]: {}>", name, self.id),
            None => write!(f, "<Dataset: {}>", self.id),
        }
    }
}

// ------------- Keepers -------------
#[derive(Debug, Default)]
pub struct StateTypeKeeper {
    names: BiMap<String, StateTypeId>,
    kept: HashMap<StateTypeId, Arc<DatasetStateType>, OtherHasher>, // double indexing, but types are few
}
impl StateTypeKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn keep(&mut self, state_type: DatasetStateType) -> (Arc<DatasetStateType>, bool) {
        match self.kept.entry(state_type.id()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), true),
            Entry::Vacant(e) => {
                self.names
                    .insert(state_type.name().to_owned(), state_type.id());
                (Arc::clone(e.insert(Arc::new(state_type))), false)
            }
        }
    }
    pub fn get(&self, name: &str) -> Option<Arc<DatasetStateType>> {
        self.names
            .get_by_left(name)
            .and_then(|id| self.kept.get(id))
            .map(Arc::clone)
    }
    pub fn lookup(&self, id: &StateTypeId) -> Option<Arc<DatasetStateType>> {
        self.kept.get(id).map(Arc::clone)
    }
    pub fn name_of(&self, id: &StateTypeId) -> Option<&str> {
        self.names.get_by_right(id).map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct StateKeeper {
    kept: HashMap<StateId, Arc<DatasetState>, ContentHasher>,
}
impl StateKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    /// First resolution wins.
    pub fn keep(&mut self, state: DatasetState) -> (Arc<DatasetState>, bool) {
        match self.kept.entry(state.id()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), true),
            Entry::Vacant(e) => (Arc::clone(e.insert(Arc::new(state))), false),
        }
    }
    /// Like `keep`, but a full state replaces a kept metadata-only one.
    pub fn upgrade(&mut self, state: DatasetState) -> Arc<DatasetState> {
        match self.kept.entry(state.id()) {
            Entry::Occupied(mut e) => {
                if !e.get().is_full() && state.is_full() {
                    e.insert(Arc::new(state));
                }
                Arc::clone(e.get())
            }
            Entry::Vacant(e) => Arc::clone(e.insert(Arc::new(state))),
        }
    }
    pub fn get(&self, id: &StateId) -> Option<Arc<DatasetState>> {
        self.kept.get(id).map(Arc::clone)
    }
    pub fn contains(&self, id: &StateId) -> bool {
        self.kept.contains_key(id)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DatasetKeeper {
    kept: HashMap<DatasetId, Arc<Dataset>, ContentHasher>,
    // resolved base datasets, keyed by the child
    bases: HashMap<DatasetId, Arc<Dataset>, ContentHasher>,
}
impl DatasetKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn keep(&mut self, dataset: Dataset) -> (Arc<Dataset>, bool) {
        match self.kept.entry(dataset.id()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), true),
            Entry::Vacant(e) => (Arc::clone(e.insert(Arc::new(dataset))), false),
        }
    }
    pub fn get(&self, id: &DatasetId) -> Option<Arc<Dataset>> {
        self.kept.get(id).map(Arc::clone)
    }
    pub fn link(&mut self, child: DatasetId, base: Arc<Dataset>) {
        self.bases.entry(child).or_insert(base);
    }
    pub fn base(&self, child: &DatasetId) -> Option<Arc<Dataset>> {
        self.bases.get(child).map(Arc::clone)
    }
    pub fn datasets(&self) -> Vec<Arc<Dataset>> {
        self.kept.values().map(Arc::clone).collect()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}
