#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use dataset_lineage::construct::DatasetStateType;
use dataset_lineage::datatype::{DatasetId, Payload, StateId, StateTypeId};
use dataset_lineage::persist::{DatasetRow, Persistor, StateRow, Store};
use dataset_lineage::{Catalog, LineageError, Result};

/// Wraps a store and counts every round trip made through it. While `offline` is
/// set every call is counted and then fails as if the connection were down.
pub struct CountingStore<S> {
    inner: S,
    calls: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
}

impl<S: Store> CountingStore<S> {
    pub fn new(inner: S) -> (Self, Arc<AtomicUsize>) {
        let (store, calls, _) = Self::with_outage(inner);
        (store, calls)
    }
    pub fn with_outage(inner: S) -> (Self, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let offline = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                calls: Arc::clone(&calls),
                offline: Arc::clone(&offline),
            },
            calls,
            offline,
        )
    }
    fn tick(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(LineageError::StoreUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

impl<S: Store> Store for CountingStore<S> {
    fn state_type_by_name(&mut self, name: &str) -> Result<Option<DatasetStateType>> {
        self.tick()?;
        self.inner.state_type_by_name(name)
    }
    fn state_type_by_id(&mut self, id: StateTypeId) -> Result<Option<DatasetStateType>> {
        self.tick()?;
        self.inner.state_type_by_id(id)
    }
    fn get_or_create_state_type(&mut self, name: &str) -> Result<(DatasetStateType, bool)> {
        self.tick()?;
        self.inner.get_or_create_state_type(name)
    }
    fn state(&mut self, id: StateId, full: bool) -> Result<Option<StateRow>> {
        self.tick()?;
        self.inner.state(id, full)
    }
    fn state_exists(&mut self, id: StateId) -> Result<bool> {
        self.tick()?;
        self.inner.state_exists(id)
    }
    fn dataset(&mut self, id: DatasetId) -> Result<Option<DatasetRow>> {
        self.tick()?;
        self.inner.dataset(id)
    }
    fn dataset_exists(&mut self, id: DatasetId) -> Result<bool> {
        self.tick()?;
        self.inner.dataset_exists(id)
    }
    fn attached_types(&mut self, dataset: DatasetId) -> Result<Vec<StateTypeId>> {
        self.tick()?;
        self.inner.attached_types(dataset)
    }
    fn current_state(&mut self) -> Result<Option<(StateId, DateTime<Utc>)>> {
        self.tick()?;
        self.inner.current_state()
    }
    fn all_state_types(&mut self) -> Result<Vec<DatasetStateType>> {
        self.tick()?;
        self.inner.all_state_types()
    }
    fn all_states(&mut self) -> Result<Vec<StateRow>> {
        self.tick()?;
        self.inner.all_states()
    }
    fn all_datasets(&mut self) -> Result<Vec<DatasetRow>> {
        self.tick()?;
        self.inner.all_datasets()
    }
    fn add_state(
        &mut self,
        id: StateId,
        state_type: Option<StateTypeId>,
        data: &Payload,
        time: DateTime<Utc>,
    ) -> Result<bool> {
        self.tick()?;
        self.inner.add_state(id, state_type, data, time)
    }
    fn add_dataset(&mut self, row: &DatasetRow) -> Result<bool> {
        self.tick()?;
        self.inner.add_dataset(row)
    }
    fn attach_type(&mut self, dataset: DatasetId, state_type: StateTypeId) -> Result<bool> {
        self.tick()?;
        self.inner.attach_type(dataset, state_type)
    }
    fn add_current_state(&mut self, state: StateId, time: DateTime<Utc>) -> Result<bool> {
        self.tick()?;
        self.inner.add_current_state(state, time)
    }
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

pub fn dataset_id(label: &str) -> DatasetId {
    DatasetId::digest(label.as_bytes())
}

pub fn state_id(label: &str) -> StateId {
    StateId::digest(label.as_bytes())
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
}

/// Writes rows straight into an in-memory store, bypassing the insertion checks.
pub struct Seed {
    pub store: Persistor,
    clock: i64,
}

impl Seed {
    pub fn new() -> Self {
        Self {
            store: Persistor::in_memory().unwrap(),
            clock: 0,
        }
    }
    /// Stops the store from enforcing references, so rows can name bases and
    /// states that were never stored.
    pub fn corrupt(self) -> Self {
        self.store
            .connection()
            .execute_batch("pragma foreign_keys = off;")
            .unwrap();
        self
    }
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        at(self.clock)
    }
    /// A state labelled `label` whose type is `type_name`.
    pub fn state(&mut self, label: &str, type_name: &str) -> StateId {
        let (state_type, _) = self.store.get_or_create_state_type(type_name).unwrap();
        let id = state_id(label);
        let time = self.tick();
        self.store
            .add_state(
                id,
                Some(state_type.id()),
                &json!({"type": type_name, "label": label}),
                time,
            )
            .unwrap();
        id
    }
    /// A dataset labelled `label`; a root when `base` is `None`.
    pub fn dataset(&mut self, label: &str, state: StateId, base: Option<&str>) -> DatasetId {
        self.raw_dataset(label, state, base.is_none(), base)
    }
    /// Like `dataset`, but `root` is taken as given even when it disagrees with `base`.
    pub fn raw_dataset(
        &mut self,
        label: &str,
        state: StateId,
        root: bool,
        base: Option<&str>,
    ) -> DatasetId {
        let id = dataset_id(label);
        let time = self.tick();
        self.store
            .add_dataset(&DatasetRow {
                id,
                root,
                state,
                time,
                base_dataset: base.map(dataset_id),
                state_type: None,
            })
            .unwrap();
        id
    }
    /// root (type A) <- mid (type B) <- leaf (type C)
    pub fn chain() -> Self {
        let mut seed = Self::new();
        let a = seed.state("state-a", "A");
        let b = seed.state("state-b", "B");
        let c = seed.state("state-c", "C");
        seed.dataset("root", a, None);
        seed.dataset("mid", b, Some("root"));
        seed.dataset("leaf", c, Some("mid"));
        seed
    }
    /// Two disjoint trees:
    ///
    /// ```text
    /// r1 <- a1 <- a2 <- a3        r2 <- b1 <- b2
    ///        ^
    ///        +--- c1
    /// ```
    pub fn forest() -> Self {
        let mut seed = Self::new();
        let cal = seed.state("cal", "calibration");
        let flag = seed.state("flag", "flagging");
        let other = seed.state("other", "calibration-b");
        seed.dataset("r1", cal, None);
        seed.dataset("a1", flag, Some("r1"));
        seed.dataset("a2", flag, Some("a1"));
        seed.dataset("a3", cal, Some("a2"));
        seed.dataset("c1", flag, Some("a1"));
        seed.dataset("r2", other, None);
        seed.dataset("b1", flag, Some("r2"));
        seed.dataset("b2", flag, Some("b1"));
        seed
    }
    pub fn catalog(self) -> Catalog {
        Catalog::new(self.store)
    }
    pub fn counted(self) -> (Catalog, Arc<AtomicUsize>) {
        let (store, counter) = CountingStore::new(self.store);
        (Catalog::new(store), counter)
    }
    pub fn flaky(self) -> (Catalog, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let (store, counter, offline) = CountingStore::with_outage(self.store);
        (Catalog::new(store), counter, offline)
    }
    pub fn counted_with_max_depth(self, max_depth: usize) -> (Catalog, Arc<AtomicUsize>) {
        let (store, counter) = CountingStore::new(self.store);
        (Catalog::with_max_depth(store, max_depth), counter)
    }
}
