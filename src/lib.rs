//! Dataset lineage – caches and tree queries over content-addressed datasets.
//!
//! A *dataset* is an immutable node in a lineage tree. It points at exactly one
//! *state* (a typed, content-addressed configuration document) and, unless it is a
//! root, at exactly one *base dataset*. Rows are written once and never change, so
//! everything read from the store can be cached for the life of the process.
//!
//! The questions asked most often are "which is the nearest ancestor of this
//! dataset whose state has type T?" and "do these two datasets belong to the same
//! tree?". Both are walks up the base-dataset chain, and each hop is a cache lookup.
//!
//! ## Modules
//! * [`datatype`] – Content addresses ([`datatype::DatasetId`], [`datatype::StateId`]),
//!   state type ids, timestamps and payloads.
//! * [`construct`] – The dataset, state and state type constructs and the keepers
//!   that own and deduplicate them.
//! * [`persist`] – The [`persist::Store`] seam and its SQLite implementation,
//!   [`persist::Persistor`].
//! * [`cache`] – Read-through caches for state types, states and datasets.
//! * [`index`] – The bulk prefetch that fills all caches in three round trips.
//! * [`lineage`] – Ancestor walks, tree membership and batched ancestor lookups.
//! * [`insert`] – Get-or-create insertion of submitted state and dataset entries.
//! * [`catalog`] – [`catalog::Catalog`], which owns a store and its caches.
//! * [`config`] – Settings loaded from file and environment.
//!
//! ## Quick Start
//! ```
//! use dataset_lineage::catalog::Catalog;
//! use dataset_lineage::insert::{DatasetEntry, DatasetSpec, StateEntry};
//! use dataset_lineage::persist::Persistor;
//! use serde_json::json;
//!
//! let catalog = Catalog::new(Persistor::in_memory().unwrap());
//! let state = StateEntry {
//!     hash: None,
//!     time: "2019-11-05-14:03:27.000000".into(),
//!     state: Some(json!({"type": "gains", "gain": 1.5})),
//! };
//! catalog.insert_state(&state).unwrap();
//! let root = DatasetEntry {
//!     hash: None,
//!     time: "2019-11-05-14:03:28.000000".into(),
//!     ds: DatasetSpec { state: state.id().unwrap(), is_root: true, base_dset: None, types: vec![] },
//! };
//! catalog.insert_dataset(&root).unwrap();
//!
//! let dataset = catalog.resolve_dataset(root.id().unwrap()).unwrap();
//! let found = catalog.closest_ancestor_of_type(&dataset, "gains").unwrap();
//! assert_eq!(found.id(), dataset.id());
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod index;
pub mod insert;
pub mod lineage;
pub mod persist;

pub use catalog::Catalog;
pub use error::{LineageError, Missing, Result};
