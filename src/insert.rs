//! Turning submitted entries into state and dataset rows.
//!
//! Entries arrive as JSON documents:
//!
//! ```json
//! {"hash": "…", "time": "2019-11-05-14:03:27.123456", "state": {"type": "gains", …}}
//! {"hash": "…", "time": "…", "ds": {"state": "…", "is_root": false, "base_dset": "…", "types": ["gains"]}}
//! ```
//!
//! Every write is get-or-create, so submitting an entry twice is harmless.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::datatype::{DatasetId, Payload, StateId, parse_timestamp};
use crate::error::{LineageError, Missing, Result};
use crate::persist::{DatasetRow, Store};

/// Outcome of inserting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Created,
    Existing,
    /// A current-state entry named a state that is not stored.
    Missing,
}

impl Inserted {
    fn from_created(created: bool) -> Self {
        if created {
            Inserted::Created
        } else {
            Inserted::Existing
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Content address; derived from the payload when absent.
    #[serde(default)]
    pub hash: Option<StateId>,
    pub time: String,
    /// The payload. Absent for an entry that only moves the current-state pointer.
    #[serde(default)]
    pub state: Option<Payload>,
}

impl StateEntry {
    pub fn id(&self) -> Result<StateId> {
        let id = match (&self.hash, &self.state) {
            (Some(hash), _) => *hash,
            (None, Some(payload)) => StateId::digest(payload.to_string().as_bytes()),
            (None, None) => {
                return Err(LineageError::Validation(
                    "a current-state entry needs the hash of its state".into(),
                ));
            }
        };
        if id.is_null() {
            return Err(LineageError::Validation("state entries cannot use the null id".into()));
        }
        Ok(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub state: StateId,
    pub is_root: bool,
    #[serde(default)]
    pub base_dset: Option<DatasetId>,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Content address; derived from `ds` when absent.
    #[serde(default)]
    pub hash: Option<DatasetId>,
    pub time: String,
    pub ds: DatasetSpec,
}

impl DatasetEntry {
    pub fn id(&self) -> Result<DatasetId> {
        let id = match self.hash {
            Some(hash) => hash,
            None => {
                let bytes = serde_json::to_vec(&self.ds)
                    .map_err(|e| LineageError::Validation(format!("dataset entry: {e}")))?;
                DatasetId::digest(&bytes)
            }
        };
        if id.is_null() {
            return Err(LineageError::Validation("dataset entries cannot use the null id".into()));
        }
        Ok(id)
    }
}

fn state_type_name(payload: &Payload) -> Result<&str> {
    payload
        .get("type")
        .and_then(Payload::as_str)
        .ok_or_else(|| LineageError::Validation("state payload needs a string 'type'".into()))
}

pub fn insert_state(store: &mut dyn Store, entry: &StateEntry) -> Result<Inserted> {
    let id = entry.id()?;
    let time = parse_timestamp(&entry.time)?;
    match &entry.state {
        None => {
            if !store.state_exists(id)? {
                warn!(%id, "current state names an unknown state");
                return Ok(Inserted::Missing);
            }
            Ok(Inserted::from_created(store.add_current_state(id, time)?))
        }
        Some(payload) => {
            let (state_type, _) = store.get_or_create_state_type(state_type_name(payload)?)?;
            let created = store.add_state(id, Some(state_type.id()), payload, time)?;
            debug!(%id, state_type = state_type.name(), created, "state inserted");
            Ok(Inserted::from_created(created))
        }
    }
}

pub fn insert_dataset(store: &mut dyn Store, entry: &DatasetEntry) -> Result<Inserted> {
    let id = entry.id()?;
    let time = parse_timestamp(&entry.time)?;
    let ds = &entry.ds;
    match (ds.is_root, ds.base_dset) {
        (true, Some(base)) => {
            return Err(LineageError::Validation(format!(
                "root dataset {id} cannot have base {base}"
            )));
        }
        (false, None) => {
            return Err(LineageError::Validation(format!(
                "dataset {id} is not a root and needs a base"
            )));
        }
        (false, Some(base)) => {
            if !store.dataset_exists(base)? {
                warn!(%id, %base, "dataset names an unknown base");
                return Err(LineageError::NotFound(Missing::Dataset(base)));
            }
        }
        (true, None) => {}
    }
    if !store.state_exists(ds.state)? {
        warn!(%id, state = %ds.state, "dataset names an unknown state");
        return Err(LineageError::NotFound(Missing::State(ds.state)));
    }
    let created = store.add_dataset(&DatasetRow {
        id,
        root: ds.is_root,
        state: ds.state,
        time,
        base_dataset: ds.base_dset,
        state_type: None,
    })?;
    for name in &ds.types {
        let (state_type, _) = store.get_or_create_state_type(name)?;
        store.attach_type(id, state_type.id())?;
    }
    debug!(%id, created, "dataset inserted");
    Ok(Inserted::from_created(created))
}
