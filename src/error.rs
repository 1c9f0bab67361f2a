use std::fmt;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::datatype::{DatasetId, StateId, StateTypeId};

/// What a failed lookup was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Dataset(DatasetId),
    State(StateId),
    StateType(String),
    StateTypeId(StateTypeId),
    Ancestor { dataset: DatasetId, state_type: String },
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Missing::Dataset(id) => write!(f, "dataset {id}"),
            Missing::State(id) => write!(f, "state {id}"),
            Missing::StateType(name) => write!(f, "state type '{name}'"),
            Missing::StateTypeId(id) => write!(f, "state type #{id}"),
            Missing::Ancestor { dataset, state_type } => write!(
                f,
                "ancestor of dataset {dataset} with a state of type '{state_type}'"
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum LineageError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(Missing),
    #[error("Integrity violated: {0}")]
    Integrity(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, LineageError>;

// Helper conversions
impl From<rusqlite::Error> for LineageError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            // a row was read but did not decode into our types
            rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
                Self::Integrity(e.to_string())
            }
            _ => Self::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<config::ConfigError> for LineageError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Locks a cache mutex, turning poisoning into an error instead of a panic.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| LineageError::Lock(what.to_string()))
}
