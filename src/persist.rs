use chrono::{DateTime, Utc};
// used for persistence
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tracing::debug;

use crate::construct::DatasetStateType;
use crate::datatype::{DatasetId, Payload, StateId, StateTypeId};
use crate::error::{LineageError, Result};

/// A dataset row, joined with the name of the type of its state.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub id: DatasetId,
    pub root: bool,
    pub state: StateId,
    pub time: DateTime<Utc>,
    pub base_dataset: Option<DatasetId>,
    pub state_type: Option<String>,
}

/// A state row. Scans and metadata-only lookups leave out `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRow {
    pub id: StateId,
    pub state_type: Option<StateTypeId>,
    pub time: Option<DateTime<Utc>>,
    pub data: Option<Payload>,
}

/// Every way the cache layer and the insertion helpers touch persistent storage.
/// One call is one round trip.
pub trait Store: Send {
    fn state_type_by_name(&mut self, name: &str) -> Result<Option<DatasetStateType>>;
    fn state_type_by_id(&mut self, id: StateTypeId) -> Result<Option<DatasetStateType>>;
    /// Returns the type and whether it was created by this call.
    fn get_or_create_state_type(&mut self, name: &str) -> Result<(DatasetStateType, bool)>;
    fn state(&mut self, id: StateId, full: bool) -> Result<Option<StateRow>>;
    fn state_exists(&mut self, id: StateId) -> Result<bool>;
    fn dataset(&mut self, id: DatasetId) -> Result<Option<DatasetRow>>;
    fn dataset_exists(&mut self, id: DatasetId) -> Result<bool>;
    fn attached_types(&mut self, dataset: DatasetId) -> Result<Vec<StateTypeId>>;
    fn current_state(&mut self) -> Result<Option<(StateId, DateTime<Utc>)>>;
    // Scans used by the bulk index
    fn all_state_types(&mut self) -> Result<Vec<DatasetStateType>>;
    fn all_states(&mut self) -> Result<Vec<StateRow>>;
    fn all_datasets(&mut self) -> Result<Vec<DatasetRow>>;
    // Adders, each reporting whether a row was created
    fn add_state(
        &mut self,
        id: StateId,
        state_type: Option<StateTypeId>,
        data: &Payload,
        time: DateTime<Utc>,
    ) -> Result<bool>;
    fn add_dataset(&mut self, row: &DatasetRow) -> Result<bool>;
    fn attach_type(&mut self, dataset: DatasetId, state_type: StateTypeId) -> Result<bool>;
    fn add_current_state(&mut self, state: StateId, time: DateTime<Utc>) -> Result<bool>;
}

// ------------- Persistence -------------
pub struct Persistor {
    db: Connection,
}

impl Persistor {
    pub fn new(connection: Connection) -> Result<Persistor> {
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            create table if not exists DatasetStateType (
                DatasetStateType_Identity integer not null,
                DatasetStateType text not null,
                constraint referenceable_DatasetStateType_Identity primary key (
                    DatasetStateType_Identity
                ),
                constraint unique_DatasetStateType unique (
                    DatasetStateType
                )
            );-- STRICT;
            create table if not exists DatasetState (
                DatasetState_Identity text not null,
                DatasetStateType_Identity integer null,
                StateData text not null,
                StateTime text not null,
                constraint DatasetState_has_DatasetStateType foreign key (
                    DatasetStateType_Identity
                ) references DatasetStateType(DatasetStateType_Identity),
                constraint referenceable_DatasetState_Identity primary key (
                    DatasetState_Identity
                )
            );-- STRICT;
            create table if not exists Dataset (
                Dataset_Identity text not null,
                IsRoot integer not null,
                DatasetState_Identity text not null,
                DatasetTime text not null,
                BaseDataset_Identity text null,
                constraint Dataset_has_DatasetState foreign key (
                    DatasetState_Identity
                ) references DatasetState(DatasetState_Identity),
                constraint Dataset_has_BaseDataset foreign key (
                    BaseDataset_Identity
                ) references Dataset(Dataset_Identity),
                constraint referenceable_Dataset_Identity primary key (
                    Dataset_Identity
                )
            );-- STRICT;
            create table if not exists DatasetAttachedType (
                Dataset_Identity text not null,
                DatasetStateType_Identity integer not null,
                constraint DatasetAttachedType_has_Dataset foreign key (
                    Dataset_Identity
                ) references Dataset(Dataset_Identity),
                constraint DatasetAttachedType_has_DatasetStateType foreign key (
                    DatasetStateType_Identity
                ) references DatasetStateType(DatasetStateType_Identity),
                constraint unique_DatasetAttachedType unique (
                    Dataset_Identity,
                    DatasetStateType_Identity
                )
            );-- STRICT;
            create table if not exists DatasetCurrentState (
                DatasetState_Identity text not null,
                CurrentTime text not null,
                constraint DatasetCurrentState_has_DatasetState foreign key (
                    DatasetState_Identity
                ) references DatasetState(DatasetState_Identity),
                constraint unique_DatasetCurrentState unique (
                    DatasetState_Identity,
                    CurrentTime
                )
            );-- STRICT;
            ",
        )?;
        Ok(Persistor { db: connection })
    }
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Persistor> {
        debug!(path = %path.as_ref().display(), "opening dataset store");
        Persistor::new(Connection::open(path)?)
    }
    pub fn in_memory() -> Result<Persistor> {
        Persistor::new(Connection::open_in_memory()?)
    }
    pub fn connection(&self) -> &Connection {
        &self.db
    }
}

// every dataset query selects these columns in this order
const DATASET_COLUMNS: &str = "
    select d.Dataset_Identity,
            d.IsRoot,
            d.DatasetState_Identity,
            d.DatasetTime,
            d.BaseDataset_Identity,
            t.DatasetStateType
        from Dataset d
        left join DatasetState s
        on s.DatasetState_Identity = d.DatasetState_Identity
        left join DatasetStateType t
        on t.DatasetStateType_Identity = s.DatasetStateType_Identity
";

fn dataset_row(row: &Row) -> rusqlite::Result<DatasetRow> {
    Ok(DatasetRow {
        id: row.get(0)?,
        root: row.get(1)?,
        state: row.get(2)?,
        time: row.get(3)?,
        base_dataset: row.get(4)?,
        state_type: row.get(5)?,
    })
}

fn state_type_row(row: &Row) -> rusqlite::Result<DatasetStateType> {
    Ok(DatasetStateType::new(row.get(0)?, row.get(1)?))
}

fn decode_payload(id: StateId, text: &str) -> Result<Payload> {
    serde_json::from_str(text)
        .map_err(|e| LineageError::Integrity(format!("state {id} holds malformed data: {e}")))
}

impl Store for Persistor {
    fn state_type_by_name(&mut self, name: &str) -> Result<Option<DatasetStateType>> {
        let mut statement = self.db.prepare_cached(
            "
            select DatasetStateType_Identity, DatasetStateType
                from DatasetStateType
                where DatasetStateType = ?
        ",
        )?;
        Ok(statement.query_row(params![name], state_type_row).optional()?)
    }
    fn state_type_by_id(&mut self, id: StateTypeId) -> Result<Option<DatasetStateType>> {
        let mut statement = self.db.prepare_cached(
            "
            select DatasetStateType_Identity, DatasetStateType
                from DatasetStateType
                where DatasetStateType_Identity = ?
        ",
        )?;
        Ok(statement.query_row(params![id], state_type_row).optional()?)
    }
    fn get_or_create_state_type(&mut self, name: &str) -> Result<(DatasetStateType, bool)> {
        let created = self
            .db
            .prepare_cached(
                "
            insert or ignore into DatasetStateType (
                DatasetStateType
            ) values (?)
        ",
            )?
            .execute(params![name])?
            > 0;
        match self.state_type_by_name(name)? {
            Some(state_type) => Ok((state_type, created)),
            None => Err(LineageError::Integrity(format!(
                "state type '{name}' vanished right after it was written"
            ))),
        }
    }
    fn state(&mut self, id: StateId, full: bool) -> Result<Option<StateRow>> {
        let sql = if full {
            "
            select DatasetState_Identity, DatasetStateType_Identity, StateTime, StateData
                from DatasetState
                where DatasetState_Identity = ?
        "
        } else {
            "
            select DatasetState_Identity, DatasetStateType_Identity, StateTime, null
                from DatasetState
                where DatasetState_Identity = ?
        "
        };
        let mut statement = self.db.prepare_cached(sql)?;
        let found = statement
            .query_row(params![id], |row| {
                Ok((
                    row.get::<_, StateId>(0)?,
                    row.get::<_, Option<StateTypeId>>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .optional()?;
        match found {
            None => Ok(None),
            Some((id, state_type, time, data)) => Ok(Some(StateRow {
                id,
                state_type,
                time: Some(time),
                data: data.map(|text| decode_payload(id, &text)).transpose()?,
            })),
        }
    }
    fn state_exists(&mut self, id: StateId) -> Result<bool> {
        let mut statement = self.db.prepare_cached(
            "
            select exists (
                select 1 from DatasetState where DatasetState_Identity = ?
            )
        ",
        )?;
        Ok(statement.query_row(params![id], |r| r.get(0))?)
    }
    fn dataset(&mut self, id: DatasetId) -> Result<Option<DatasetRow>> {
        let sql = format!("{DATASET_COLUMNS} where d.Dataset_Identity = ?");
        let mut statement = self.db.prepare_cached(&sql)?;
        Ok(statement.query_row(params![id], dataset_row).optional()?)
    }
    fn dataset_exists(&mut self, id: DatasetId) -> Result<bool> {
        let mut statement = self.db.prepare_cached(
            "
            select exists (
                select 1 from Dataset where Dataset_Identity = ?
            )
        ",
        )?;
        Ok(statement.query_row(params![id], |r| r.get(0))?)
    }
    fn attached_types(&mut self, dataset: DatasetId) -> Result<Vec<StateTypeId>> {
        let mut statement = self.db.prepare_cached(
            "
            select DatasetStateType_Identity
                from DatasetAttachedType
                where Dataset_Identity = ?
                order by DatasetStateType_Identity
        ",
        )?;
        let ids = statement
            .query_map(params![dataset], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<StateTypeId>>>()?;
        Ok(ids)
    }
    fn current_state(&mut self) -> Result<Option<(StateId, DateTime<Utc>)>> {
        let mut statement = self.db.prepare_cached(
            "
            select DatasetState_Identity, CurrentTime
                from DatasetCurrentState
                order by CurrentTime desc
                limit 1
        ",
        )?;
        Ok(statement
            .query_row([], |r| Ok((r.get(0)?, r.get(1)?)))
            .optional()?)
    }
    fn all_state_types(&mut self) -> Result<Vec<DatasetStateType>> {
        let mut statement = self.db.prepare_cached(
            "
            select DatasetStateType_Identity, DatasetStateType
                from DatasetStateType
        ",
        )?;
        let types = statement
            .query_map([], state_type_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(types)
    }
    fn all_states(&mut self) -> Result<Vec<StateRow>> {
        // payloads may be large, so the scan never reads them
        let mut statement = self.db.prepare_cached(
            "
            select DatasetState_Identity, DatasetStateType_Identity, StateTime
                from DatasetState
        ",
        )?;
        let states = statement
            .query_map([], |row| {
                Ok(StateRow {
                    id: row.get(0)?,
                    state_type: row.get(1)?,
                    time: Some(row.get(2)?),
                    data: None,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(states)
    }
    fn all_datasets(&mut self) -> Result<Vec<DatasetRow>> {
        let mut statement = self.db.prepare_cached(DATASET_COLUMNS)?;
        let datasets = statement
            .query_map([], dataset_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(datasets)
    }
    fn add_state(
        &mut self,
        id: StateId,
        state_type: Option<StateTypeId>,
        data: &Payload,
        time: DateTime<Utc>,
    ) -> Result<bool> {
        let text = serde_json::to_string(data)
            .map_err(|e| LineageError::Validation(format!("state {id} data: {e}")))?;
        let mut statement = self.db.prepare_cached(
            "
            insert or ignore into DatasetState (
                DatasetState_Identity,
                DatasetStateType_Identity,
                StateData,
                StateTime
            ) values (?, ?, ?, ?)
        ",
        )?;
        Ok(statement.execute(params![id, state_type, text, time])? > 0)
    }
    fn add_dataset(&mut self, row: &DatasetRow) -> Result<bool> {
        let mut statement = self.db.prepare_cached(
            "
            insert or ignore into Dataset (
                Dataset_Identity,
                IsRoot,
                DatasetState_Identity,
                DatasetTime,
                BaseDataset_Identity
            ) values (?, ?, ?, ?, ?)
        ",
        )?;
        Ok(statement.execute(params![
            row.id,
            row.root,
            row.state,
            row.time,
            row.base_dataset
        ])? > 0)
    }
    fn attach_type(&mut self, dataset: DatasetId, state_type: StateTypeId) -> Result<bool> {
        let mut statement = self.db.prepare_cached(
            "
            insert or ignore into DatasetAttachedType (
                Dataset_Identity,
                DatasetStateType_Identity
            ) values (?, ?)
        ",
        )?;
        Ok(statement.execute(params![dataset, state_type])? > 0)
    }
    fn add_current_state(&mut self, state: StateId, time: DateTime<Utc>) -> Result<bool> {
        let mut statement = self.db.prepare_cached(
            "
            insert or ignore into DatasetCurrentState (
                DatasetState_Identity,
                CurrentTime
            ) values (?, ?)
        ",
        )?;
        Ok(statement.execute(params![state, time])? > 0)
    }
}
