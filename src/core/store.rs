//! Purpose: Schema-validated table store persisted as one snapshot per database.
//! Exports: `Database`, `KEY_PREFIX`, `storage_key`.
//! Role: Owns create/insert/update/remove and hands point-in-time snapshots to queries.
//! Invariants: Every mutation is read-modify-write of the full snapshot; validation
//! Invariants: completes before anything is written, so failures leave no partial state.
//! Invariants: The snapshot cache is filled on first read and dropped after every write.
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::core::codec;
use crate::core::error::{Error, ErrorKind};
use crate::core::medium::Medium;
use crate::core::query::{Query, SelectConfig};
use crate::core::schema::{ID_FIELD, Row, Snapshot, Table, TableSchema};
use crate::core::value::Value;

pub const KEY_PREFIX: &str = "__basalt__";

pub fn storage_key(name: &str) -> String {
    format!("{KEY_PREFIX}{name}")
}

pub struct Database<M: Medium> {
    name: String,
    key: String,
    medium: M,
    cache: RefCell<Option<Snapshot>>,
}

impl<M: Medium> Database<M> {
    /// Creates a new, empty database. Fails if `name` already has persisted state.
    pub fn create(mut medium: M, name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let key = storage_key(&name);
        if medium.get(&key)?.is_some() {
            return Err(Error::new(ErrorKind::InstanceAlreadyExists)
                .with_message(format!("database \"{name}\" already exists"))
                .with_key(key));
        }
        codec::save(&mut medium, &key, &Snapshot::default())?;
        tracing::info!(database = %name, "created database");
        Ok(Self {
            name,
            key,
            medium,
            cache: RefCell::new(None),
        })
    }

    pub fn open(medium: M, name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let key = storage_key(&name);
        let snapshot = codec::load(&medium, &key)?.ok_or_else(|| instance_not_found(&name, &key))?;
        tracing::debug!(database = %name, tables = snapshot.tables.len(), "opened database");
        Ok(Self {
            name,
            key,
            medium,
            cache: RefCell::new(Some(snapshot)),
        })
    }

    pub fn open_or_create(medium: M, name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if Self::exists(&medium, &name)? {
            Self::open(medium, name)
        } else {
            Self::create(medium, name)
        }
    }

    pub fn exists(medium: &M, name: &str) -> Result<bool, Error> {
        Ok(medium.get(&storage_key(name))?.is_some())
    }

    /// Removes a database's persisted state. Missing databases are not an error.
    pub fn delete(medium: &mut M, name: &str) -> Result<(), Error> {
        medium.remove(&storage_key(name))?;
        tracing::info!(database = %name, "deleted database");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn into_medium(self) -> M {
        self.medium
    }

    /// Point-in-time copy of every table.
    pub fn snapshot(&self) -> Result<Snapshot, Error> {
        if let Some(snapshot) = self.cache.borrow().as_ref() {
            return Ok(snapshot.clone());
        }
        let snapshot = codec::load(&self.medium, &self.key)?
            .ok_or_else(|| instance_not_found(&self.name, &self.key))?;
        *self.cache.borrow_mut() = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn tables(&self) -> Result<Vec<TableSchema>, Error> {
        Ok(self
            .snapshot()?
            .tables
            .into_iter()
            .map(|table| table.schema)
            .collect())
    }

    pub fn has_table(&self, name: &str) -> Result<bool, Error> {
        Ok(self.snapshot()?.has_table(name))
    }

    pub fn schema(&self, table: &str) -> Result<TableSchema, Error> {
        self.table(table).map(|table| table.schema)
    }

    pub fn rows(&self, table: &str) -> Result<Vec<Row>, Error> {
        self.table(table).map(|table| table.rows)
    }

    fn table(&self, name: &str) -> Result<Table, Error> {
        self.snapshot()?
            .tables
            .into_iter()
            .find(|table| table.schema.name == name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<(), Error> {
        schema.validate()?;
        let mut snapshot = self.snapshot()?;
        if snapshot.has_table(&schema.name) {
            return Err(Error::new(ErrorKind::TableAlreadyExists)
                .with_message(format!("table \"{}\" already exists", schema.name))
                .with_table(&schema.name));
        }
        let name = schema.name.clone();
        snapshot.tables.push(Table::new(schema));
        self.write(&snapshot)?;
        tracing::info!(database = %self.name, table = %name, "created table");
        Ok(())
    }

    /// Same validation as `create_table`; an existing table is left untouched.
    pub fn create_table_if_not_exist(&mut self, schema: TableSchema) -> Result<(), Error> {
        schema.validate()?;
        if self.has_table(&schema.name)? {
            tracing::debug!(database = %self.name, table = %schema.name, "table exists; skipping create");
            return Ok(());
        }
        self.create_table(schema)
    }

    /// Validates `values` against the table schema and appends a new row.
    /// Keys that are not declared columns are ignored.
    pub fn insert<I, K>(&mut self, table: &str, values: I) -> Result<Row, Error>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut snapshot = self.snapshot()?;
        let target = snapshot
            .table_mut(table)
            .ok_or_else(|| Error::table_not_found(table))?;

        let mut supplied = collect_values(values);
        let mut fields = BTreeMap::new();
        for column in &target.schema.columns {
            let resolved = column
                .resolve(supplied.remove(&column.name))
                .map_err(|err| err.with_table(table))?;
            if let Some(value) = resolved {
                fields.insert(column.name.clone(), value);
            }
        }

        let row = Row::new(generate_id()?, fields);
        target.rows.push(row.clone());
        self.write(&snapshot)?;
        tracing::debug!(database = %self.name, table, id = row.id(), "inserted row");
        Ok(row)
    }

    /// Merges the supplied fields into every row matching `predicate` and returns the
    /// updated rows. Only supplied, declared fields are validated and changed;
    /// an `Undefined` value counts as not supplied.
    pub fn update<I, K, F>(&mut self, table: &str, values: I, predicate: F) -> Result<Vec<Row>, Error>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
        F: Fn(&Row) -> bool,
    {
        let mut snapshot = self.snapshot()?;
        let target = snapshot
            .table_mut(table)
            .ok_or_else(|| Error::table_not_found(table))?;

        let mut supplied = collect_values(values);
        supplied.retain(|_, value| !value.is_undefined());
        if supplied.contains_key(ID_FIELD) {
            return Err(Error::new(ErrorKind::ImmutableField)
                .with_message(format!("\"{ID_FIELD}\" cannot be changed"))
                .with_table(table)
                .with_column(ID_FIELD));
        }

        let mut changes: Vec<(String, Value)> = Vec::new();
        for column in &target.schema.columns {
            let Some(value) = supplied.remove(&column.name) else {
                continue;
            };
            if let Some(value) = column
                .resolve(Some(value))
                .map_err(|err| err.with_table(table))?
            {
                changes.push((column.name.clone(), value));
            }
        }

        let mut updated = Vec::new();
        for row in target.rows.iter_mut().filter(|row| predicate(row)) {
            let fields = row.fields_mut();
            for (name, value) in &changes {
                fields.insert(name.clone(), value.clone());
            }
            updated.push(row.clone());
        }

        self.write(&snapshot)?;
        tracing::debug!(database = %self.name, table, count = updated.len(), "updated rows");
        Ok(updated)
    }

    /// Removes every row matching `predicate` and returns them. `None` matches nothing.
    pub fn remove(
        &mut self,
        table: &str,
        predicate: Option<&dyn Fn(&Row) -> bool>,
    ) -> Result<Vec<Row>, Error> {
        let mut snapshot = self.snapshot()?;
        let target = snapshot
            .table_mut(table)
            .ok_or_else(|| Error::table_not_found(table))?;

        let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(&mut target.rows)
            .into_iter()
            .partition(|row| predicate.is_some_and(|predicate| predicate(row)));
        target.rows = kept;

        self.write(&snapshot)?;
        tracing::debug!(database = %self.name, table, count = removed.len(), "removed rows");
        Ok(removed)
    }

    /// Starts a query over a snapshot taken now.
    pub fn select(&self, config: SelectConfig) -> Result<Query, Error> {
        self.query()?.select(config)
    }

    pub fn query(&self) -> Result<Query, Error> {
        Ok(Query::new(&self.snapshot()?))
    }

    fn write(&mut self, snapshot: &Snapshot) -> Result<(), Error> {
        let result = codec::save(&mut self.medium, &self.key, snapshot);
        *self.cache.get_mut() = None;
        result
    }
}

fn collect_values<I, K>(values: I) -> BTreeMap<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    values
        .into_iter()
        .map(|(key, value)| (key.into(), value))
        .collect()
}

fn instance_not_found(name: &str, key: &str) -> Error {
    Error::new(ErrorKind::InstanceNotFound)
        .with_message(format!("database \"{name}\" does not exist"))
        .with_key(key)
}

/// Random (version 4) UUID string.
fn generate_id() -> Result<String, Error> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Io).with_message(format!("failed to generate row id: {err}"))
    })?;
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex = bytes.iter().map(|byte| format!("{byte:02x}")).collect::<String>();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}
