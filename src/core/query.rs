//! Purpose: In-memory query pipeline over a point-in-time database snapshot.
//! Exports: `Query`, `TaggedValue`, `TaggedRow`, `KeyRef`, `Keys`, `SelectConfig`, `JoinConfig`.
//! Role: Select, filter, left-join, project, order, and aggregate rows without touching the medium.
//! Invariants: Every working value carries its column's declared tag until `exec` strips it.
//! Invariants: Stages own their data; nothing returned by a stage aliases pipeline state.
//! Invariants: Left joins never change the row count; the first matching row wins.
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::core::error::{Error, ErrorKind};
use crate::core::schema::{ID_FIELD, Snapshot, Table};
use crate::core::value::{TypeTag, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct TaggedValue {
    pub value: Value,
    pub tag: TypeTag,
}

impl TaggedValue {
    pub fn new(value: Value, tag: TypeTag) -> Self {
        Self { value, tag }
    }
}

/// Working row: output field name to tagged value. Absent fields are simply missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaggedRow {
    fields: BTreeMap<String, TaggedValue>,
}

impl TaggedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&TaggedValue> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|field| &field.value)
    }

    pub fn tag(&self, name: &str) -> Option<TypeTag> {
        self.get(name).map(|field| field.tag)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, field: TaggedValue) {
        self.fields.insert(name.into(), field);
    }

    pub fn remove(&mut self, name: &str) -> Option<TaggedValue> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaggedValue)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn to_plain(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.value.clone()))
            .collect()
    }

    fn set(&mut self, name: &str, field: Option<TaggedValue>) {
        match field {
            Some(field) => {
                self.fields.insert(name.to_string(), field);
            }
            None => {
                self.fields.remove(name);
            }
        }
    }
}

/// A field to read and the name to expose it under.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyRef {
    pub key: String,
    pub alias: Option<String>,
}

impl KeyRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.key)
    }
}

impl From<&str> for KeyRef {
    fn from(key: &str) -> Self {
        KeyRef::new(key)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Keys {
    All,
    Fields(Vec<KeyRef>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectConfig {
    pub table: String,
    pub keys: Keys,
}

impl SelectConfig {
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            keys: Keys::All,
        }
    }

    pub fn fields<I, K>(table: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyRef>,
    {
        Self {
            table: table.into(),
            keys: Keys::Fields(keys.into_iter().map(Into::into).collect()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JoinConfig {
    pub table: String,
    pub keys: Vec<KeyRef>,
    pub main_key: String,
    pub join_key: String,
}

impl JoinConfig {
    pub fn new(
        table: impl Into<String>,
        main_key: impl Into<String>,
        join_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            keys: Vec::new(),
            main_key: main_key.into(),
            join_key: join_key.into(),
        }
    }

    pub fn key(mut self, key: impl Into<KeyRef>) -> Self {
        self.keys.push(key.into());
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct Query {
    tables: BTreeMap<String, Vec<TaggedRow>>,
    result: Vec<TaggedRow>,
}

impl Query {
    /// Tags every row of every table. The result starts empty until `select`.
    pub fn new(snapshot: &Snapshot) -> Self {
        let tables = snapshot
            .tables
            .iter()
            .map(|table| (table.schema.name.clone(), tag_rows(table)))
            .collect();
        Self {
            tables,
            result: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[TaggedRow] {
        &self.result
    }

    /// Replaces the current result with rows of `config.table`.
    /// Keys that do not resolve leave the output field absent.
    pub fn select(mut self, config: SelectConfig) -> Result<Self, Error> {
        let rows = table_rows(&self.tables, &config.table)?;
        self.result = match &config.keys {
            Keys::All => rows.to_vec(),
            Keys::Fields(keys) => rows
                .iter()
                .map(|row| {
                    let mut out = TaggedRow::new();
                    for key in keys {
                        out.set(key.output_name(), row.get(&key.key).cloned());
                    }
                    out
                })
                .collect(),
        };
        Ok(self)
    }

    pub fn where_rows<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TaggedRow) -> bool,
    {
        self.result.retain(|row| predicate(row));
        self
    }

    /// Enriches each row from the first row of `config.table` whose join key equals
    /// this row's main key. Rows without a match keep only their own fields.
    pub fn left_join(mut self, config: JoinConfig) -> Result<Self, Error> {
        let joined = table_rows(&self.tables, &config.table)?;
        for row in &mut self.result {
            let Some(main) = row.value(&config.main_key) else {
                continue;
            };
            let matched = joined
                .iter()
                .find(|candidate| candidate.value(&config.join_key) == Some(main));
            if let Some(matched) = matched {
                let copied: Vec<(&str, Option<TaggedValue>)> = config
                    .keys
                    .iter()
                    .map(|key| (key.output_name(), matched.get(&key.key).cloned()))
                    .collect();
                for (name, field) in copied {
                    row.set(name, field);
                }
            }
        }
        Ok(self)
    }

    /// Projects every row down to exactly `keys`.
    pub fn filter<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<S> = keys.into_iter().collect();
        for row in &mut self.result {
            let mut out = TaggedRow::new();
            for key in &keys {
                let key = key.as_ref();
                out.set(key, row.remove(key));
            }
            *row = out;
        }
        self
    }

    /// Sorts by `key` using the ordering of its tag: natural order for strings, numbers,
    /// and bigints; `true` before `false` for booleans. Other tags leave the order as is.
    /// Rows without the key go last in either direction.
    pub fn order_by(mut self, key: &str, descending: bool) -> Result<Self, Error> {
        let Some(tag) = self.key_type(key)? else {
            return Ok(self);
        };
        match tag {
            TypeTag::String | TypeTag::Number | TypeTag::BigInt | TypeTag::Boolean => {
                self.result.sort_by(|a, b| match (a.value(key), b.value(key)) {
                    (Some(a), Some(b)) if descending => b.sort_cmp(a),
                    (Some(a), Some(b)) => a.sort_cmp(b),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                });
            }
            TypeTag::Undefined
            | TypeTag::Symbol
            | TypeTag::Function
            | TypeTag::NaN
            | TypeTag::Infinity
            | TypeTag::Object
            | TypeTag::Null
            | TypeTag::Array => {
                tracing::debug!(key, %tag, "order_by on unordered type is a no-op");
            }
        }
        Ok(self)
    }

    /// Plain rows with tags stripped.
    pub fn exec(&self) -> Vec<BTreeMap<String, Value>> {
        self.result.iter().map(TaggedRow::to_plain).collect()
    }

    pub fn count(&self) -> usize {
        self.result.len()
    }

    pub fn avg(&self, key: &str) -> Result<Option<f64>, Error> {
        Ok(self
            .numeric_values(key)?
            .map(|values| values.iter().sum::<f64>() / values.len() as f64))
    }

    pub fn min(&self, key: &str) -> Result<Option<f64>, Error> {
        Ok(self
            .numeric_values(key)?
            .map(|values| values.into_iter().fold(f64::INFINITY, f64::min)))
    }

    pub fn max(&self, key: &str) -> Result<Option<f64>, Error> {
        Ok(self
            .numeric_values(key)?
            .map(|values| values.into_iter().fold(f64::NEG_INFINITY, f64::max)))
    }

    /// Tag of `key` in the first row that carries it. `None` for an empty result.
    pub fn key_type(&self, key: &str) -> Result<Option<TypeTag>, Error> {
        if self.result.is_empty() {
            return Ok(None);
        }
        self.result
            .iter()
            .find_map(|row| row.tag(key))
            .map(Some)
            .ok_or_else(|| {
                Error::new(ErrorKind::OrderByKeyNotFound)
                    .with_message(format!("no row in the result has \"{key}\""))
                    .with_key(key)
            })
    }

    /// Values of a numeric key with missing ones read as zero; `None` when not numeric.
    fn numeric_values(&self, key: &str) -> Result<Option<Vec<f64>>, Error> {
        match self.key_type(key)? {
            Some(tag) if tag.is_numeric() => Ok(Some(
                self.result
                    .iter()
                    .map(|row| row.value(key).and_then(Value::as_f64).unwrap_or(0.0))
                    .collect(),
            )),
            _ => Ok(None),
        }
    }
}

fn table_rows<'a>(
    tables: &'a BTreeMap<String, Vec<TaggedRow>>,
    table: &str,
) -> Result<&'a [TaggedRow], Error> {
    tables
        .get(table)
        .map(Vec::as_slice)
        .ok_or_else(|| Error::table_not_found(table))
}

fn tag_rows(table: &Table) -> Vec<TaggedRow> {
    table
        .rows
        .iter()
        .map(|row| {
            let mut tagged = TaggedRow::new();
            for (name, value) in row.fields() {
                if let Some(column) = table.schema.column(name) {
                    tagged.insert(name.clone(), TaggedValue::new(value.clone(), column.tag));
                }
            }
            tagged.insert(
                ID_FIELD,
                TaggedValue::new(Value::String(row.id().to_string()), TypeTag::String),
            );
            tagged
        })
        .collect()
}
