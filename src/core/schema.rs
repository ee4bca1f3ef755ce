//! Purpose: Table schema, row, and snapshot types owned by the store.
//! Exports: `ColumnDef`, `TableSchema`, `Row`, `Table`, `Snapshot`, `ID_FIELD`.
//! Role: Canonical in-memory shape of one database instance.
//! Invariants: `_id` is never a declared column; schemas are immutable once created.
//! Invariants: A column default, when set, classifies as the column's declared type.
use std::collections::{BTreeMap, BTreeSet};

use crate::core::error::{Error, ErrorKind};
use crate::core::value::{TypeTag, Value};

pub const ID_FIELD: &str = "_id";

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub tag: TypeTag,
    pub required: bool,
    pub default: Option<Value>,
    pub comment: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            tag,
            required: false,
            default: None,
            comment: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// An `Undefined` default is the same as no default.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = if value.is_undefined() { None } else { Some(value) };
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Resolves one supplied value against this column: default, required, then type.
    /// `Ok(None)` means the field stays absent.
    pub(crate) fn resolve(&self, supplied: Option<Value>) -> Result<Option<Value>, Error> {
        let value = supplied
            .filter(|value| !value.is_undefined())
            .or_else(|| self.default.clone());
        match value {
            None if self.required => Err(Error::required_field_missing(&self.name)),
            None => Ok(None),
            Some(value) => {
                let actual = value.tag();
                if actual != self.tag {
                    return Err(Error::type_mismatch(&self.name, actual, self.tag));
                }
                Ok(Some(value))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: String| {
            Error::new(ErrorKind::SchemaInvalid)
                .with_message(message)
                .with_table(&self.name)
        };

        if self.name.is_empty() {
            return Err(invalid("table name is required".to_string()));
        }
        if self.columns.is_empty() {
            return Err(invalid("columns not found".to_string()));
        }

        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if column.name.is_empty() {
                return Err(invalid("column name is required".to_string()));
            }
            if column.name == ID_FIELD {
                return Err(invalid(format!("\"{ID_FIELD}\" is reserved")).with_column(ID_FIELD));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(invalid(format!("duplicate column \"{}\"", column.name))
                    .with_column(&column.name));
            }
            if column.tag == TypeTag::Function {
                return Err(invalid(format!(
                    "\"{}\" cannot be declared as \"function\"",
                    column.name
                ))
                .with_column(&column.name)
                .with_hint("Callable values are never storable."));
            }
            if let Some(default) = &column.default {
                let actual = default.tag();
                if actual != column.tag {
                    return Err(invalid(format!(
                        "default of \"{}\" has type \"{actual}\", but must have the \"{}\"",
                        column.name, column.tag
                    ))
                    .with_column(&column.name));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    id: String,
    fields: BTreeMap<String, Value>,
}

impl Row {
    pub(crate) fn new(id: String, fields: BTreeMap<String, Value>) -> Self {
        Self { id, fields }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.fields
    }

    /// Plain mapping including `_id`.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let mut map = self.fields.clone();
        map.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        map
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub tables: Vec<Table>,
}

impl Snapshot {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.schema.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|table| table.schema.name == name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }
}
