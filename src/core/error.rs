//! Purpose: Single error type shared by the classifier, codec, store, and query pipeline.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Every fallible operation in the crate returns `Result<_, Error>`.
//! Invariants: `ErrorKind` variants are additive-only; exit code mapping is stable.
use std::error::Error as StdError;
use std::fmt;

use crate::core::value::TypeTag;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    InstanceAlreadyExists,
    InstanceNotFound,
    TableAlreadyExists,
    TableNotFound,
    SchemaInvalid,
    RequiredFieldMissing,
    TypeMismatch,
    ImmutableField,
    UnknownType,
    Codec,
    OrderByKeyNotFound,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    table: Option<String>,
    column: Option<String>,
    key: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            table: None,
            column: None,
            key: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub(crate) fn required_field_missing(column: &str) -> Self {
        Error::new(ErrorKind::RequiredFieldMissing)
            .with_message(format!("\"{column}\" is required"))
            .with_column(column)
    }

    pub(crate) fn type_mismatch(column: &str, actual: TypeTag, declared: TypeTag) -> Self {
        Error::new(ErrorKind::TypeMismatch)
            .with_message(format!(
                "\"{column}\" has type \"{actual}\", but must have the \"{declared}\""
            ))
            .with_column(column)
    }

    pub(crate) fn table_not_found(table: &str) -> Self {
        Error::new(ErrorKind::TableNotFound)
            .with_message(format!("table \"{table}\" does not exist"))
            .with_table(table)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {table})")?;
        }
        if let Some(column) = &self.column {
            write!(f, " (column: {column})")?;
        }
        if let Some(key) = &self.key {
            write!(f, " (key: {key})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Io => 1,
        ErrorKind::InstanceAlreadyExists => 2,
        ErrorKind::InstanceNotFound => 3,
        ErrorKind::TableAlreadyExists => 4,
        ErrorKind::TableNotFound => 5,
        ErrorKind::SchemaInvalid => 6,
        ErrorKind::RequiredFieldMissing => 7,
        ErrorKind::TypeMismatch => 8,
        ErrorKind::ImmutableField => 9,
        ErrorKind::UnknownType => 10,
        ErrorKind::Codec => 11,
        ErrorKind::OrderByKeyNotFound => 12,
    }
}
