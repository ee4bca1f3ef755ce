//! Purpose: Define the stable public Rust API boundary for basalt.
//! Exports: Core types and operations needed by embedders and the CLI.
//! Role: Public, additive-only surface over the `core` modules.
//! Invariants: Callers never see the medium's encoding; only `Value`s and rows.

pub use crate::core::codec::{decode, encode};
pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::medium::{FileMedium, Medium, MemoryMedium};
pub use crate::core::query::{
    JoinConfig, KeyRef, Keys, Query, SelectConfig, TaggedRow, TaggedValue,
};
pub use crate::core::schema::{ColumnDef, ID_FIELD, Row, Snapshot, Table, TableSchema};
pub use crate::core::store::{Database, KEY_PREFIX, storage_key};
pub use crate::core::value::{Callable, TypeTag, Value, classify};
