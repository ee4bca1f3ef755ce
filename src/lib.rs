//! Purpose: Embedded, schema-validated table store with an in-memory query pipeline.
//! Exports: `core` (values, schemas, codec, media, store, queries) and `api` (public surface).
//! Role: Library backing the `basalt` CLI and any embedding application.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
//! Invariants: Single process, single writer per database; no internal locking beyond the medium.
pub mod api;
pub mod core;
pub mod store_paths;
