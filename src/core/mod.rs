// Core modules implementing values, schemas, persistence, and queries.
pub mod codec;
pub mod error;
pub mod medium;
pub mod query;
pub mod schema;
pub mod store;
pub mod value;
