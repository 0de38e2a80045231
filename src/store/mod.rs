//! Persistence layer: libSQL-backed storage for messages and labels.

pub mod label_cache;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use label_cache::LabelCache;
pub use libsql_backend::LibSqlBackend;
pub use traits::{Label, MessageStore};
