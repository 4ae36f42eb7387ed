//! Storage layer
//!
//! SQLite persistence for annotations and document metadata.
//!
//! ## Architecture
//!
//! - **Schema**: versioned table definitions (`schema_info`)
//! - **AnnotationStore**: CRUD over one attached database file
//!
//! The database file lives in a session's working directory and is copied
//! into the container by the codec on save.

pub mod annotations;
pub mod error;
pub mod schema;

pub use annotations::AnnotationStore;
pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
