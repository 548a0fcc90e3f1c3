//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, repository functions for
//! every table in the automation schema, and the store traits the engine
//! talks to (with Postgres and in-memory implementations). No business logic
//! lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pool::DbPool;
pub use store::{AutomationStore, ExecutionLogStore, PgStore};
