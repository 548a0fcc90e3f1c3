//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types — pure SQL.

pub mod automations;
pub mod contacts;
pub mod execution_logs;
pub mod jobs;
pub mod lists;
pub mod outbox;
