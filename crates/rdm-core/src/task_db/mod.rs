//! Durable task store (SQLite via sqlx).
//!
//! One `tasks` row per task lineage, keyed by the current attempt's task id.
//! Holds status, progress, destination, headers and the resumable flag so a
//! restarted process can pick up where the previous one stopped.

mod db;
mod error;
mod tasks;
mod types;

pub use db::TaskDb;
pub use error::StoreError;
pub use types::*;

#[cfg(test)]
pub(crate) use db::open_memory;
