//! Task CRUD on `TaskDb`.

mod read;
mod write;
