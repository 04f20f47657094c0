//! Concurrency controller.
//!
//! Bounds how many attempts run at once and admits waiting tasks in FIFO
//! order as slots free up. Interrupting a running attempt sets its abort
//! token and waits for the attempt to stop before the slot is reused.

mod controller;
mod guard;

pub use controller::{job, Controller, Job, JobFuture};
