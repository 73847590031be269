//! Background worker: runs the poll cycle on a schedule.

pub mod scheduler;

pub use scheduler::{Poller, Schedule, shutdown, spawn_poller};
