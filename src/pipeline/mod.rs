//! Pipeline entry points for the watcher.
//!
//! - `Watcher::run_cycle`: collect, filter, deliver, record, prune
//! - `run_scheduled`: repeat cycles on a fixed interval until shutdown

pub mod cycle;
pub mod schedule;

pub use cycle::{CyclePhase, CycleReport, Watcher, committable};
pub use schedule::{Shutdown, run_scheduled};
