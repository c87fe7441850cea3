//! Reachability monitoring
//!
//! One-shot checks, the liveness probe seam and cancellable continuous probes.

pub mod events;
pub mod probe;
pub mod prober;
pub mod watcher;

pub use events::*;
pub use probe::*;
pub use prober::*;
pub use watcher::*;
