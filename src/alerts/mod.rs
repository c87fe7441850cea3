//! Alerts system module
//!
//! Turns reachability results into suppression-aware alerts

pub mod detector;
pub mod types;

pub use detector::*;
pub use types::*;
