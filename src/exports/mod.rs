//! Export functionality
//!
//! Provides JSON export of topology snapshots and path results

pub mod json;

pub use json::*;
