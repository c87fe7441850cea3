//! Alarm suppression over the dependency graph

pub mod engine;

pub use engine::*;
