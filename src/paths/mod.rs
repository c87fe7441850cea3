//! Constrained path search
//!
//! Lexicographic Dijkstra over the interface graph with Yen ranking for alternatives.

mod finder;
mod graph;
pub mod types;

pub use finder::PathFinder;
pub use types::*;
