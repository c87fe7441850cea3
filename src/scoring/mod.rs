//! Discovery evidence scoring

pub mod confidence;

pub use confidence::*;
