//! Configuration helpers for CLI values.

pub mod duration;

pub use duration::parse_duration;
