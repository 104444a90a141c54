//! Zip archive handling.
//!
//! [`combine`] merges a standalone binary and a branch archive into the
//! delivered package; [`extract`] unpacks a delivered package on the
//! consumer side.

pub mod combine;
pub mod extract;

pub use combine::{CombineSummary, combine, flatten_entry_name};
pub use extract::{ExtractSummary, extract};
