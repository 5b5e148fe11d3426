//! Load statement extraction JSON into the finance database.

pub mod convert;
pub mod hash;
pub mod pipeline;

pub use pipeline::{LoadError, LoadOutcome, LoadReport, Loader};
