//! Command line interface.

pub mod batch;
pub mod build;
pub mod completions;
pub mod interpolate;
pub mod run;
pub mod utils;
