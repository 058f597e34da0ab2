//! The `plevel` crate provides tools for moving atmospheric model output
//! from its native hybrid sigma-pressure levels onto fixed pressure levels.

pub mod error;
pub mod batch;
pub mod grid;
pub mod interpolation;
pub mod io;
pub mod job;
pub mod levels;

#[cfg(feature = "cli")]
pub mod cli;
