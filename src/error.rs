//! Error types and macros for reporting fatal errors.

use std::{io, path::PathBuf};
use thiserror::Error;

#[cfg(not(feature = "for-testing"))]
#[macro_export]
macro_rules! exit_with_error {
    ($($print_arg:tt)*) => {{
        eprintln!($($print_arg)*);
        quit::with_code(1);
    }};
}

#[cfg(feature = "for-testing")]
#[macro_export]
macro_rules! exit_with_error {
    ($($print_arg:tt)*) => {{
        panic!($($print_arg)*);
    }};
}

#[macro_export]
macro_rules! exit_on_error {
    ($result:expr, $($print_arg:tt)*) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                $crate::exit_with_error!($($print_arg)*, err)
            }
        }
    };
}

/// Converts the error of the given result into an `io::Error`.
#[macro_export]
macro_rules! io_result {
    ($result:expr) => {
        $result.map_err(|err| ::std::io::Error::new(::std::io::ErrorKind::Other, err.to_string()))
    };
}

/// Errors that can occur while interpolating datasets onto pressure levels.
#[derive(Error, Debug)]
pub enum PlevelError {
    #[error("Invalid vertical grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid pressure levels: {0}")]
    InvalidLevelSet(String),

    #[error("Field {name} not found in {}", .path.display())]
    MissingField { name: String, path: PathBuf },

    #[error("No fields on native vertical levels to interpolate in {}", .path.display())]
    NoFieldsToInterpolate { path: PathBuf },

    #[error("Coordinate {name} required by the vertical grid not found in {}", .path.display())]
    MissingCoordinate { name: String, path: PathBuf },

    #[error("Field {name} can not be interpolated: {reason}")]
    UnsupportedField { name: String, reason: String },

    #[error("Unsupported dataset format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid batch configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Interrupted")]
    Interrupted,
}

impl PlevelError {
    /// Wraps the given I/O error with the path of the file it concerns.
    pub fn io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the name of the kind of error, as reported in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidGrid(_) => "InvalidGridError",
            Self::InvalidLevelSet(_) => "InvalidLevelSetError",
            Self::MissingField { .. } | Self::NoFieldsToInterpolate { .. } => "MissingFieldError",
            Self::MissingCoordinate { .. } => "MissingCoordinateError",
            Self::UnsupportedField { .. } => "UnsupportedFieldError",
            Self::UnsupportedFormat(_) => "UnsupportedFormatError",
            Self::InvalidConfig(_) => "InvalidConfigError",
            Self::Io { .. } => "IOError",
            Self::Interrupted => "Interrupted",
        }
    }

    /// Whether the error invalidates a whole batch rather than a single work item.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::InvalidLevelSet(_) | Self::InvalidConfig(_))
    }
}

/// Result type used throughout the library.
pub type PlevelResult<T> = Result<T, PlevelError>;

/// Attaches a file path to an `io::Result`.
pub trait IoResultExt<T> {
    fn with_path<P: Into<PathBuf>>(self, path: P) -> PlevelResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path<P: Into<PathBuf>>(self, path: P) -> PlevelResult<T> {
        self.map_err(|err| PlevelError::io(path, err))
    }
}
