//! Custom error types for the harness.
//!
//! This module defines the primary error type, `IntegtestError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the infrastructure failures that can occur while preparing and driving a run, from
//! configuration and I/O issues to child processes that cannot be spawned.
//!
//! ## Error Hierarchy
//!
//! `IntegtestError` is an enum that consolidates various error sources:
//!
//! - **`Config`**: Wraps errors from `figment`, typically related to file parsing or
//!   type mismatches in `config/integtest.toml` or `DAQ_INTEGTEST_*` overrides.
//! - **`Configuration`**: Semantic errors in configuration that parsed correctly but are
//!   logically wrong (unknown log level, empty program name, unknown template key).
//! - **`Io`**: Wraps standard `std::io::Error`, covering log reading and run directories.
//! - **`Script`**: A command script that violates the token grammar (e.g. `wait` without
//!   a duration).
//! - **`Spawn`** / **`Confgen`**: An external collaborator could not be started or the
//!   configuration generator reported failure.
//! - **`FeatureNotEnabled`**: Functionality (like HDF5 reading) that was not included at
//!   compile time via feature flags.
//!
//! Check *failures* (a log line with an error, a wrong fragment count) are not errors in
//! this sense: they are reported as `false` by the checkers and as
//! [`crate::report::CheckFailure`] by scenarios.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, IntegtestError>;

/// Infrastructure failures raised while preparing, driving or inspecting a run.
#[derive(Error, Debug)]
pub enum IntegtestError {
    /// The figment layers could not be merged or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds an invalid value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// I/O failure without a known path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O failure on a known file or directory.
    #[error("I/O error on '{path}': {source}")]
    PathIo {
        /// File or directory being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A suppression or filename pattern is not a valid regex.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A TOML input (suppressions, fragment specs) did not parse.
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A report could not be serialized.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A command script violates the token grammar.
    #[error("Invalid command script: {0}")]
    Script(String),

    /// An external program could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// Program name or path
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration generator exited with a non-zero code.
    #[error("Config generator '{module}' failed with exit code {code}")]
    Confgen {
        /// Generator module
        module: String,
        /// Exit code, -1 for a signal
        code: i32,
    },

    /// No scenario has this name.
    #[error("Unknown scenario '{0}'")]
    UnknownScenario(String),

    /// The scenario declares no configuration with this label.
    #[error("Scenario '{scenario}' has no configuration labelled '{label}'")]
    UnknownLabel {
        /// Scenario name
        scenario: String,
        /// Requested label
        label: String,
    },

    /// A data file could not be opened or read.
    #[error("Data file error in '{path}': {message}")]
    DataFile {
        /// Data file
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// Error from the HDF5 library.
    #[cfg(feature = "storage_hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Functionality compiled out by a disabled feature.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for IntegtestError {
    fn from(value: figment::Error) -> Self {
        IntegtestError::Config(Box::new(value))
    }
}

impl IntegtestError {
    /// Attaches the offending path to an I/O error.
    pub fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IntegtestError::PathIo {
            path: path.into(),
            source,
        }
    }
}
