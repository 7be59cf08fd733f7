//! Error types for the offload driver.
//!
//! Using thiserror for more idiomatic error handling. Configuration
//! problems and subprocess failures are kept as separate variants so the
//! binary can map each to the right exit status.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::debuginfo::ExtractError;
use crate::pipeline::Stage;

/// Main error type for a driver run.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{name} must be set in the environment")]
    MissingEnv { name: &'static str },

    #[error("device compiler '{name}' not found next to the host compiler or on the search path")]
    ToolchainNotFound { name: String },

    #[error("unrecognized --target-abi value '{value}' (expected 'wide' or 'narrow')")]
    UnknownAbi { value: String },

    #[error("--target-abi is required ('wide' or 'narrow')")]
    MissingAbi,

    #[error("exactly one of --parallel-model-a or --parallel-model-b must be given")]
    ModelSelection,

    #[error("option '{option}' requires a value")]
    MissingValue { option: String },

    #[error("an output path (-o) or a --dump-base prefix is required")]
    NoOutputPath,

    #[error("failed to set up intermediate file: {0}")]
    Scratch(#[source] io::Error),

    #[error("could not launch the {stage} stage '{program}': {source}")]
    Spawn {
        stage: Stage,
        program: PathBuf,
        source: io::Error,
    },

    #[error("{stage} stage failed: {status}")]
    StageFailed { stage: Stage, status: ExitStatus },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("cannot read capability requirements: {0}")]
    Requires(#[source] io::Error),
}

impl DriverError {
    /// Exit status for the process. Subprocess failures propagate the
    /// child's own status; everything else is a plain failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::StageFailed { status, .. } => status.code().unwrap_or(1),
            _ => 1,
        }
    }
}

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
