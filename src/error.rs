//! Error taxonomy for the analyzer.
//!
//! Mirrors the five kinds from the design: input validation, model
//! consistency, analysis resource, global resource, and internal invariants.
//! Internal invariants are not represented here: they are assertions and do
//! not unwind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaintError {
    #[error("input validation error: {0}")]
    InputValidation(String),

    #[error("model consistency error in {method}: {message}")]
    ModelConsistency { method: String, message: String },

    #[error("analysis resource error in {method}: {message}")]
    AnalysisResource { method: String, message: String },

    #[error("global resource error: fixpoint did not converge after {iterations} iterations; unstable methods: {unstable:?}")]
    GlobalResource {
        iterations: usize,
        unstable: Vec<String>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaintError>;

/// Exit codes matching the error taxonomy above.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    ArgumentError = 1,
    ModelGeneratorError = 2,
    LifecycleGeneratorError = 3,
    ShimGeneratorError = 4,
    FrontendError = 5,
    LogicError = 6,
    GenericError = 7,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(value: ExitCode) -> Self {
        std::process::ExitCode::from(value as u8)
    }
}

impl TaintError {
    /// Map an error kind to the exit code the CLI reports.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            TaintError::InputValidation(_) => ExitCode::ArgumentError,
            TaintError::ModelConsistency { .. } => ExitCode::ModelGeneratorError,
            TaintError::AnalysisResource { .. } => ExitCode::LogicError,
            TaintError::GlobalResource { .. } => ExitCode::LogicError,
            TaintError::Io(_) => ExitCode::FrontendError,
            TaintError::Json(_) => ExitCode::ArgumentError,
        }
    }
}
