use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::result::FailureKind;

/// Invalid invocation input. Raised before any network activity.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid risk level '{0}': expected one of low, medium, high")]
    InvalidRiskLevel(String),

    #[error("Invalid horizon {0}: must be a positive number of years")]
    InvalidHorizon(f64),

    #[error("Company name must not be empty")]
    EmptyQuery,

    #[error("Invalid aggregator policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid run timeout: {0}")]
    InvalidTimeout(String),
}

/// Identifier resolution failed. Fatal to the run.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("No listing matched '{query}' (best score {best_score:.2})")]
    NotFound { query: String, best_score: f64 },

    #[error("'{query}' is ambiguous between {}", candidates.join(", "))]
    Ambiguous { query: String, candidates: Vec<String> },

    #[error("Resolving '{query}' exceeded the {timeout_secs}s run deadline")]
    TimedOut { query: String, timeout_secs: u64 },
}

/// Failure reported by an external data collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl CollaboratorError {
    /// Worth another attempt within the same run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Timeout(_)
                | CollaboratorError::RateLimited(_)
                | CollaboratorError::Transport(_)
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            CollaboratorError::Timeout(_) => FailureKind::Timeout,
            CollaboratorError::Malformed(_) => FailureKind::ValidationFailed,
            CollaboratorError::NotFound(_)
            | CollaboratorError::RateLimited(_)
            | CollaboratorError::Transport(_) => FailureKind::DataUnavailable,
        }
    }
}

/// Errors raised while turning raw data into a payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::InsufficientData(_) => FailureKind::DataUnavailable,
            AnalysisError::InvalidData(_) | AnalysisError::CalculationError(_) => {
                FailureKind::ValidationFailed
            }
        }
    }
}
