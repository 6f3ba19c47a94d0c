//! Scoring port: Trait for the external prediction service.
//!
//! This trait abstracts the model-serving backend from the optimizer.

use std::time::Duration;

use crate::domain::RecordSet;

/// Errors that can occur while scoring records.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScoringError {
    #[error("Scoring service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Scoring timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scoring service rejected input: {0}")]
    InvalidInput(String),
}

/// Trait for scoring a batch of records with a trained classifier.
///
/// Implementations must return exactly one positive-class probability per
/// input row, in input order, and must not keep state that affects later
/// calls.
pub trait ScoringOracle: Send + Sync {
    /// Score every row of `records` with the model `model_id`.
    ///
    /// # Errors
    /// - `ScoringError::ServiceUnavailable` if the backend cannot be reached
    /// - `ScoringError::Timeout` if the job does not finish within the bound
    /// - `ScoringError::InvalidInput` if the records do not match the model
    fn score(&self, model_id: &str, records: &RecordSet) -> Result<Vec<f64>, ScoringError>;
}
