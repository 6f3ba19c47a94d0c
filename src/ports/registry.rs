//! Registry port: Trait for read-only classifier metadata.
//!
//! A registry knows the project (target column, positive class, ranking
//! metric), the fitted models in leaderboard order, and each model's
//! validation ROC curve.

use crate::domain::{ModelMetadata, ProjectInfo, RocPoint};

/// Errors that can occur while reading from a model registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed registry data: {0}")]
    Malformed(String),
}

/// Trait for model registry lookups.
pub trait ModelRegistry: Send + Sync {
    /// Project the models were trained for.
    ///
    /// # Errors
    /// Returns error if the registry cannot be read.
    fn project(&self) -> Result<ProjectInfo, RegistryError>;

    /// All models, in registry order.
    ///
    /// # Errors
    /// Returns error if the registry cannot be read.
    fn models(&self) -> Result<Vec<ModelMetadata>, RegistryError>;

    /// Validation ROC curve of a model, ordered by threshold.
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` for an unknown model id.
    fn roc_curve(&self, model_id: &str) -> Result<Vec<RocPoint>, RegistryError>;

    /// Look up one model by id.
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` for an unknown model id.
    fn model(&self, model_id: &str) -> Result<ModelMetadata, RegistryError> {
        self.models()?
            .into_iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| RegistryError::NotFound(format!("model '{model_id}'")))
    }
}
