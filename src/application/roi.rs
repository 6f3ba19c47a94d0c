//! ROI service: Ranks classifiers by achievable payoff.
//!
//! The threshold search is the costly part of the comparison, so only the
//! first `num_models` models in registry order are searched; the rest are
//! listed with their metadata and marked as not evaluated.

use std::sync::Arc;

use crate::domain::{
    optimal_threshold, Evaluation, Intervention, ModelEvaluation, PayoffMatrix, Population,
    ThresholdChoice,
};
use crate::ports::ModelRegistry;
use crate::RoiError;

/// Service for cost/benefit evaluation of registered models.
pub struct RoiService<R>
where
    R: ModelRegistry,
{
    registry: Arc<R>,
}

impl<R> RoiService<R>
where
    R: ModelRegistry,
{
    /// Create a new ROI service.
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Best threshold and payoff for a single model.
    ///
    /// # Errors
    /// Returns error if the ROC curve cannot be read or is empty.
    pub fn estimate_optimal_threshold(
        &self,
        model_id: &str,
        matrix: &PayoffMatrix,
        population: &Population,
    ) -> Result<ThresholdChoice, RoiError> {
        let points = self.registry.roc_curve(model_id)?;
        tracing::debug!("Model {} has {} ROC points", model_id, points.len());
        optimal_threshold(&points, matrix, population)
    }

    /// Build the comparison table from a raw payoff matrix.
    ///
    /// # Errors
    /// Returns error if the population is invalid, the registry fails, or an
    /// evaluated model has no usable ROC curve.
    pub fn evaluate_models(
        &self,
        matrix: &PayoffMatrix,
        population: &Population,
        num_models: usize,
    ) -> Result<Vec<ModelEvaluation>, RoiError> {
        population.validate()?;

        let project = self.registry.project()?;
        let models = self.registry.models()?;

        tracing::info!(
            "Evaluating {} of {} models (cases={}, baserate={})",
            num_models.min(models.len()),
            models.len(),
            population.cases,
            population.base_rate
        );

        let mut results = Vec::with_capacity(models.len());
        for (index, model) in models.into_iter().enumerate() {
            let evaluation = if index < num_models {
                Evaluation::Evaluated(self.estimate_optimal_threshold(&model.id, matrix, population)?)
            } else {
                Evaluation::NotEvaluated
            };

            results.push(ModelEvaluation {
                index,
                metric: model.metric(&project.metric),
                model_id: model.id,
                model_type: model.model_type,
                sample_pct: model.sample_pct,
                featurelist_name: model.featurelist_name,
                evaluation,
            });
        }

        Ok(results)
    }

    /// Build the comparison table from intervention parameters.
    ///
    /// Returns the derived payoff matrix with the table.
    ///
    /// # Errors
    /// Same as [`RoiService::evaluate_models`].
    pub fn evaluate_intervention(
        &self,
        intervention: &Intervention,
        population: &Population,
        num_models: usize,
    ) -> Result<(PayoffMatrix, Vec<ModelEvaluation>), RoiError> {
        let matrix = intervention.to_matrix();
        tracing::info!("True Positive Payoff: {}", matrix.true_positive);
        tracing::info!("False Positive Payoff: {}", matrix.false_positive);

        let table = self.evaluate_models(&matrix, population, num_models)?;
        Ok((matrix, table))
    }
}
