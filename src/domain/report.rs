//! Output of a what-if optimization run.

use serde::{Deserialize, Serialize};

use super::calibration::Calibration;
use super::divergence::FeatureShift;
use super::record::Value;

/// The best feature setting found for one sampled record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChoice {
    /// Row index within the sampled record set
    pub record: usize,
    /// Probability predicted for the record as observed
    pub baseline: f64,
    /// Highest probability over all candidate combinations
    pub optimized: f64,
    pub first_value: Value,
    pub second_value: Value,
}

impl RecordChoice {
    #[must_use]
    pub fn uplift(&self) -> f64 {
        self.optimized - self.baseline
    }
}

/// Full result of one optimization call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub model_id: String,
    /// Rows supplied by the caller
    pub total_records: usize,
    /// Rows left after down-sampling
    pub sampled_records: usize,
    /// Rows scored in the simulation batch
    pub simulated_rows: usize,
    pub calibration: Calibration,
    /// Observed positives in the sample
    pub actual_total: f64,
    /// Sum of baseline predictions
    pub baseline_total: f64,
    /// Sum of per-record maxima before calibration
    pub optimized_total: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub first: FeatureShift,
    pub second: FeatureShift,
    pub choices: Vec<RecordChoice>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl OptimizationReport {
    /// Mean per-record gain in predicted probability.
    #[must_use]
    pub fn mean_uplift(&self) -> f64 {
        if self.choices.is_empty() {
            return 0.0;
        }
        self.choices.iter().map(RecordChoice::uplift).sum::<f64>() / self.choices.len() as f64
    }
}
