//! Optimization service: Two-feature what-if search with calibration.
//!
//! One run performs:
//! - Down-sampling of the caller's records
//! - Baseline scoring (one oracle call)
//! - Cross-calibration of predicted vs. observed positives
//! - Candidate grid construction for both features
//! - Batch scoring of every record under every candidate pair (one oracle call)
//! - Per-record selection of the best pair, calibrated bounds and shift scores

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::domain::{
    calibrate, candidate_grid, positive_labels, BinningStrategy, CandidateGrid, FeatureShift,
    GridOptions, OptimizationReport, PositiveClass, ProjectInfo, RecordChoice, RecordSet, Value,
};
use crate::ports::ScoringOracle;
use crate::RoiError;

/// Configuration for optimization runs.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Records beyond this count are randomly down-sampled
    pub max_sample_rows: usize,

    /// Upper bound on candidate values per feature
    pub max_candidates: usize,

    /// A numeric value covering more than this share of rows marks the
    /// column as concentrated (no binning)
    pub concentration_ratio: f64,

    /// Added to every histogram bin before computing divergence
    pub pseudo_count: f64,

    pub binning: BinningStrategy,

    /// Seed for down-sampling. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_sample_rows: 1000,
            max_candidates: 30,
            concentration_ratio: 0.1,
            pseudo_count: 1.0,
            binning: BinningStrategy::EqualFrequency,
            seed: None,
        }
    }
}

impl OptimizerConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - ROIFORGE_MAX_SAMPLE_ROWS
    /// - ROIFORGE_MAX_CANDIDATES
    /// - ROIFORGE_CONCENTRATION_RATIO
    /// - ROIFORGE_PSEUDO_COUNT
    /// - ROIFORGE_BINNING="equal-frequency" | "equal-width"
    /// - ROIFORGE_SEED
    #[must_use]
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Some(x) = env_parse::<usize>("ROIFORGE_MAX_SAMPLE_ROWS") {
            if x >= 2 {
                cfg.max_sample_rows = x;
            }
        }
        if let Some(x) = env_parse::<usize>("ROIFORGE_MAX_CANDIDATES") {
            if x > 0 {
                cfg.max_candidates = x;
            }
        }
        if let Some(x) = env_parse::<f64>("ROIFORGE_CONCENTRATION_RATIO") {
            if x.is_finite() && (0.0..=1.0).contains(&x) {
                cfg.concentration_ratio = x;
            }
        }
        if let Some(x) = env_parse::<f64>("ROIFORGE_PSEUDO_COUNT") {
            if x.is_finite() && x >= 0.0 {
                cfg.pseudo_count = x;
            }
        }
        if let Some(x) = env_parse::<BinningStrategy>("ROIFORGE_BINNING") {
            cfg.binning = x;
        }
        if let Some(x) = env_parse::<u64>("ROIFORGE_SEED") {
            cfg.seed = Some(x);
        }

        cfg
    }

    #[must_use]
    pub fn grid_options(&self) -> GridOptions {
        GridOptions {
            max_candidates: self.max_candidates,
            concentration_ratio: self.concentration_ratio,
            binning: self.binning,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// What to optimize.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    pub model_id: String,
    pub target: String,
    pub positive_class: PositiveClass,
    pub first_feature: String,
    pub second_feature: String,
}

impl OptimizationRequest {
    /// Request using the project's target and positive class.
    #[must_use]
    pub fn for_project(
        project: &ProjectInfo,
        model_id: impl Into<String>,
        first_feature: impl Into<String>,
        second_feature: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            target: project.target.clone(),
            positive_class: project.positive_class.clone(),
            first_feature: first_feature.into(),
            second_feature: second_feature.into(),
        }
    }
}

/// Origin of one simulated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationKey {
    /// Row in the sampled record set
    pub record: usize,
    /// Index into the first feature's grid
    pub first: usize,
    /// Index into the second feature's grid
    pub second: usize,
}

/// Every sampled record repeated under every candidate pair.
///
/// `keys[i]` describes row `i` of `records`.
#[derive(Debug, Clone)]
pub struct SimulationTable {
    pub records: RecordSet,
    pub keys: Vec<SimulationKey>,
}

impl SimulationTable {
    /// Expand `sampled` over the cross-product of both grids.
    ///
    /// # Errors
    /// Returns `RoiError::InvalidFeature` if a grid is empty.
    pub fn build(
        sampled: &RecordSet,
        first: &CandidateGrid,
        second: &CandidateGrid,
    ) -> Result<Self, RoiError> {
        for grid in [first, second] {
            if grid.is_empty() {
                return Err(RoiError::InvalidFeature(format!(
                    "feature '{}' has an empty candidate grid",
                    grid.feature
                )));
            }
        }

        let pairs: Vec<(usize, usize)> = (0..first.len())
            .flat_map(|i| (0..second.len()).map(move |j| (i, j)))
            .collect();

        let overrides: Vec<Vec<Value>> = pairs
            .iter()
            .map(|&(i, j)| vec![first.values[i].clone(), second.values[j].clone()])
            .collect();
        let names = [first.feature.as_str(), second.feature.as_str()];
        let records = sampled.expand_with_overrides(&names, &overrides)?;

        let keys = pairs
            .iter()
            .flat_map(|&(i, j)| {
                (0..sampled.len()).map(move |record| SimulationKey {
                    record,
                    first: i,
                    second: j,
                })
            })
            .collect();

        Ok(Self { records, keys })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// For each of `n_records` records, the highest score and the key that
    /// produced it. Ties keep the first key encountered.
    #[must_use]
    pub fn best_per_record(&self, scores: &[f64], n_records: usize) -> Vec<Option<(f64, SimulationKey)>> {
        let mut best: Vec<Option<(f64, SimulationKey)>> = vec![None; n_records];
        for (key, &score) in self.keys.iter().zip(scores) {
            let Some(slot) = best.get_mut(key.record) else { continue };
            let better = match slot {
                Some((top, _)) => score > *top,
                None => true,
            };
            if better {
                *slot = Some((score, *key));
            }
        }
        best
    }
}

/// Service for what-if optimization of two features.
pub struct OptimizationService<O>
where
    O: ScoringOracle,
{
    oracle: Arc<O>,
    config: OptimizerConfig,
}

impl<O> OptimizationService<O>
where
    O: ScoringOracle,
{
    /// Create a new optimization service.
    pub fn new(oracle: Arc<O>, config: OptimizerConfig) -> Self {
        Self { oracle, config }
    }

    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run the full optimization.
    ///
    /// No partial result is returned: any failure aborts the run.
    ///
    /// # Errors
    /// - `RoiError::InvalidInput` for missing columns or an empty record set
    /// - `RoiError::DegenerateSplit` if calibration cannot be computed
    /// - `RoiError::InvalidFeature` if a feature yields no candidates
    /// - `RoiError::ScoringUnavailable` if the oracle fails
    pub fn optimize(
        &self,
        request: &OptimizationRequest,
        records: &RecordSet,
    ) -> Result<OptimizationReport, RoiError> {
        let first = request.first_feature.as_str();
        let second = request.second_feature.as_str();

        if first == second {
            return Err(RoiError::InvalidInput(format!(
                "the two optimization features must differ (both are '{first}')"
            )));
        }
        records.require_all(&[first, second, request.target.as_str()])?;
        if records.is_empty() {
            return Err(RoiError::InvalidInput("record set is empty".to_string()));
        }

        tracing::info!("Total records {}", records.len());
        let sampled = sample_down(records, self.config.max_sample_rows, self.config.seed);
        tracing::info!("Sampled records {}", sampled.len());

        // Step 1: Baseline scores, reused for calibration
        tracing::debug!("Step 1: Scoring sampled records...");
        let labels = positive_labels(&sampled, &request.target, &request.positive_class)?;
        let baseline = self.score_checked(&request.model_id, &sampled)?;

        // Step 2: Cross-calibration
        tracing::debug!("Step 2: Calibrating on split halves...");
        let calibration = calibrate(&labels, &baseline)?;
        tracing::info!(
            "Subset 1. RAW ERROR {:.1}% ADJUSTED: {:.1}%",
            calibration.first.raw_error_pct,
            calibration.first.adjusted_error_pct
        );
        tracing::info!(
            "Subset 2. RAW ERROR {:.1}% ADJUSTED: {:.1}%",
            calibration.second.raw_error_pct,
            calibration.second.adjusted_error_pct
        );
        tracing::info!(
            "Total. Actuals: {} Predicted: {:.1} Adjusted: {:.1}",
            calibration.total_actual(),
            calibration.raw_expected(),
            calibration.adjusted_expected()
        );

        // Step 3: Candidate grids
        let options = self.config.grid_options();
        let first_grid = candidate_grid(&sampled, first, &options)?;
        let second_grid = candidate_grid(&sampled, second, &options)?;
        for grid in [&first_grid, &second_grid] {
            tracing::info!(
                "Feature '{}' has {} candidate values ({:?})",
                grid.feature,
                grid.len(),
                grid.source
            );
            tracing::debug!("Distribution {:?}", grid.weights);
        }

        // Step 4: Score every combination in one batch
        let table = SimulationTable::build(&sampled, &first_grid, &second_grid)?;
        tracing::info!(
            "Optimising {} records, scoring {} permutations",
            sampled.len(),
            table.len()
        );
        let scores = self.score_checked(&request.model_id, &table.records)?;

        // Step 5: Best combination per record
        tracing::debug!("Step 5: Selecting optimal combinations...");
        let best = table.best_per_record(&scores, sampled.len());
        let mut choices = Vec::with_capacity(best.len());
        let mut first_choices = Vec::with_capacity(best.len());
        let mut second_choices = Vec::with_capacity(best.len());
        for (record, entry) in best.into_iter().enumerate() {
            let (optimized, key) = entry.ok_or_else(|| {
                RoiError::ScoringUnavailable(format!("no simulated score for record {record}"))
            })?;
            first_choices.push(key.first);
            second_choices.push(key.second);
            choices.push(RecordChoice {
                record,
                baseline: baseline[record],
                optimized,
                first_value: first_grid.values[key.first].clone(),
                second_value: second_grid.values[key.second].clone(),
            });
        }

        let optimized_total: f64 = choices.iter().map(|c| c.optimized).sum();
        let (lower_bound, upper_bound) = calibration.bounds(optimized_total);

        // Step 6: Distribution shift
        let first_shift = FeatureShift::measure(&first_grid, &first_choices, self.config.pseudo_count);
        let second_shift = FeatureShift::measure(&second_grid, &second_choices, self.config.pseudo_count);

        tracing::info!(
            "Optimization complete: optimized={:.1}, bounds=[{:.1}, {:.1}], KL({})={:.4}, KL({})={:.4}",
            optimized_total,
            lower_bound,
            upper_bound,
            first_shift.feature,
            first_shift.divergence,
            second_shift.feature,
            second_shift.divergence
        );

        Ok(OptimizationReport {
            model_id: request.model_id.clone(),
            total_records: records.len(),
            sampled_records: sampled.len(),
            simulated_rows: table.len(),
            actual_total: calibration.total_actual(),
            baseline_total: baseline.iter().sum(),
            calibration,
            optimized_total,
            lower_bound,
            upper_bound,
            first: first_shift,
            second: second_shift,
            choices,
            generated_at: chrono::Utc::now(),
        })
    }

    /// Score through the oracle and check the response shape.
    fn score_checked(&self, model_id: &str, records: &RecordSet) -> Result<Vec<f64>, RoiError> {
        let scores = self.oracle.score(model_id, records)?;

        if scores.len() != records.len() {
            return Err(RoiError::ScoringUnavailable(format!(
                "oracle returned {} scores for {} rows",
                scores.len(),
                records.len()
            )));
        }
        if let Some(bad) = scores.iter().position(|p| !(0.0..=1.0).contains(p)) {
            return Err(RoiError::ScoringUnavailable(format!(
                "oracle returned invalid probability {} at row {bad}",
                scores[bad]
            )));
        }

        Ok(scores)
    }
}

/// Uniform sample without replacement when above `max_rows`, in draw order.
fn sample_down(records: &RecordSet, max_rows: usize, seed: Option<u64>) -> RecordSet {
    if records.len() <= max_rows {
        return records.clone();
    }

    let mut rng = match seed {
        Some(s) => ChaCha20Rng::seed_from_u64(s),
        None => ChaCha20Rng::from_entropy(),
    };
    let picked = rand::seq::index::sample(&mut rng, records.len(), max_rows).into_vec();
    records.select_rows(&picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Column, GridSource};
    use crate::ports::ScoringError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probability rises with `x` and falls with `y`.
    struct LinearOracle {
        calls: AtomicUsize,
    }

    impl LinearOracle {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ScoringOracle for LinearOracle {
        fn score(&self, _model_id: &str, records: &RecordSet) -> Result<Vec<f64>, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let x = records
                .column("x")
                .ok_or_else(|| ScoringError::InvalidInput("x".into()))?;
            let y = records
                .column("y")
                .ok_or_else(|| ScoringError::InvalidInput("y".into()))?;
            Ok(x.values()
                .iter()
                .zip(y.values())
                .map(|(a, b)| {
                    let a = a.as_f64().unwrap_or(0.0);
                    let b = b.as_f64().unwrap_or(0.0);
                    (0.1 + 0.1 * a - 0.05 * b).clamp(0.0, 1.0)
                })
                .collect())
        }
    }

    struct DownOracle;

    impl ScoringOracle for DownOracle {
        fn score(&self, _model_id: &str, _records: &RecordSet) -> Result<Vec<f64>, ScoringError> {
            Err(ScoringError::ServiceUnavailable("connection refused".into()))
        }
    }

    struct ShortOracle;

    impl ScoringOracle for ShortOracle {
        fn score(&self, _model_id: &str, records: &RecordSet) -> Result<Vec<f64>, ScoringError> {
            Ok(vec![0.5; records.len().saturating_sub(1)])
        }
    }

    fn records() -> RecordSet {
        RecordSet::new(vec![
            Column::numeric("x", [0.0, 1.0, 2.0, 0.0, 1.0, 2.0]),
            Column::numeric("y", [1.0, 1.0, 2.0, 2.0, 1.0, 2.0]),
            Column::categorical("target", ["yes", "no", "yes", "no", "yes", "no"]),
        ])
        .expect("record set")
    }

    fn request() -> OptimizationRequest {
        OptimizationRequest {
            model_id: "m1".into(),
            target: "target".into(),
            positive_class: PositiveClass::new("yes"),
            first_feature: "x".into(),
            second_feature: "y".into(),
        }
    }

    #[test]
    fn test_simulation_keys_align_with_rows() {
        let rs = records();
        let opts = GridOptions::default();
        let gx = candidate_grid(&rs, "x", &opts).expect("grid x");
        let gy = candidate_grid(&rs, "y", &opts).expect("grid y");
        let table = SimulationTable::build(&rs, &gx, &gy).expect("table");

        assert_eq!(table.len(), rs.len() * gx.len() * gy.len());
        let xs = table.records.column("x").expect("x").values();
        let ys = table.records.column("y").expect("y").values();
        for (row, key) in table.keys.iter().enumerate() {
            assert_eq!(xs[row], gx.values[key.first]);
            assert_eq!(ys[row], gy.values[key.second]);
        }
    }

    #[test]
    fn test_best_per_record_keeps_first_tie() {
        let rs = records().select_rows(&[0]);
        let grid = CandidateGrid {
            feature: "x".into(),
            source: GridSource::Distinct,
            values: vec![Value::Number(1.0), Value::Number(2.0)],
            weights: vec![1, 1],
        };
        let other = CandidateGrid {
            feature: "y".into(),
            source: GridSource::Distinct,
            values: vec![Value::Number(1.0)],
            weights: vec![1],
        };
        let table = SimulationTable::build(&rs, &grid, &other).expect("table");
        let best = table.best_per_record(&[0.7, 0.7], 1);
        let (score, key) = best[0].expect("best");
        assert_eq!(score, 0.7);
        assert_eq!(key.first, 0);
    }

    #[test]
    fn test_optimize_picks_max_and_calls_oracle_twice() {
        let oracle = Arc::new(LinearOracle::new());
        let service = OptimizationService::new(oracle.clone(), OptimizerConfig::default());
        let report = service.optimize(&request(), &records()).expect("optimize");

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.sampled_records, 6);
        for choice in &report.choices {
            assert_eq!(choice.first_value, Value::Number(2.0));
            assert_eq!(choice.second_value, Value::Number(1.0));
            assert!((choice.optimized - 0.25).abs() < 1e-12);
            assert!(choice.optimized >= choice.baseline);
        }
        assert!((report.optimized_total - 1.5).abs() < 1e-12);
        assert!(report.lower_bound <= report.upper_bound);
    }

    #[test]
    fn test_oracle_failure_aborts() {
        let service = OptimizationService::new(Arc::new(DownOracle), OptimizerConfig::default());
        let err = service.optimize(&request(), &records()).unwrap_err();
        assert!(matches!(err, RoiError::ScoringUnavailable(_)));
    }

    #[test]
    fn test_short_response_rejected() {
        let service = OptimizationService::new(Arc::new(ShortOracle), OptimizerConfig::default());
        let err = service.optimize(&request(), &records()).unwrap_err();
        assert!(matches!(err, RoiError::ScoringUnavailable(_)));
    }

    #[test]
    fn test_missing_columns_rejected() {
        let service = OptimizationService::new(Arc::new(LinearOracle::new()), OptimizerConfig::default());
        let mut req = request();
        req.second_feature = "income".into();
        let err = service.optimize(&req, &records()).unwrap_err();
        assert!(matches!(err, RoiError::InvalidInput(_)));

        let mut req = request();
        req.second_feature = "x".into();
        let err = service.optimize(&req, &records()).unwrap_err();
        assert!(matches!(err, RoiError::InvalidInput(_)));
    }

    #[test]
    fn test_sample_down_is_seeded() {
        let rs = RecordSet::new(vec![Column::numeric("x", (0..50).map(f64::from))]).expect("rs");
        let a = sample_down(&rs, 10, Some(7));
        let b = sample_down(&rs, 10, Some(7));
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);

        let untouched = sample_down(&rs, 50, None);
        assert_eq!(untouched, rs);
    }
}
