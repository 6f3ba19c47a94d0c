//! Candidate grids for what-if simulation.
//!
//! A grid is a bounded list of representative values for one feature, each
//! paired with how many sampled rows it stands for. Three cases:
//!
//! - few distinct values: every value, with its count
//! - many values but one dominant numeric value: the most frequent values
//! - many spread-out numeric values: midpoints of fixed-count bins
//!
//! Non-numeric features with many values always take the most-frequent path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::record::{RecordSet, Value, ValueKey};
use crate::RoiError;

/// How spread-out numeric columns are binned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinningStrategy {
    /// Bins holding (nearly) the same number of rows.
    #[default]
    EqualFrequency,
    /// Bins of equal width over the observed range.
    EqualWidth,
}

impl std::str::FromStr for BinningStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal-frequency" | "quantile" => Ok(Self::EqualFrequency),
            "equal-width" | "width" => Ok(Self::EqualWidth),
            other => Err(format!("unknown binning strategy '{other}'")),
        }
    }
}

/// Which rule produced a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridSource {
    /// All distinct observed values
    Distinct,
    /// The most frequent observed values
    TopFrequent,
    /// Bin midpoints
    Binned,
}

/// Parameters of the grid rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOptions {
    /// Maximum number of candidate values (30 in the reference rule)
    pub max_candidates: usize,
    /// Share of rows above which a single value marks a concentrated column
    pub concentration_ratio: f64,
    pub binning: BinningStrategy,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            max_candidates: 30,
            concentration_ratio: 0.1,
            binning: BinningStrategy::EqualFrequency,
        }
    }
}

/// Candidate values for one feature and their observed weights.
///
/// `values[i]` and `weights[i]` are aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateGrid {
    pub feature: String,
    pub source: GridSource,
    pub values: Vec<Value>,
    pub weights: Vec<usize>,
}

impl CandidateGrid {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total_weight(&self) -> usize {
        self.weights.iter().sum()
    }
}

/// Build the candidate grid for `feature`.
///
/// # Errors
/// Returns `RoiError::InvalidFeature` if the column is absent or has no
/// non-missing values, or if `max_candidates` is zero.
pub fn candidate_grid(
    records: &RecordSet,
    feature: &str,
    options: &GridOptions,
) -> Result<CandidateGrid, RoiError> {
    let column = records
        .column(feature)
        .ok_or_else(|| RoiError::InvalidFeature(format!("feature '{feature}' not found")))?;
    if options.max_candidates == 0 {
        return Err(RoiError::InvalidFeature(
            "candidate limit must be at least 1".to_string(),
        ));
    }

    let counted = value_counts(column.values());
    if counted.is_empty() {
        return Err(RoiError::InvalidFeature(format!(
            "feature '{feature}' has no observed values"
        )));
    }

    let limit = options.max_candidates;
    if counted.len() <= limit {
        return Ok(from_counts(feature, GridSource::Distinct, counted));
    }

    let top: Vec<(Value, usize)> = counted.into_iter().take(limit).collect();
    if !column.is_numeric() {
        return Ok(from_counts(feature, GridSource::TopFrequent, top));
    }

    let dominant = top[0].1 as f64;
    if dominant > options.concentration_ratio * records.len() as f64 {
        return Ok(from_counts(feature, GridSource::TopFrequent, top));
    }

    let mut observed: Vec<f64> = column.values().iter().filter_map(Value::as_f64).collect();
    observed.sort_by(f64::total_cmp);

    let bins = match options.binning {
        BinningStrategy::EqualFrequency => equal_frequency_bins(&observed, limit),
        BinningStrategy::EqualWidth => equal_width_bins(&observed, limit),
    };

    Ok(CandidateGrid {
        feature: feature.to_string(),
        source: GridSource::Binned,
        values: bins.iter().map(|b| Value::Number(b.midpoint())).collect(),
        weights: bins.iter().map(|b| b.count).collect(),
    })
}

/// Distinct non-missing values with counts, most frequent first.
/// Ties keep first-appearance order.
fn value_counts(values: &[Value]) -> Vec<(Value, usize)> {
    let mut slots: HashMap<ValueKey<'_>, usize> = HashMap::new();
    let mut counted: Vec<(&Value, usize)> = Vec::new();

    for v in values {
        let Some(key) = v.key() else { continue };
        match slots.get(&key) {
            Some(&slot) => counted[slot].1 += 1,
            None => {
                slots.insert(key, counted.len());
                counted.push((v, 1));
            }
        }
    }

    counted.sort_by(|a, b| b.1.cmp(&a.1));
    counted.into_iter().map(|(v, n)| (v.clone(), n)).collect()
}

fn from_counts(feature: &str, source: GridSource, counted: Vec<(Value, usize)>) -> CandidateGrid {
    let (values, weights) = counted.into_iter().unzip();
    CandidateGrid {
        feature: feature.to_string(),
        source,
        values,
        weights,
    }
}

/// One numeric bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    pub left: f64,
    pub right: f64,
    pub count: usize,
}

impl Bin {
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        self.left + (self.right - self.left) / 2.0
    }
}

/// Split sorted values into at most `k` contiguous rank chunks of near-equal
/// size.
///
/// A run of equal values never straddles two chunks: a cut that would land
/// inside a run moves to the run's end, and chunks emptied by that are
/// dropped. Bins therefore cover disjoint value ranges and their midpoints
/// are strictly ascending. With enough distinct values the result has
/// exactly `k` bins whose sizes differ by at most one.
#[must_use]
pub fn equal_frequency_bins(sorted: &[f64], k: usize) -> Vec<Bin> {
    let n = sorted.len();
    let mut bins = Vec::with_capacity(k);
    let mut start = 0;

    for i in 1..=k {
        let mut end = i * n / k;
        if end <= start {
            continue;
        }
        while end < n && sorted[end] == sorted[end - 1] {
            end += 1;
        }
        bins.push(Bin {
            left: sorted[start],
            right: sorted[end - 1],
            count: end - start,
        });
        start = end;
    }

    bins
}

/// `k` equal-width, right-closed bins over `[min, max]`, with the lowest edge
/// pushed down by 0.1% of the range so the minimum falls inside bin 0.
/// Requires a non-empty, sorted input.
#[must_use]
pub fn equal_width_bins(sorted: &[f64], k: usize) -> Vec<Bin> {
    let (min, max) = (sorted[0], sorted[sorted.len() - 1]);
    let range = max - min;

    let mut edges: Vec<f64> = (0..=k).map(|j| min + range * j as f64 / k as f64).collect();
    edges[k] = max;
    edges[0] = min - range * 0.001;

    let mut counts = vec![0usize; k];
    for &x in sorted {
        // first edge >= x closes the bin to its left
        let upper = edges.partition_point(|&e| e < x);
        let bin = upper.saturating_sub(1).min(k - 1);
        counts[bin] += 1;
    }

    (0..k)
        .map(|j| Bin {
            left: edges[j],
            right: edges[j + 1],
            count: counts[j],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::Column;

    fn numeric(values: Vec<f64>) -> RecordSet {
        RecordSet::new(vec![Column::numeric("x", values)]).expect("record set")
    }

    #[test]
    fn test_few_distinct_values_kept() {
        let rs = numeric(vec![1.0, 2.0, 2.0, 3.0, 3.0, 3.0]);
        let grid = candidate_grid(&rs, "x", &GridOptions::default()).expect("grid");

        assert_eq!(grid.source, GridSource::Distinct);
        assert_eq!(
            grid.values,
            vec![Value::Number(3.0), Value::Number(2.0), Value::Number(1.0)]
        );
        assert_eq!(grid.weights, vec![3, 2, 1]);
        assert_eq!(grid.total_weight(), rs.len());
    }

    #[test]
    fn test_missing_values_ignored() {
        let rs = RecordSet::new(vec![Column::numeric("x", [1.0, f64::NAN, 1.0])]).expect("rs");
        let grid = candidate_grid(&rs, "x", &GridOptions::default()).expect("grid");
        assert_eq!(grid.values, vec![Value::Number(1.0)]);
        assert_eq!(grid.weights, vec![2]);
    }

    #[test]
    fn test_concentrated_column_uses_top_values() {
        // 0.0 covers 50 of 100 rows; 50 other distinct values
        let mut values = vec![0.0; 50];
        values.extend((1..=50).map(f64::from));
        let rs = numeric(values);

        let grid = candidate_grid(&rs, "x", &GridOptions::default()).expect("grid");
        assert_eq!(grid.source, GridSource::TopFrequent);
        assert_eq!(grid.len(), 30);
        assert_eq!(grid.values[0], Value::Number(0.0));
        assert_eq!(grid.weights[0], 50);
        // ties keep first appearance
        assert_eq!(grid.values[1], Value::Number(1.0));
    }

    #[test]
    fn test_spread_column_is_binned() {
        let rs = numeric((0..300).map(f64::from).collect());
        let grid = candidate_grid(&rs, "x", &GridOptions::default()).expect("grid");

        assert_eq!(grid.source, GridSource::Binned);
        assert_eq!(grid.len(), 30);
        assert!(grid.weights.iter().all(|&w| w == 10));
        // first chunk is 0..=9
        assert_eq!(grid.values[0], Value::Number(4.5));
        assert_eq!(grid.total_weight(), 300);
    }

    #[test]
    fn test_repeated_value_stays_in_one_bin() {
        // -45..=-1, nine zeros (9%, not concentrated), 1..=46
        let mut values: Vec<f64> = (-45..=-1).map(f64::from).collect();
        values.extend(std::iter::repeat(0.0).take(9));
        values.extend((1..=46).map(f64::from));
        let rs = numeric(values.clone());

        let grid = candidate_grid(&rs, "x", &GridOptions::default()).expect("grid");
        assert_eq!(grid.source, GridSource::Binned);
        assert_eq!(grid.total_weight(), 100);
        assert!(grid.len() < 30);

        let mids: Vec<f64> = grid.values.iter().filter_map(Value::as_f64).collect();
        assert_eq!(mids.len(), grid.len());
        assert!(mids.windows(2).all(|w| w[0] < w[1]));

        let bins = equal_frequency_bins(&values, 30);
        let holding_zero: Vec<&Bin> = bins
            .iter()
            .filter(|b| b.left <= 0.0 && 0.0 <= b.right)
            .collect();
        assert_eq!(holding_zero.len(), 1);
        assert!(holding_zero[0].count >= 9);
        assert!(bins.windows(2).all(|w| w[0].right < w[1].left));
    }

    #[test]
    fn test_equal_frequency_bins_absorb_runs() {
        let sorted = [1.0, 2.0, 2.0, 2.0, 2.0, 3.0];
        let bins = equal_frequency_bins(&sorted, 3);

        // cut at 2 moves past the run of 2.0s; the middle chunk is dropped
        assert_eq!(bins.len(), 2);
        assert_eq!((bins[0].left, bins[0].right, bins[0].count), (1.0, 2.0, 5));
        assert_eq!((bins[1].left, bins[1].right, bins[1].count), (3.0, 3.0, 1));
    }

    #[test]
    fn test_equal_width_bins_cover_all_rows() {
        let sorted: Vec<f64> = (0..=90).map(f64::from).collect();
        let bins = equal_width_bins(&sorted, 30);

        assert_eq!(bins.len(), 30);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 91);
        // (−0.09, 3] holds 0, 1, 2, 3
        assert_eq!(bins[0].count, 4);
        assert!((bins[29].right - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_categorical_many_values_top_frequent() {
        let labels: Vec<String> = (0..40).map(|i| format!("c{i}")).collect();
        let rs = RecordSet::new(vec![Column::categorical("c", labels.iter())]).expect("rs");

        let grid = candidate_grid(&rs, "c", &GridOptions::default()).expect("grid");
        assert_eq!(grid.source, GridSource::TopFrequent);
        assert_eq!(grid.len(), 30);
        assert_eq!(grid.values[0], Value::from("c0"));
    }

    #[test]
    fn test_empty_feature_rejected() {
        let rs = numeric(vec![f64::NAN, f64::NAN]);
        let err = candidate_grid(&rs, "x", &GridOptions::default()).unwrap_err();
        assert!(matches!(err, RoiError::InvalidFeature(_)));

        let err = candidate_grid(&rs, "absent", &GridOptions::default()).unwrap_err();
        assert!(matches!(err, RoiError::InvalidFeature(_)));
    }

    #[test]
    fn test_binning_strategy_parse() {
        assert_eq!("equal-width".parse::<BinningStrategy>(), Ok(BinningStrategy::EqualWidth));
        assert_eq!(
            "Equal-Frequency".parse::<BinningStrategy>(),
            Ok(BinningStrategy::EqualFrequency)
        );
        assert!("zigzag".parse::<BinningStrategy>().is_err());
    }
}
