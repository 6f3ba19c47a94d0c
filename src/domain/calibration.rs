//! Out-of-sample calibration of predicted positive counts.
//!
//! The sampled rows are split at their midpoint. Each half compares how many
//! positives it actually holds with the sum of predicted probabilities. The
//! relative error of one half becomes the correction applied to the other.

use serde::{Deserialize, Serialize};

use super::record::{RecordSet, Value};
use crate::RoiError;

/// Target value treated as the event of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositiveClass(pub String);

impl PositiveClass {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Whether a target cell holds the positive class.
    ///
    /// Numeric targets compare numerically, so "1" matches `1.0`.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::Text(s) => s == &self.0,
            Value::Number(x) => self.0.trim().parse::<f64>().is_ok_and(|p| p == *x),
            Value::Missing => false,
        }
    }
}

impl std::fmt::Display for PositiveClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Positive-class indicator for every row.
///
/// # Errors
/// Returns `RoiError::InvalidInput` if the target column is missing.
pub fn positive_labels(
    records: &RecordSet,
    target: &str,
    positive: &PositiveClass,
) -> Result<Vec<bool>, RoiError> {
    Ok(records
        .require(target)?
        .values()
        .iter()
        .map(|v| positive.matches(v))
        .collect())
}

/// Observed and predicted totals for one half, with its correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfSummary {
    pub rows: usize,
    /// Rows whose label is the positive class
    pub actual: f64,
    /// Sum of predicted probabilities
    pub expected: f64,
    /// Correction derived from the *other* half
    pub adjustment: f64,
    /// `expected * (1 + adjustment)`
    pub adjusted: f64,
    /// `100 * (expected - actual) / actual`, one decimal
    pub raw_error_pct: f64,
    /// `100 * (adjusted - actual) / actual`, one decimal
    pub adjusted_error_pct: f64,
}

/// Result of cross-calibrating two halves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub first: HalfSummary,
    pub second: HalfSummary,
}

impl Calibration {
    /// Observed positives across both halves.
    #[must_use]
    pub fn total_actual(&self) -> f64 {
        self.first.actual + self.second.actual
    }

    #[must_use]
    pub fn raw_expected(&self) -> f64 {
        self.first.expected + self.second.expected
    }

    #[must_use]
    pub fn adjusted_expected(&self) -> f64 {
        self.first.adjusted + self.second.adjusted
    }

    /// (lower, upper) of the two raw percentage errors.
    #[must_use]
    pub fn raw_error_bounds(&self) -> (f64, f64) {
        ordered(self.first.raw_error_pct, self.second.raw_error_pct)
    }

    /// (lower, upper) of the two adjusted percentage errors.
    #[must_use]
    pub fn adjusted_error_bounds(&self) -> (f64, f64) {
        ordered(self.first.adjusted_error_pct, self.second.adjusted_error_pct)
    }

    /// Apply both corrections to a predicted total and return (lower, upper).
    #[must_use]
    pub fn bounds(&self, total: f64) -> (f64, f64) {
        ordered(
            total + total * self.first.adjustment,
            total + total * self.second.adjustment,
        )
    }
}

/// Cross-calibrate predictions against labels.
///
/// Rows `[0, n/2)` form the first half and `[n/2, n)` the second.
///
/// # Errors
/// - `RoiError::InvalidInput` if the slices differ in length.
/// - `RoiError::DegenerateSplit` if a half is empty or a half has a zero
///   actual or expected total.
pub fn calibrate(labels: &[bool], probabilities: &[f64]) -> Result<Calibration, RoiError> {
    if labels.len() != probabilities.len() {
        return Err(RoiError::InvalidInput(format!(
            "{} labels but {} predictions",
            labels.len(),
            probabilities.len()
        )));
    }

    let n = labels.len();
    if n < 2 {
        return Err(RoiError::DegenerateSplit(format!(
            "need at least 2 rows to split, got {n}"
        )));
    }

    let mid = n / 2;
    let a = totals(&labels[..mid], &probabilities[..mid]);
    let b = totals(&labels[mid..], &probabilities[mid..]);

    for (name, t) in [("first", &a), ("second", &b)] {
        if t.expected == 0.0 {
            return Err(RoiError::DegenerateSplit(format!(
                "{name} half has zero expected positives"
            )));
        }
        if t.actual == 0.0 {
            return Err(RoiError::DegenerateSplit(format!(
                "{name} half has zero actual positives"
            )));
        }
    }

    // Each half is corrected by the other half's relative error.
    let adjustment_a = (b.actual - b.expected) / b.expected;
    let adjustment_b = (a.actual - a.expected) / a.expected;

    Ok(Calibration {
        first: a.summarize(adjustment_a),
        second: b.summarize(adjustment_b),
    })
}

struct Totals {
    rows: usize,
    actual: f64,
    expected: f64,
}

impl Totals {
    fn summarize(&self, adjustment: f64) -> HalfSummary {
        let adjusted = self.expected + self.expected * adjustment;
        HalfSummary {
            rows: self.rows,
            actual: self.actual,
            expected: self.expected,
            adjustment,
            adjusted,
            raw_error_pct: round1(100.0 * (self.expected - self.actual) / self.actual),
            adjusted_error_pct: round1(100.0 * (adjusted - self.actual) / self.actual),
        }
    }
}

fn totals(labels: &[bool], probabilities: &[f64]) -> Totals {
    Totals {
        rows: labels.len(),
        actual: labels.iter().filter(|&&y| y).count() as f64,
        expected: probabilities.iter().sum(),
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    (a.min(b), a.max(b))
}
