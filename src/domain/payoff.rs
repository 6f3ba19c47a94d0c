//! Cost/benefit analysis of classifier operating points.

use serde::{Deserialize, Serialize};

use crate::RoiError;

/// Payoff per outcome of a binary decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayoffMatrix {
    pub true_positive: f64,
    pub false_positive: f64,
    pub true_negative: f64,
    pub false_negative: f64,
}

impl PayoffMatrix {
    #[must_use]
    pub fn new(true_positive: f64, false_positive: f64, true_negative: f64, false_negative: f64) -> Self {
        Self {
            true_positive,
            false_positive,
            true_negative,
            false_negative,
        }
    }
}

impl Default for PayoffMatrix {
    fn default() -> Self {
        Self::new(1000.0, -200.0, 0.0, 0.0)
    }
}

/// An intervention applied to every flagged case.
///
/// Flagging a real positive succeeds with `success_rate` and earns `payoff`;
/// flagging a negative backfires with `backfire_rate` and costs `payback`
/// (usually negative). Every flagged case pays `cost`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub cost: f64,
    pub payoff: f64,
    pub payback: f64,
    pub success_rate: f64,
    pub backfire_rate: f64,
}

impl Intervention {
    /// Equivalent payoff matrix. Unflagged cases are worth nothing.
    #[must_use]
    pub fn to_matrix(&self) -> PayoffMatrix {
        PayoffMatrix {
            true_positive: self.payoff * self.success_rate - self.cost,
            false_positive: self.payback * self.backfire_rate - self.cost,
            true_negative: 0.0,
            false_negative: 0.0,
        }
    }
}

impl Default for Intervention {
    fn default() -> Self {
        Self {
            cost: 10.0,
            payoff: 1000.0,
            payback: -400.0,
            success_rate: 0.1,
            backfire_rate: 0.03,
        }
    }
}

/// Case volume and how many of those cases are positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub cases: f64,
    pub base_rate: f64,
}

impl Population {
    #[must_use]
    pub fn positives(&self) -> f64 {
        self.cases * self.base_rate
    }

    #[must_use]
    pub fn negatives(&self) -> f64 {
        self.cases - self.positives()
    }

    /// # Errors
    /// Returns `RoiError::InvalidInput` for negative volume or a base rate
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), RoiError> {
        if !self.cases.is_finite() || self.cases < 0.0 {
            return Err(RoiError::InvalidInput(format!(
                "case volume must be non-negative, got {}",
                self.cases
            )));
        }
        if !(0.0..=1.0).contains(&self.base_rate) {
            return Err(RoiError::InvalidInput(format!(
                "base rate must lie in [0, 1], got {}",
                self.base_rate
            )));
        }
        Ok(())
    }
}

impl Default for Population {
    fn default() -> Self {
        Self {
            cases: 1000.0,
            base_rate: 0.01,
        }
    }
}

/// One point of a ROC curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
}

impl RocPoint {
    #[must_use]
    pub fn new(threshold: f64, true_positive_rate: f64, false_positive_rate: f64) -> Self {
        Self {
            threshold,
            true_positive_rate,
            false_positive_rate,
        }
    }

    #[must_use]
    pub fn true_negative_rate(&self) -> f64 {
        1.0 - self.false_positive_rate
    }

    /// Expected total payoff of operating at this point.
    #[must_use]
    pub fn expected_payoff(&self, matrix: &PayoffMatrix, population: &Population) -> f64 {
        let pos = population.positives();
        let neg = population.negatives();
        neg * self.true_negative_rate() * matrix.true_negative
            + neg * self.false_positive_rate * matrix.false_positive
            + pos * self.true_positive_rate * matrix.true_positive
            + pos * (1.0 - self.true_positive_rate) * matrix.false_negative
    }
}

/// Best threshold found on a ROC curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChoice {
    pub threshold: f64,
    pub payoff: f64,
}

/// Threshold with the highest expected payoff.
///
/// Ties keep the earliest point.
///
/// # Errors
/// Returns `RoiError::InvalidInput` if the curve is empty or no point yields a
/// comparable payoff.
pub fn optimal_threshold(
    points: &[RocPoint],
    matrix: &PayoffMatrix,
    population: &Population,
) -> Result<ThresholdChoice, RoiError> {
    let mut best: Option<ThresholdChoice> = None;
    let mut best_payoff = f64::NEG_INFINITY;

    for point in points {
        let payoff = point.expected_payoff(matrix, population);
        if payoff > best_payoff {
            best_payoff = payoff;
            best = Some(ThresholdChoice {
                threshold: point.threshold,
                payoff,
            });
        }
    }

    best.ok_or_else(|| {
        RoiError::InvalidInput(format!(
            "ROC curve with {} points has no usable operating point",
            points.len()
        ))
    })
}
