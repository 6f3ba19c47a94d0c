//! Distribution shift between observed and optimized feature values.

use serde::{Deserialize, Serialize};

use super::candidates::CandidateGrid;
use super::record::Value;

/// Count how often each grid slot was chosen.
///
/// `choices` holds grid indices; indices outside the grid are ignored.
#[must_use]
pub fn choice_histogram(grid_len: usize, choices: &[usize]) -> Vec<usize> {
    let mut counts = vec![0usize; grid_len];
    for &c in choices {
        if let Some(slot) = counts.get_mut(c) {
            *slot += 1;
        }
    }
    counts
}

/// Add `pseudo` to every bin.
#[must_use]
pub fn with_pseudo_counts(counts: &[usize], pseudo: f64) -> Vec<f64> {
    counts.iter().map(|&c| c as f64 + pseudo).collect()
}

/// Scale to sum to one. An all-zero input stays all zero.
#[must_use]
pub fn normalize(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return vec![0.0; weights.len()];
    }
    weights.iter().map(|w| w / total).collect()
}

/// Kullback–Leibler divergence `KL(p || q) = Σ p log(p / q)` in nats.
///
/// Both inputs are normalized first. Terms with `p = 0` contribute nothing; a
/// term with `p > 0` and `q = 0` makes the divergence infinite. Mismatched
/// lengths yield `NaN`.
#[must_use]
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    if p.len() != q.len() {
        return f64::NAN;
    }
    let p = normalize(p);
    let q = normalize(q);

    p.iter()
        .zip(&q)
        .map(|(&pi, &qi)| {
            if pi == 0.0 {
                0.0
            } else if qi == 0.0 {
                f64::INFINITY
            } else {
                pi * (pi / qi).ln()
            }
        })
        .sum()
}

/// How far the optimized choices for one feature moved from what was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureShift {
    pub feature: String,
    pub values: Vec<Value>,
    /// Observed weights from the candidate grid
    pub original: Vec<usize>,
    /// How many records chose each value
    pub optimized: Vec<usize>,
    /// `KL(optimized || original)` after pseudo-counting both sides
    pub divergence: f64,
}

impl FeatureShift {
    /// Tabulate choices against a grid and score the shift.
    #[must_use]
    pub fn measure(grid: &CandidateGrid, choices: &[usize], pseudo: f64) -> Self {
        let optimized = choice_histogram(grid.len(), choices);
        let divergence = kl_divergence(
            &with_pseudo_counts(&optimized, pseudo),
            &with_pseudo_counts(&grid.weights, pseudo),
        );

        Self {
            feature: grid.feature.clone(),
            values: grid.values.clone(),
            original: grid.weights.clone(),
            optimized,
            divergence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidates::GridSource;

    #[test]
    fn test_kl_of_identical_is_zero() {
        let p = [3.0, 1.0, 6.0];
        assert!(kl_divergence(&p, &p).abs() < 1e-12);
        // scale does not matter
        assert!(kl_divergence(&p, &[6.0, 2.0, 12.0]).abs() < 1e-12);
    }

    #[test]
    fn test_kl_known_value() {
        // KL([0.5, 0.5] || [0.25, 0.75])
        let expected = 0.5 * (2.0f64).ln() + 0.5 * (0.5f64 / 0.75).ln();
        let kl = kl_divergence(&[1.0, 1.0], &[1.0, 3.0]);
        assert!((kl - expected).abs() < 1e-12);
    }

    #[test]
    fn test_kl_zero_reference_is_infinite() {
        assert!(kl_divergence(&[1.0, 1.0], &[1.0, 0.0]).is_infinite());
        assert_eq!(kl_divergence(&[1.0, 0.0], &[1.0, 1.0]), (2.0f64).ln());
    }

    #[test]
    fn test_histogram_ignores_out_of_range() {
        assert_eq!(choice_histogram(3, &[0, 2, 2, 7]), vec![1, 0, 2]);
    }

    #[test]
    fn test_measure_pseudo_counts_both_sides() {
        let grid = CandidateGrid {
            feature: "x".into(),
            source: GridSource::Distinct,
            values: vec![Value::Number(1.0), Value::Number(2.0)],
            weights: vec![3, 0],
        };
        let shift = FeatureShift::measure(&grid, &[1, 1, 1], 1.0);

        assert_eq!(shift.optimized, vec![0, 3]);
        // KL([1/5, 4/5] || [4/5, 1/5])
        let expected = 0.2 * (0.25f64).ln() + 0.8 * (4.0f64).ln();
        assert!((shift.divergence - expected).abs() < 1e-12);
    }
}
