//! Classifier and project metadata as exposed by a model registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::calibration::PositiveClass;
use super::payoff::ThresholdChoice;

/// The modelling project a set of classifiers belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Name of the ground-truth column
    pub target: String,
    pub positive_class: PositiveClass,
    /// Evaluation metric the registry ranks models by
    pub metric: String,
}

/// Read-only description of one fitted classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub id: String,
    pub model_type: String,
    /// Share of the training data used, in percent
    #[serde(default)]
    pub sample_pct: Option<f64>,
    #[serde(default)]
    pub featurelist_name: String,
    /// Validation scores keyed by metric name
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl ModelMetadata {
    /// Validation score for a metric, if reported.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Threshold/ROI outcome for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Evaluation {
    Evaluated(ThresholdChoice),
    /// Beyond the requested model count; no ROC search was run
    NotEvaluated,
}

impl Evaluation {
    #[must_use]
    pub fn choice(&self) -> Option<&ThresholdChoice> {
        match self {
            Self::Evaluated(c) => Some(c),
            Self::NotEvaluated => None,
        }
    }
}

/// One row of the model comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    /// Position in registry order
    pub index: usize,
    pub model_id: String,
    pub model_type: String,
    pub sample_pct: Option<f64>,
    pub featurelist_name: String,
    pub metric: Option<f64>,
    pub evaluation: Evaluation,
}

impl ModelEvaluation {
    /// Threshold rounded to 3 decimals, or `?` when not evaluated.
    #[must_use]
    pub fn threshold_label(&self) -> String {
        match self.evaluation.choice() {
            Some(c) => format!("{:.3}", c.threshold),
            None => "?".to_string(),
        }
    }

    /// Payoff rounded to whole units, or `?` when not evaluated.
    #[must_use]
    pub fn roi_label(&self) -> String {
        match self.evaluation.choice() {
            Some(c) => format!("{:.0}", c.payoff),
            None => "?".to_string(),
        }
    }
}

/// Evaluated models by descending payoff, followed by the rest in index order.
#[must_use]
pub fn rank_by_roi(evaluations: &[ModelEvaluation]) -> Vec<&ModelEvaluation> {
    let mut ranked: Vec<&ModelEvaluation> = evaluations.iter().collect();
    ranked.sort_by(|a, b| match (a.evaluation.choice(), b.evaluation.choice()) {
        (Some(x), Some(y)) => y.payoff.total_cmp(&x.payoff),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.index.cmp(&b.index),
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: usize, payoff: Option<f64>) -> ModelEvaluation {
        ModelEvaluation {
            index,
            model_id: format!("m{index}"),
            model_type: "Logistic Regression".into(),
            sample_pct: Some(64.0),
            featurelist_name: "Informative Features".into(),
            metric: Some(0.3),
            evaluation: payoff.map_or(Evaluation::NotEvaluated, |p| {
                Evaluation::Evaluated(ThresholdChoice {
                    threshold: 0.41234,
                    payoff: p,
                })
            }),
        }
    }

    #[test]
    fn test_labels() {
        let r = row(0, Some(1234.6));
        assert_eq!(r.threshold_label(), "0.412");
        assert_eq!(r.roi_label(), "1235");

        let r = row(1, None);
        assert_eq!(r.threshold_label(), "?");
        assert_eq!(r.roi_label(), "?");
    }

    #[test]
    fn test_rank_by_roi() {
        let rows = vec![row(0, Some(10.0)), row(1, None), row(2, Some(50.0)), row(3, None)];
        let ranked: Vec<usize> = rank_by_roi(&rows).iter().map(|r| r.index).collect();
        assert_eq!(ranked, vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_evaluation_serializes_with_status() {
        let json = serde_json::to_value(Evaluation::NotEvaluated).expect("serialize");
        assert_eq!(json["status"], "not_evaluated");
    }
}
