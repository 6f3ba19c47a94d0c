//! Logistic adapter: In-process implementation of ScoringOracle.
//!
//! Scores records with logistic-regression models exported as JSON. Useful
//! for offline runs when no scoring service is reachable, and fully
//! deterministic.
//!
//! # Model format
//!
//! ```json
//! {
//!   "model_id": "churn-lr",
//!   "feature_names": ["tenure", "monthly_spend"],
//!   "coefficients": [-0.8, 0.3],
//!   "intercept": -1.2,
//!   "scaler_mean": [24.0, 60.0],
//!   "scaler_std": [12.0, 25.0],
//!   "categorical": { "plan": { "premium": 0.4, "basic": -0.1 } }
//! }
//! ```
//!
//! Numeric features are standardized with the exported scaler; a missing cell
//! is imputed at the mean (contributes nothing). Categorical features add the
//! weight of their level, unknown levels add nothing.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{RecordSet, Value};
use crate::ports::{ScoringError, ScoringOracle};
use crate::RoiError;

/// Maximum number of numeric features accepted in one model file.
const MAX_FEATURES: usize = 4096;

/// Logistic-regression parameters as exported by the training pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub model_id: String,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub scaler_mean: Vec<f64>,
    #[serde(default)]
    pub scaler_std: Vec<f64>,
    /// Level weights per categorical feature
    #[serde(default)]
    pub categorical: BTreeMap<String, BTreeMap<String, f64>>,
}

impl LogisticModel {
    /// Check parameter shapes and fill in a default scaler when absent.
    ///
    /// # Errors
    /// Returns `RoiError::InvalidInput` describing the first inconsistency.
    pub fn validated(mut self) -> Result<Self, RoiError> {
        let n = self.feature_names.len();
        if n > MAX_FEATURES {
            return Err(RoiError::InvalidInput(format!(
                "Invalid feature count in model: got {n}, max {MAX_FEATURES}"
            )));
        }
        if n == 0 && self.categorical.is_empty() {
            return Err(RoiError::InvalidInput(format!(
                "model '{}' has no features",
                self.model_id
            )));
        }
        if self.scaler_mean.is_empty() {
            self.scaler_mean = vec![0.0; n];
        }
        if self.scaler_std.is_empty() {
            self.scaler_std = vec![1.0; n];
        }
        if self.coefficients.len() != n || self.scaler_mean.len() != n || self.scaler_std.len() != n {
            return Err(RoiError::InvalidInput(
                "Model parameter lengths do not match feature_names length".into(),
            ));
        }
        if let Some(i) = self.scaler_std.iter().position(|s| !s.is_finite() || *s <= 0.0) {
            return Err(RoiError::InvalidInput(format!(
                "scaler_std for '{}' must be positive",
                self.feature_names[i]
            )));
        }
        let finite = self
            .coefficients
            .iter()
            .chain(&self.scaler_mean)
            .chain(std::iter::once(&self.intercept))
            .chain(self.categorical.values().flat_map(BTreeMap::values))
            .all(|x| x.is_finite());
        if !finite {
            return Err(RoiError::InvalidInput(
                "model parameters must be finite".into(),
            ));
        }
        Ok(self)
    }

    /// Positive-class probability for every row.
    ///
    /// # Errors
    /// Returns `ScoringError::InvalidInput` if a model feature is absent from
    /// the records or a numeric feature holds text.
    pub fn predict(&self, records: &RecordSet) -> Result<Vec<f64>, ScoringError> {
        let mut logits = vec![self.intercept; records.len()];

        for (i, name) in self.feature_names.iter().enumerate() {
            let column = records
                .column(name)
                .ok_or_else(|| ScoringError::InvalidInput(format!("missing feature '{name}'")))?;
            let (coef, mean, std) = (self.coefficients[i], self.scaler_mean[i], self.scaler_std[i]);

            for (z, v) in logits.iter_mut().zip(column.values()) {
                match v {
                    Value::Number(x) => *z += coef * (x - mean) / std,
                    Value::Missing => {}
                    Value::Text(t) => {
                        return Err(ScoringError::InvalidInput(format!(
                            "feature '{name}' is numeric but holds '{t}'"
                        )))
                    }
                }
            }
        }

        for (name, levels) in &self.categorical {
            let column = records
                .column(name)
                .ok_or_else(|| ScoringError::InvalidInput(format!("missing feature '{name}'")))?;
            for (z, v) in logits.iter_mut().zip(column.values()) {
                let level = match v {
                    Value::Text(t) => levels.get(t.as_str()),
                    Value::Number(x) => levels.get(&x.to_string()),
                    Value::Missing => None,
                };
                *z += level.copied().unwrap_or(0.0);
            }
        }

        Ok(logits.into_iter().map(sigmoid).collect())
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn sha256_hex_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone)]
struct LoadedModel {
    model: LogisticModel,
    fingerprint: String,
}

/// Local scoring oracle backed by one or more logistic models.
#[derive(Debug, Clone, Default)]
pub struct LogisticOracle {
    models: BTreeMap<String, LoadedModel>,
}

impl LogisticOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-memory model.
    ///
    /// # Errors
    /// Returns error if the model parameters are inconsistent.
    pub fn with_model(mut self, model: LogisticModel) -> Result<Self, RoiError> {
        let bytes = serde_json::to_vec(&model)?;
        self.insert(model, &bytes)?;
        Ok(self)
    }

    /// Load a model JSON file, or every `*.json` model in a directory.
    ///
    /// Returns the ids of the models loaded.
    ///
    /// # Errors
    /// Returns error if a file cannot be read or parsed, or if a directory
    /// holds no model.
    pub fn load(&mut self, path: &Path) -> Result<Vec<String>, RoiError> {
        let files: Vec<std::path::PathBuf> = if path.is_dir() {
            let mut found: Vec<_> = std::fs::read_dir(path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            found.sort();
            found
        } else {
            vec![path.to_path_buf()]
        };

        let mut loaded = Vec::new();
        for file in files {
            let bytes = std::fs::read(&file)?;
            let model: LogisticModel = match serde_json::from_slice(&bytes) {
                Ok(m) => m,
                Err(e) if path.is_dir() => {
                    tracing::debug!("Skipping {:?}: not a logistic model ({})", file, e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let id = model.model_id.clone();
            self.insert(model, &bytes)?;
            tracing::info!("Loaded model '{}' from {:?}", id, file);
            loaded.push(id);
        }

        if loaded.is_empty() {
            return Err(RoiError::InvalidInput(format!(
                "No model JSON found in {path:?}"
            )));
        }
        Ok(loaded)
    }

    fn insert(&mut self, model: LogisticModel, bytes: &[u8]) -> Result<(), RoiError> {
        let model = model.validated()?;
        let fingerprint = sha256_hex_bytes(bytes);
        tracing::debug!(
            "Model '{}' fingerprint {} ({} numeric, {} categorical features)",
            model.model_id,
            &fingerprint[..16],
            model.feature_names.len(),
            model.categorical.len()
        );
        self.models
            .insert(model.model_id.clone(), LoadedModel { model, fingerprint });
        Ok(())
    }

    /// Ids of all loaded models.
    #[must_use]
    pub fn model_ids(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    /// SHA-256 of the model's source bytes.
    #[must_use]
    pub fn fingerprint(&self, model_id: &str) -> Option<&str> {
        self.models.get(model_id).map(|m| m.fingerprint.as_str())
    }
}

impl ScoringOracle for LogisticOracle {
    fn score(&self, model_id: &str, records: &RecordSet) -> Result<Vec<f64>, ScoringError> {
        let loaded = self
            .models
            .get(model_id)
            .ok_or_else(|| ScoringError::InvalidInput(format!("unknown model '{model_id}'")))?;
        tracing::debug!("Scoring {} rows locally with '{}'", records.len(), model_id);
        loaded.model.predict(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Column;
    use tempfile::tempdir;

    fn model() -> LogisticModel {
        LogisticModel {
            model_id: "lr".into(),
            feature_names: vec!["x".into()],
            coefficients: vec![2.0],
            intercept: -1.0,
            scaler_mean: vec![1.0],
            scaler_std: vec![0.5],
            categorical: BTreeMap::from([(
                "plan".to_string(),
                BTreeMap::from([("gold".to_string(), 1.0)]),
            )]),
        }
    }

    fn records() -> RecordSet {
        RecordSet::new(vec![
            Column::numeric("x", [1.0, 1.5, f64::NAN]),
            Column::categorical("plan", ["basic", "gold", "gold"]),
        ])
        .expect("record set")
    }

    #[test]
    fn test_predict() {
        let p = model().validated().expect("valid").predict(&records()).expect("predict");

        assert!((p[0] - sigmoid(-1.0)).abs() < 1e-12);
        // -1 + 2 * (1.5 - 1) / 0.5 + 1
        assert!((p[1] - sigmoid(2.0)).abs() < 1e-12);
        // missing x imputed at the mean
        assert!((p[2] - sigmoid(0.0)).abs() < 1e-12);
    }

    #[test]
    fn test_missing_feature_is_invalid_input() {
        let rs = RecordSet::new(vec![Column::numeric("x", [1.0])]).expect("rs");
        let err = model().validated().expect("valid").predict(&rs).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidInput(_)));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut m = model();
        m.coefficients.push(1.0);
        assert!(m.validated().is_err());

        let mut m = model();
        m.scaler_std = vec![0.0];
        assert!(m.validated().is_err());
    }

    #[test]
    fn test_default_scaler() {
        let mut m = model();
        m.scaler_mean.clear();
        m.scaler_std.clear();
        let m = m.validated().expect("valid");
        assert_eq!(m.scaler_mean, vec![0.0]);
        assert_eq!(m.scaler_std, vec![1.0]);
    }

    #[test]
    fn test_oracle_unknown_model() {
        let oracle = LogisticOracle::new().with_model(model()).expect("oracle");
        assert_eq!(oracle.model_ids(), vec!["lr"]);
        let err = oracle.score("other", &records()).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidInput(_)));
    }

    #[test]
    fn test_load_from_directory() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        std::fs::write(
            dir.join("lr.json"),
            serde_json::to_vec(&model()).expect("serialize"),
        )
        .expect("write model");
        std::fs::write(dir.join("notes.json"), br#"{"hello": "world"}"#).expect("write notes");

        let mut oracle = LogisticOracle::new();
        let ids = oracle.load(dir).expect("load");
        assert_eq!(ids, vec!["lr".to_string()]);
        assert_eq!(oracle.fingerprint("lr").map(str::len), Some(64));

        let scores = oracle.score("lr", &records()).expect("score");
        assert_eq!(scores.len(), 3);
    }

    #[test]
    fn test_load_bundled_models() {
        let mut oracle = LogisticOracle::new();
        let ids = oracle.load(Path::new("models")).expect("bundled models should load");
        assert!(ids.iter().any(|id| id == "churn-lr"));
    }
}
