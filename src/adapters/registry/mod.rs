//! Registry adapter: Implementation of ModelRegistry over a JSON document.
//!
//! The registry file is an export of a modelling project:
//!
//! ```json
//! {
//!   "project": { "id": "p1", "name": "churn", "target": "churned",
//!                "positive_class": "yes", "metric": "AUC" },
//!   "models": [
//!     { "id": "m1", "model_type": "Logistic Regression", "sample_pct": 64.0,
//!       "featurelist_name": "Informative Features", "metrics": { "AUC": 0.81 },
//!       "roc_curve": [ { "threshold": 0.5, "true_positive_rate": 0.8,
//!                        "false_positive_rate": 0.1 } ] }
//!   ]
//! }
//! ```
//!
//! Models keep the file order, which is the leaderboard order used when
//! only the first N models are evaluated.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ModelMetadata, ProjectInfo, RocPoint};
use crate::ports::{ModelRegistry, RegistryError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelEntry {
    #[serde(flatten)]
    metadata: ModelMetadata,
    #[serde(default)]
    roc_curve: Vec<RocPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryDocument {
    project: ProjectInfo,
    #[serde(default)]
    models: Vec<ModelEntry>,
}

/// Model registry read from a JSON export.
#[derive(Debug, Clone)]
pub struct JsonRegistry {
    project: ProjectInfo,
    models: Vec<ModelMetadata>,
    curves: HashMap<String, Vec<RocPoint>>,
}

impl JsonRegistry {
    /// Load the registry from a JSON file.
    ///
    /// # Errors
    /// Returns `RegistryError::Unavailable` if the file cannot be read and
    /// `RegistryError::Malformed` if its content is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| RegistryError::Unavailable(format!("{}: {e}", path.display())))?;
        let registry = Self::from_slice(&bytes)?;
        tracing::info!(
            "Loaded registry for project '{}' with {} models from {:?}",
            registry.project.id,
            registry.models.len(),
            path
        );
        Ok(registry)
    }

    /// Parse a registry document.
    ///
    /// # Errors
    /// Returns `RegistryError::Malformed` on invalid JSON, duplicate model ids,
    /// or ROC points with rates outside `[0, 1]`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RegistryError> {
        let doc: RegistryDocument =
            serde_json::from_slice(bytes).map_err(|e| RegistryError::Malformed(e.to_string()))?;

        let mut models = Vec::with_capacity(doc.models.len());
        let mut curves = HashMap::with_capacity(doc.models.len());
        for entry in doc.models {
            let id = entry.metadata.id.clone();
            if let Some(bad) = entry.roc_curve.iter().find(|p| !valid_point(p)) {
                return Err(RegistryError::Malformed(format!(
                    "model '{id}' has an invalid ROC point at threshold {}",
                    bad.threshold
                )));
            }
            if curves.insert(id.clone(), entry.roc_curve).is_some() {
                return Err(RegistryError::Malformed(format!("duplicate model id '{id}'")));
            }
            models.push(entry.metadata);
        }

        Ok(Self {
            project: doc.project,
            models,
            curves,
        })
    }
}

fn valid_point(p: &RocPoint) -> bool {
    let rate = |r: f64| (0.0..=1.0).contains(&r);
    p.threshold.is_finite() && rate(p.true_positive_rate) && rate(p.false_positive_rate)
}

impl ModelRegistry for JsonRegistry {
    fn project(&self) -> Result<ProjectInfo, RegistryError> {
        Ok(self.project.clone())
    }

    fn models(&self) -> Result<Vec<ModelMetadata>, RegistryError> {
        Ok(self.models.clone())
    }

    fn roc_curve(&self, model_id: &str) -> Result<Vec<RocPoint>, RegistryError> {
        self.curves
            .get(model_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("model '{model_id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DOC: &str = r#"{
        "project": { "id": "p1", "target": "churned", "positive_class": "yes", "metric": "AUC" },
        "models": [
            { "id": "b", "model_type": "Random Forest", "metrics": { "AUC": 0.7 },
              "roc_curve": [ { "threshold": 0.5, "true_positive_rate": 0.8, "false_positive_rate": 0.1 } ] },
            { "id": "a", "model_type": "Logistic Regression", "sample_pct": 64.0 }
        ]
    }"#;

    #[test]
    fn test_parse_keeps_order() {
        let registry = JsonRegistry::from_slice(DOC.as_bytes()).expect("parse");
        let ids: Vec<_> = registry.models().expect("models").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let project = registry.project().expect("project");
        assert_eq!(project.target, "churned");
        assert_eq!(project.name, "");

        assert_eq!(registry.roc_curve("b").expect("curve").len(), 1);
        assert!(registry.roc_curve("a").expect("curve").is_empty());
        assert_eq!(registry.model("a").expect("model").sample_pct, Some(64.0));
    }

    #[test]
    fn test_unknown_model() {
        let registry = JsonRegistry::from_slice(DOC.as_bytes()).expect("parse");
        assert!(matches!(registry.roc_curve("zz"), Err(RegistryError::NotFound(_))));
        assert!(matches!(registry.model("zz"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_rejects_duplicates_and_bad_rates() {
        let dup = r#"{ "project": { "id": "p", "target": "t", "positive_class": "1", "metric": "AUC" },
                       "models": [ { "id": "m", "model_type": "x" }, { "id": "m", "model_type": "y" } ] }"#;
        assert!(matches!(
            JsonRegistry::from_slice(dup.as_bytes()),
            Err(RegistryError::Malformed(_))
        ));

        let bad = r#"{ "project": { "id": "p", "target": "t", "positive_class": "1", "metric": "AUC" },
                       "models": [ { "id": "m", "model_type": "x",
                         "roc_curve": [ { "threshold": 0.5, "true_positive_rate": 1.5, "false_positive_rate": 0.1 } ] } ] }"#;
        assert!(matches!(
            JsonRegistry::from_slice(bad.as_bytes()),
            Err(RegistryError::Malformed(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("registry.json");
        std::fs::write(&path, DOC).expect("write");
        let registry = JsonRegistry::from_file(&path).expect("load");
        assert_eq!(registry.models().expect("models").len(), 2);

        let missing = JsonRegistry::from_file(temp.path().join("nope.json"));
        assert!(matches!(missing, Err(RegistryError::Unavailable(_))));
    }
}
