//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external systems:
//! - `http`: remote prediction service (reqwest, submit/poll/retrieve)
//! - `logistic`: in-process logistic-regression scoring from JSON models
//! - `registry`: model registry read from a JSON export
//! - `tabular`: CSV/TSV record loading

pub mod http;
pub mod logistic;
pub mod registry;
pub mod tabular;

pub use http::{HttpOracle, HttpOracleConfig};
pub use logistic::{LogisticModel, LogisticOracle};
pub use registry::JsonRegistry;
pub use tabular::{load_records, read_records, Delimiter};
