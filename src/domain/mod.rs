//! Domain layer: Core types and algorithms.
//!
//! Everything here is pure computation over in-memory data; no module in
//! this layer performs I/O or talks to a scoring service.

pub mod calibration;
pub mod candidates;
pub mod divergence;
mod model;
pub mod payoff;
mod record;
mod report;

pub use calibration::{calibrate, positive_labels, Calibration, HalfSummary, PositiveClass};
pub use candidates::{candidate_grid, BinningStrategy, CandidateGrid, GridOptions, GridSource};
pub use divergence::{kl_divergence, FeatureShift};
pub use model::{rank_by_roi, Evaluation, ModelEvaluation, ModelMetadata, ProjectInfo};
pub use payoff::{optimal_threshold, Intervention, PayoffMatrix, Population, RocPoint, ThresholdChoice};
pub use record::{Column, ColumnKind, RecordSet, Value};
pub use report::{OptimizationReport, RecordChoice};
