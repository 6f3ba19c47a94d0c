//! # roiforge
//!
//! Return-on-investment estimation for binary classifiers.
//!
//! This crate provides:
//! - Cost/benefit threshold selection from ROC operating points
//! - Two-feature "what-if" optimization of predicted outcomes
//! - Out-of-sample calibration of the optimized estimate
//! - Distribution-shift scoring of the optimized feature settings
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types and algorithms (record sets, grids, calibration, payoffs)
//! - `ports`: Trait definitions for the scoring service and model registry
//! - `adapters`: Concrete implementations (HTTP scoring, local logistic model,
//!   JSON registry, CSV/TSV input)
//! - `application`: Use cases orchestrating domain and ports

pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub use domain::{OptimizationReport, PayoffMatrix, Population, RecordSet, RocPoint};

use ports::{RegistryError, ScoringError};

/// Result type for roiforge operations
pub type Result<T> = std::result::Result<T, RoiError>;

/// Main error type for roiforge
#[derive(Debug, thiserror::Error)]
pub enum RoiError {
    #[error("Invalid feature: {0}")]
    InvalidFeature(String),

    #[error("Degenerate calibration split: {0}")]
    DegenerateSplit(String),

    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ScoringError> for RoiError {
    fn from(e: ScoringError) -> Self {
        match e {
            ScoringError::InvalidInput(msg) => Self::InvalidInput(msg),
            other => Self::ScoringUnavailable(other.to_string()),
        }
    }
}
