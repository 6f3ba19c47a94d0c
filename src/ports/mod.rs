//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the optimizer and the systems it depends on (the scoring service
//! and the model registry).

mod registry;
mod scoring;

pub use registry::{ModelRegistry, RegistryError};
pub use scoring::{ScoringError, ScoringOracle};
