//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod optimization;
mod roi;

pub use optimization::{
    OptimizationRequest, OptimizationService, OptimizerConfig, SimulationKey, SimulationTable,
};
pub use roi::RoiService;
