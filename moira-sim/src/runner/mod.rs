//! Simulation runner and reporting.
//!
//! This module provides the infrastructure for running batches of seeded
//! simulation runs, scoring them, and generating reports.
//!
//! ## Submodules
//!
//! - `builder` - SimulationBuilder for configuring experiments
//! - `config` - SimulationConfig loadable from JSON
//! - `report` - SimulationMetrics, RunResult and SimulationReport types

pub mod builder;
pub mod config;
pub mod report;

// Re-export main types at module level
pub use builder::SimulationBuilder;
pub use config::SimulationConfig;
pub use report::{RunResult, SimulationMetrics, SimulationReport};
