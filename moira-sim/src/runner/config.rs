//! File-level simulation configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fuzz::FuzzingConfig;
use crate::sim::SchedulerConfig;
use crate::{SimulationError, SimulationResult};

/// Everything needed to reproduce a batch of runs, loadable from JSON.
///
/// ```
/// use moira_sim::SimulationConfig;
///
/// let config = SimulationConfig::from_json_str(
///     r#"{"seed": 42, "iterations": 100, "fuzzing": {"null_prob": 0.0}}"#,
/// )
/// .unwrap();
/// assert_eq!(config.seed, Some(42));
/// assert_eq!(config.scheduler.max_events, 10_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Base seed. When absent one is generated and reported.
    pub seed: Option<u64>,
    /// Number of runs.
    pub iterations: usize,
    /// Fuzzing settings; `None` disables fuzzing entirely.
    pub fuzzing: Option<FuzzingConfig>,
    /// Scheduler settings shared by every run.
    pub scheduler: SchedulerConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            iterations: 1,
            fuzzing: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> SimulationResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> SimulationResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> SimulationResult<()> {
        if self.scheduler.max_events == 0 {
            return Err(SimulationError::InvalidConfig(
                "scheduler.max_events must be at least 1".to_string(),
            ));
        }
        if let Some(fuzzing) = &self.fuzzing {
            fuzzing.validate()?;
        }
        Ok(())
    }
}
