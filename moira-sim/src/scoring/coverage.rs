//! State-space coverage accounting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::stats::good_turing_unseen;
use crate::{SimulationError, SimulationResult};

const MIN_OBSERVATIONS_FOR_ESTIMATE: u64 = 100;
const HEAPS_BETA: f64 = 0.5;

/// Canonical fingerprint of an abstract state.
///
/// The state is rendered as compact JSON with object keys sorted, so equal
/// states always produce equal fingerprints.
pub fn state_fingerprint<T: Serialize + ?Sized>(state: &T) -> SimulationResult<String> {
    let value = serde_json::to_value(state).map_err(SimulationError::serialization)?;
    serde_json::to_string(&value).map_err(SimulationError::serialization)
}

/// Counts how often each state fingerprint has been observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageTracker {
    counts: BTreeMap<String, u64>,
    observations: u64,
}

impl CoverageTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation. Returns `true` if the state is new.
    pub fn add_state(&mut self, fingerprint: impl Into<String>) -> bool {
        self.observations += 1;
        let count = self.counts.entry(fingerprint.into()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Distinct states seen.
    pub fn unique_states(&self) -> u64 {
        self.counts.len() as u64
    }

    /// Total observations.
    pub fn total_observations(&self) -> u64 {
        self.observations
    }

    /// States observed exactly once.
    pub fn singleton_states(&self) -> u64 {
        self.counts.values().filter(|&&count| count == 1).count() as u64
    }

    /// How many times a state was observed.
    pub fn count(&self, fingerprint: &str) -> u64 {
        self.counts.get(fingerprint).copied().unwrap_or(0)
    }

    /// Unique states over observations, 0 when nothing was observed.
    pub fn coverage_rate(&self) -> f64 {
        if self.observations == 0 {
            0.0
        } else {
            self.unique_states() as f64 / self.observations as f64
        }
    }

    /// Good-Turing probability that the next observation is a new state.
    pub fn unseen_probability(&self) -> f64 {
        good_turing_unseen(self.singleton_states(), self.observations)
    }

    /// Heaps'-law extrapolation of the total state-space size.
    ///
    /// Assumes `V = K * N^0.5` and projects to ten times the current number of
    /// observations. `None` below 100 observations. Never less than what has
    /// been seen.
    pub fn estimate_total_states(&self) -> Option<u64> {
        if self.observations < MIN_OBSERVATIONS_FOR_ESTIMATE {
            return None;
        }
        let n = self.observations as f64;
        let unique = self.unique_states();
        let k = unique as f64 / n.powf(HEAPS_BETA);
        let projected = (k * (n * 10.0).powf(HEAPS_BETA)) as u64;
        Some(projected.max(unique))
    }

    /// Fold another tracker's counts into this one.
    pub fn merge(&mut self, other: &CoverageTracker) {
        for (fingerprint, count) in &other.counts {
            *self.counts.entry(fingerprint.clone()).or_insert(0) += count;
        }
        self.observations += other.observations;
    }
}
