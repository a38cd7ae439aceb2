use std::time::Duration;

use thiserror::Error;

use crate::sim::CorrelationId;

/// Errors that can occur during simulation operations.
///
/// `CausalityViolation` and `IntegrityViolation` are fatal: the run that
/// produced them is aborted and its partial progress discarded. Both carry the
/// seed and virtual time so the failure can be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// An event was scheduled before the current virtual time or before its
    /// causal parent.
    #[error("causality violation (seed={seed}, time={time:?}): {reason}")]
    CausalityViolation {
        /// Seed of the aborted run.
        seed: u64,
        /// Virtual time at which the violation was detected.
        time: Duration,
        /// Description of the offending schedule request.
        reason: String,
    },
    /// The causal graph is not a DAG, or an event id was recorded twice.
    #[error("integrity violation (seed={seed}, time={time:?}): {reason}")]
    IntegrityViolation {
        /// Seed of the run owning the graph.
        seed: u64,
        /// Virtual time at which the violation was detected.
        time: Duration,
        /// What was found.
        reason: String,
    },
    /// No events were recorded for the requested correlation id.
    #[error("no events recorded for correlation id {correlation_id}")]
    NotFound {
        /// The unknown correlation id.
        correlation_id: CorrelationId,
    },
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A configuration document could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
    /// A log, trace, or state could not be rendered as JSON.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A parallel exploration worker died before reporting.
    #[error("simulation worker failed: {0}")]
    WorkerFailed(String),
}

impl SimulationError {
    /// Whether this error aborts the run (as opposed to a caller mistake).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimulationError::CausalityViolation { .. }
                | SimulationError::IntegrityViolation { .. }
                | SimulationError::WorkerFailed(_)
        )
    }

    /// Seed of the failing run, when the error belongs to one.
    pub fn seed(&self) -> Option<u64> {
        match self {
            SimulationError::CausalityViolation { seed, .. }
            | SimulationError::IntegrityViolation { seed, .. } => Some(*seed),
            _ => None,
        }
    }
}

/// A type alias for `Result<T, SimulationError>`.
pub type SimulationResult<T> = Result<T, SimulationError>;

impl SimulationError {
    pub(crate) fn serialization(err: serde_json::Error) -> Self {
        SimulationError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SimulationError {
    fn from(err: serde_json::Error) -> Self {
        SimulationError::Config(err.to_string())
    }
}

impl From<std::io::Error> for SimulationError {
    fn from(err: std::io::Error) -> Self {
        SimulationError::Config(err.to_string())
    }
}
