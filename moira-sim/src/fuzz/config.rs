//! Fuzzing configuration and mutation records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{SimulationError, SimulationResult};

/// Probabilities and switches controlling the three fuzzing injection points.
///
/// Every probability is an independent Bernoulli trial drawn from the run RNG.
/// Missing keys in a JSON document take the defaults below.
///
/// ```
/// use moira_sim::FuzzingConfig;
///
/// let config = FuzzingConfig::from_json_str(r#"{"null_prob": 0.5}"#).unwrap();
/// assert_eq!(config.null_prob, 0.5);
/// assert_eq!(config.boundary_value_prob, 0.3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzingConfig {
    /// Mutate the payloads of scheduled events.
    pub fuzz_inputs: bool,
    /// Randomize the initial state before the run starts.
    pub fuzz_states: bool,
    /// Reorder and combine scenario steps.
    pub fuzz_scenarios: bool,
    /// Probability of replacing a scalar with a boundary value.
    pub boundary_value_prob: f64,
    /// Probability of coercing a scalar to a different representation.
    pub type_confusion_prob: f64,
    /// Probability of replacing a field with JSON `null`.
    pub null_prob: f64,
    /// Probability of replacing a value with one far outside its range.
    pub extreme_value_prob: f64,
    /// Probability of emptying an initial-state table.
    pub empty_collection_prob: f64,
    /// Probability of growing an initial-state table 10 to 99 times.
    pub expand_collection_prob: f64,
}

impl Default for FuzzingConfig {
    fn default() -> Self {
        Self {
            fuzz_inputs: true,
            fuzz_states: true,
            fuzz_scenarios: false,
            boundary_value_prob: 0.3,
            type_confusion_prob: 0.2,
            null_prob: 0.1,
            extreme_value_prob: 0.2,
            empty_collection_prob: 0.2,
            expand_collection_prob: 0.2,
        }
    }
}

impl FuzzingConfig {
    /// A configuration that never mutates anything.
    pub fn disabled() -> Self {
        Self {
            fuzz_inputs: false,
            fuzz_states: false,
            fuzz_scenarios: false,
            boundary_value_prob: 0.0,
            type_confusion_prob: 0.0,
            null_prob: 0.0,
            extreme_value_prob: 0.0,
            empty_collection_prob: 0.0,
            expand_collection_prob: 0.0,
        }
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> SimulationResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject probabilities outside `[0, 1]`.
    pub fn validate(&self) -> SimulationResult<()> {
        let probabilities = [
            ("boundary_value_prob", self.boundary_value_prob),
            ("type_confusion_prob", self.type_confusion_prob),
            ("null_prob", self.null_prob),
            ("extreme_value_prob", self.extreme_value_prob),
            ("empty_collection_prob", self.empty_collection_prob),
            ("expand_collection_prob", self.expand_collection_prob),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimulationError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Category of an applied mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Replaced with JSON `null`.
    Null,
    /// Replaced with a boundary value.
    Boundary,
    /// Replaced with an out-of-range value.
    Extreme,
    /// Coerced to a different JSON type.
    TypeConfusion,
    /// Initial-state table emptied.
    EmptyCollection,
    /// Initial-state table grown with fuzzed copies.
    ExpandCollection,
    /// Initial-state number scaled by a random factor.
    Scale,
    /// Initial-state string replaced with random text.
    RandomString,
}

/// One applied mutation, for reporting and replay diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Dotted/indexed path of the mutated field (e.g. `account.history[2]`).
    pub field: String,
    /// What was done.
    pub kind: MutationKind,
    /// Value before mutation.
    pub original: Value,
    /// Value after mutation.
    pub mutated: Value,
}

/// A fuzzed value together with the mutations that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fuzzed<T> {
    /// The mutated value.
    pub value: T,
    /// Mutations in the order they were applied.
    pub mutations: Vec<Mutation>,
}

impl<T> Fuzzed<T> {
    /// A value that was left untouched.
    pub fn unchanged(value: T) -> Self {
        Self {
            value,
            mutations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let config = FuzzingConfig::from_json_str("{}").unwrap();
        assert_eq!(config, FuzzingConfig::default());
        assert!(config.fuzz_inputs);
        assert!(!config.fuzz_scenarios);
    }

    #[test]
    fn out_of_range_probability_rejected() {
        let err = FuzzingConfig::from_json_str(r#"{"null_prob": 1.5}"#).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(msg) if msg.contains("null_prob")));

        let config = FuzzingConfig {
            extreme_value_prob: f64::NAN,
            ..FuzzingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            FuzzingConfig::from_json_str("{not json"),
            Err(SimulationError::Config(_))
        ));
    }
}
