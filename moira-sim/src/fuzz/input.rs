//! Payload mutation.
//!
//! Every scalar field (and every array, as a whole) gets four Bernoulli draws
//! in the fixed order null, boundary, extreme, confusion. The draws are always
//! made, whatever the outcome, so the RNG stream only depends on the payload
//! shape. Among the triggered categories the first one in precedence order
//! that applies to the value's type wins; a category that does not apply (for
//! example confusion on a non-numeric string) falls through to the next.

use serde_json::{Map, Number, Value};

use super::config::{Fuzzed, FuzzingConfig, Mutation, MutationKind};
use crate::sim::{Payload, SimRng};

const STRING_BOUNDARIES: [&str; 6] = ["", " ", "\n\t", "NULL", "0", "true"];
const EXTREME_FACTOR: i64 = 1_000_000;
const REPEAT: usize = 100;

/// Mutates event payloads according to a [`FuzzingConfig`].
#[derive(Debug, Clone)]
pub struct InputFuzzer {
    config: FuzzingConfig,
}

impl InputFuzzer {
    /// Create a fuzzer for the given configuration.
    pub fn new(config: FuzzingConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &FuzzingConfig {
        &self.config
    }

    /// Fuzz every field of a payload.
    ///
    /// Returns the payload untouched, without drawing, when input fuzzing is
    /// switched off.
    pub fn fuzz_payload(&self, rng: &mut SimRng, payload: &Payload) -> Fuzzed<Payload> {
        if !self.config.fuzz_inputs {
            return Fuzzed::unchanged(payload.clone());
        }
        let mut mutations = Vec::new();
        let value = self.fuzz_object(rng, "", payload, &mut mutations);
        Fuzzed { value, mutations }
    }

    /// Fuzz an arbitrary JSON value rooted at `path`.
    pub fn fuzz_value(&self, rng: &mut SimRng, path: &str, value: &Value) -> Fuzzed<Value> {
        if !self.config.fuzz_inputs {
            return Fuzzed::unchanged(value.clone());
        }
        let mut mutations = Vec::new();
        let value = self.fuzz_at(rng, path, value, &mut mutations);
        Fuzzed { value, mutations }
    }

    fn fuzz_object(
        &self,
        rng: &mut SimRng,
        path: &str,
        object: &Map<String, Value>,
        mutations: &mut Vec<Mutation>,
    ) -> Map<String, Value> {
        object
            .iter()
            .map(|(key, value)| {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                (key.clone(), self.fuzz_at(rng, &child, value, mutations))
            })
            .collect()
    }

    fn fuzz_at(
        &self,
        rng: &mut SimRng,
        path: &str,
        value: &Value,
        mutations: &mut Vec<Mutation>,
    ) -> Value {
        if let Value::Object(object) = value {
            return Value::Object(self.fuzz_object(rng, path, object, mutations));
        }

        let triggered = [
            (MutationKind::Null, rng.random_bool(self.config.null_prob)),
            (MutationKind::Boundary, rng.random_bool(self.config.boundary_value_prob)),
            (MutationKind::Extreme, rng.random_bool(self.config.extreme_value_prob)),
            (MutationKind::TypeConfusion, rng.random_bool(self.config.type_confusion_prob)),
        ];

        for (kind, hit) in triggered {
            if !hit {
                continue;
            }
            if let Some(mutated) = apply(kind, rng, value) {
                mutations.push(Mutation {
                    field: path.to_string(),
                    kind,
                    original: value.clone(),
                    mutated: mutated.clone(),
                });
                return mutated;
            }
        }

        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        self.fuzz_at(rng, &format!("{path}[{index}]"), item, mutations)
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// The mutated value for one category, or `None` if it does not apply.
fn apply(kind: MutationKind, rng: &mut SimRng, value: &Value) -> Option<Value> {
    match kind {
        MutationKind::Null => (!value.is_null()).then_some(Value::Null),
        MutationKind::Boundary => boundary(rng, value),
        MutationKind::Extreme => extreme(rng, value),
        MutationKind::TypeConfusion => confuse(rng, value),
        _ => None,
    }
}

fn boundary(rng: &mut SimRng, value: &Value) -> Option<Value> {
    match value {
        Value::Number(number) if number.is_f64() => {
            let choices = [0.0, -0.0, f64::MAX, f64::MIN, f64::MIN_POSITIVE];
            rng.choose(&choices).copied().and_then(Number::from_f64).map(Value::Number)
        }
        Value::Number(_) => {
            let choices = [
                Value::from(0),
                Value::from(-1),
                Value::from(1),
                Value::from(i64::MAX),
                Value::from(i64::MIN),
                Value::from(u64::MAX),
            ];
            rng.choose(&choices).cloned()
        }
        Value::String(_) => rng.choose(&STRING_BOUNDARIES).map(|s| Value::from(*s)),
        Value::Array(items) if !items.is_empty() => Some(Value::Array(Vec::new())),
        _ => None,
    }
}

fn extreme(rng: &mut SimRng, value: &Value) -> Option<Value> {
    match value {
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                let scaled = int.saturating_mul(EXTREME_FACTOR);
                let choices = [scaled, scaled.saturating_neg()];
                rng.choose(&choices).copied().map(Value::from)
            } else if let Some(uint) = number.as_u64() {
                Some(Value::from(uint.saturating_mul(EXTREME_FACTOR as u64)))
            } else {
                let float = number.as_f64()?;
                let choices = [float * EXTREME_FACTOR as f64, 1e300, -1e300];
                rng.choose(&choices)
                    .copied()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
        }
        Value::String(text) if !text.is_empty() => Some(Value::from(text.repeat(REPEAT))),
        Value::Array(items) if !items.is_empty() => Some(Value::Array(
            std::iter::repeat_n(items.iter().cloned(), REPEAT).flatten().collect(),
        )),
        _ => None,
    }
}

fn confuse(rng: &mut SimRng, value: &Value) -> Option<Value> {
    match value {
        Value::Number(number) => Some(Value::from(number.to_string())),
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                Some(Value::from(int))
            } else {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
        }
        Value::Bool(flag) => {
            let choices = [Value::from(u8::from(*flag)), Value::from(flag.to_string())];
            rng.choose(&choices).cloned()
        }
        _ => None,
    }
}
