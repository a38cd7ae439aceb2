//! Initial-state randomization.
//!
//! An initial state is a JSON object whose array-valued entries are tables of
//! records. Every table is either emptied, expanded with fuzzed copies of its
//! records, or fuzzed record by record. Fields whose name contains `id` are
//! never touched so references between tables stay valid.

use serde_json::{Map, Number, Value};

use super::config::{Fuzzed, FuzzingConfig, Mutation, MutationKind};
use crate::sim::SimRng;

const NUMERIC_BOUNDARIES: [i64; 4] = [0, -1, 1, 1_000_000];
const EXTREME_BALANCES: [i64; 2] = [i64::MAX, i64::MIN];
const STRING_RESET_PROB: f64 = 0.1;

/// Randomizes initial state before a run starts.
#[derive(Debug, Clone)]
pub struct StateFuzzer {
    config: FuzzingConfig,
}

impl StateFuzzer {
    /// Create a fuzzer for the given configuration.
    pub fn new(config: FuzzingConfig) -> Self {
        Self { config }
    }

    /// Fuzz an initial state document.
    ///
    /// Non-object states, and every non-array entry of an object state, are
    /// returned as-is. Nothing is drawn when state fuzzing is off.
    pub fn fuzz_state(&self, rng: &mut SimRng, state: &Value) -> Fuzzed<Value> {
        let Value::Object(tables) = state else {
            return Fuzzed::unchanged(state.clone());
        };
        if !self.config.fuzz_states {
            return Fuzzed::unchanged(state.clone());
        }

        let mut mutations = Vec::new();
        let mut fuzzed = Map::new();
        for (name, entry) in tables {
            let value = match entry {
                Value::Array(records) => {
                    Value::Array(self.fuzz_table(rng, name, records, &mut mutations))
                }
                other => other.clone(),
            };
            fuzzed.insert(name.clone(), value);
        }
        Fuzzed {
            value: Value::Object(fuzzed),
            mutations,
        }
    }

    fn fuzz_table(
        &self,
        rng: &mut SimRng,
        name: &str,
        records: &[Value],
        mutations: &mut Vec<Mutation>,
    ) -> Vec<Value> {
        let empty = rng.random_bool(self.config.empty_collection_prob);
        let expand = rng.random_bool(self.config.expand_collection_prob);

        if empty {
            mutations.push(Mutation {
                field: name.to_string(),
                kind: MutationKind::EmptyCollection,
                original: Value::from(records.len()),
                mutated: Value::from(0),
            });
            return Vec::new();
        }

        if expand {
            let copies = rng.random_range(10..100usize);
            let mut expanded = Vec::with_capacity(copies * records.len());
            for copy in 0..copies {
                for (index, record) in records.iter().enumerate() {
                    let path = format!("{name}[{}]", copy * records.len() + index);
                    expanded.push(self.fuzz_record(rng, &path, record, mutations));
                }
            }
            mutations.push(Mutation {
                field: name.to_string(),
                kind: MutationKind::ExpandCollection,
                original: Value::from(records.len()),
                mutated: Value::from(expanded.len()),
            });
            return expanded;
        }

        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.fuzz_record(rng, &format!("{name}[{index}]"), record, mutations)
            })
            .collect()
    }

    fn fuzz_record(
        &self,
        rng: &mut SimRng,
        path: &str,
        record: &Value,
        mutations: &mut Vec<Mutation>,
    ) -> Value {
        let Value::Object(fields) = record else {
            return record.clone();
        };

        let mut fuzzed = fields.clone();
        for (key, value) in fields {
            if key.to_lowercase().contains("id") {
                continue;
            }
            let outcome = match value {
                Value::Number(number) => self.fuzz_number(rng, number),
                Value::String(text) => fuzz_string(rng, text),
                _ => None,
            };
            if let Some((kind, mutated)) = outcome {
                mutations.push(Mutation {
                    field: format!("{path}.{key}"),
                    kind,
                    original: value.clone(),
                    mutated: mutated.clone(),
                });
                fuzzed.insert(key.clone(), mutated);
            }
        }
        Value::Object(fuzzed)
    }

    fn fuzz_number(&self, rng: &mut SimRng, number: &Number) -> Option<(MutationKind, Value)> {
        let boundary = rng.random_bool(self.config.boundary_value_prob);
        let extreme = rng.random_bool(self.config.extreme_value_prob);
        let factor = 0.1 + rng.random_ratio() * 9.9;

        if boundary {
            let value = *rng.choose(&NUMERIC_BOUNDARIES)?;
            return Some((MutationKind::Boundary, Value::from(value)));
        }
        if extreme {
            let value = *rng.choose(&EXTREME_BALANCES)?;
            return Some((MutationKind::Extreme, Value::from(value)));
        }

        let scaled = if let Some(int) = number.as_i64() {
            Value::from((int as f64 * factor).round() as i64)
        } else {
            let float = number.as_f64()? * factor;
            Value::Number(Number::from_f64(float)?)
        };
        Some((MutationKind::Scale, scaled))
    }
}

fn fuzz_string(rng: &mut SimRng, text: &str) -> Option<(MutationKind, Value)> {
    let clear = rng.random_bool(STRING_RESET_PROB);
    let replace = rng.random_bool(STRING_RESET_PROB);

    if clear && !text.is_empty() {
        return Some((MutationKind::Boundary, Value::from("")));
    }
    if replace {
        let len = rng.random_range(5..16usize);
        let random: String = (0..len)
            .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
            .collect();
        return Some((MutationKind::RandomString, Value::from(random)));
    }
    None
}
