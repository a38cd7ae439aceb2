//! Interleaving perturbation and scenario chaining.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::FuzzingConfig;
use crate::sim::{Event, EventId, NewEvent, SimRng};
use crate::{SimulationError, SimulationResult};

/// A named list of root events plus the initial state they run against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, used in reports.
    pub name: String,
    /// State handed to the system factory.
    #[serde(default)]
    pub initial_state: Value,
    /// Events scheduled before the run starts.
    #[serde(default)]
    pub steps: Vec<NewEvent>,
}

impl Scenario {
    /// An empty scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the initial state.
    pub fn initial_state(mut self, state: Value) -> Self {
        self.initial_state = state;
        self
    }

    /// Append a step.
    pub fn step(mut self, event: NewEvent) -> Self {
        self.steps.push(event);
        self
    }
}

/// How [`ScenarioFuzzer::combine`] merges scenario steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// All steps of the first scenario, then the second, and so on.
    #[default]
    Sequential,
    /// All steps pooled and shuffled.
    Parallel,
    /// Round-robin, one step from each scenario at a time.
    Interleaved,
}

impl fmt::Display for ChainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainMode::Sequential => "sequential",
            ChainMode::Parallel => "parallel",
            ChainMode::Interleaved => "interleaved",
        };
        f.write_str(name)
    }
}

/// Perturbs event orderings without breaking causation.
#[derive(Debug, Clone)]
pub struct ScenarioFuzzer {
    config: FuzzingConfig,
}

impl ScenarioFuzzer {
    /// Create a fuzzer for the given configuration.
    pub fn new(config: FuzzingConfig) -> Self {
        Self { config }
    }

    /// A seeded random linear extension of the causation order.
    ///
    /// An event is never placed before its parent. Parents that are not part
    /// of `events` impose no constraint. Returns `IntegrityViolation` if the
    /// causation links among `events` form a cycle.
    pub fn permute(&self, rng: &mut SimRng, events: Vec<Event>) -> SimulationResult<Vec<Event>> {
        let ids: HashSet<EventId> = events.iter().map(|event| event.id).collect();
        let mut waiting: HashMap<EventId, Vec<usize>> = HashMap::new();
        let mut ready = Vec::new();
        for (index, event) in events.iter().enumerate() {
            match event.causation_id {
                Some(parent) if ids.contains(&parent) => {
                    waiting.entry(parent).or_default().push(index)
                }
                _ => ready.push(index),
            }
        }

        let mut order = Vec::with_capacity(events.len());
        while !ready.is_empty() {
            let pick = rng.choose_index(ready.len());
            let index = ready.remove(pick);
            if let Some(children) = waiting.remove(&events[index].id) {
                ready.extend(children);
            }
            order.push(index);
        }

        if order.len() != events.len() {
            let time = events.iter().map(|event| event.timestamp).max().unwrap_or_default();
            let reason = format!(
                "causation cycle among {} of {} events",
                events.len() - order.len(),
                events.len()
            );
            tracing::error!(seed = rng.seed(), ?time, "{}", reason);
            return Err(SimulationError::IntegrityViolation {
                seed: rng.seed(),
                time,
                reason,
            });
        }

        let mut slots: Vec<Option<Event>> = events.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|index| slots[index].take()).collect())
    }

    /// Shuffle the steps that have no explicit causal parent.
    ///
    /// Steps naming a parent keep their position.
    pub fn shuffle_roots(&self, rng: &mut SimRng, steps: &mut [NewEvent]) {
        let positions: Vec<usize> = steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.causation_id.is_none())
            .map(|(index, _)| index)
            .collect();
        let mut roots: Vec<NewEvent> =
            positions.iter().map(|&index| steps[index].clone()).collect();
        rng.shuffle(&mut roots);
        for (index, root) in positions.into_iter().zip(roots) {
            steps[index] = root;
        }
    }

    /// Merge several scenarios into one.
    ///
    /// The combined scenario runs against the first scenario's initial state.
    /// With scenario fuzzing off, or fewer than two scenarios, the first
    /// scenario is returned unchanged.
    pub fn combine(&self, rng: &mut SimRng, scenarios: &[Scenario], mode: ChainMode) -> Scenario {
        let Some(first) = scenarios.first() else {
            return Scenario::default();
        };
        if !self.config.fuzz_scenarios || scenarios.len() < 2 {
            return first.clone();
        }

        let names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        let steps = match mode {
            ChainMode::Sequential => {
                scenarios.iter().flat_map(|s| s.steps.iter().cloned()).collect()
            }
            ChainMode::Parallel => {
                let mut pooled: Vec<NewEvent> =
                    scenarios.iter().flat_map(|s| s.steps.iter().cloned()).collect();
                rng.shuffle(&mut pooled);
                pooled
            }
            ChainMode::Interleaved => {
                let longest = scenarios.iter().map(|s| s.steps.len()).max().unwrap_or(0);
                (0..longest)
                    .flat_map(|round| {
                        scenarios.iter().filter_map(move |s| s.steps.get(round).cloned())
                    })
                    .collect()
            }
        };

        Scenario {
            name: format!("fuzzed_{mode}_{}", names.join("_")),
            initial_state: first.initial_state.clone(),
            steps,
        }
    }
}
