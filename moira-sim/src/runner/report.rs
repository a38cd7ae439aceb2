//! Simulation metrics and reporting.
//!
//! This module provides types for collecting and reporting simulation results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::fuzz::Mutation;
use crate::invariant::InvariantResult;
use crate::scoring::{ReliabilityScore, ReliabilityScorer, RunOutcome};
use crate::sim::{FaultRecord, RunStatus};

/// Core metrics collected during a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SimulationMetrics {
    /// Wall-clock time taken for the simulation
    pub wall_time: Duration,
    /// Simulated logical time elapsed
    pub simulated_time: Duration,
    /// Number of events processed
    pub events_processed: u64,
}

impl SimulationMetrics {
    fn accumulate(&mut self, other: &SimulationMetrics) {
        self.wall_time += other.wall_time;
        self.simulated_time += other.simulated_time;
        self.events_processed += other.events_processed;
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// Seed of the run.
    pub seed: u64,
    /// How the run ended.
    pub status: RunStatus,
    /// One result per configured invariant.
    pub invariant_results: Vec<InvariantResult>,
    /// Faults raised by the system under test.
    pub faults: Vec<FaultRecord>,
    /// State and input mutations applied by fuzzing.
    pub mutations: Vec<Mutation>,
    /// Run metrics.
    pub metrics: SimulationMetrics,
    /// Fingerprint of the system state once the run ended, if it exposes one.
    pub final_state: Option<String>,
    /// What the run contributes to the reliability score.
    pub outcome: RunOutcome,
}

impl RunResult {
    /// Whether every invariant held and the system never faulted.
    pub fn passed(&self) -> bool {
        !self.outcome.violated
    }

    /// Invariants that did not hold.
    pub fn violations(&self) -> impl Iterator<Item = &InvariantResult> {
        self.invariant_results.iter().filter(|result| !result.satisfied)
    }

    /// Distinct reasons this run failed.
    ///
    /// A violated invariant reads `<id> violated`; a fault contributes the
    /// first line of its message.
    pub fn failure_patterns(&self) -> BTreeSet<String> {
        let violations = self
            .violations()
            .map(|violation| format!("{} violated", violation.invariant_id));
        let faults = self
            .faults
            .iter()
            .map(|fault| fault.message.lines().next().unwrap_or_default().to_string());
        violations.chain(faults).collect()
    }
}

/// Comprehensive report of a simulation batch with statistical analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    /// Base seed the iteration seeds were derived from.
    pub base_seed: u64,
    /// Whether the base seed was generated rather than configured.
    pub seed_generated: bool,
    /// Number of iterations executed
    pub iterations: usize,
    /// Number of successful runs
    pub successful_runs: usize,
    /// Number of failed runs
    pub failed_runs: usize,
    /// Aggregated metrics across all runs
    pub metrics: SimulationMetrics,
    /// Individual results, ordered by iteration
    pub runs: Vec<RunResult>,
    /// Seeds used for each iteration
    pub seeds_used: Vec<u64>,
    /// failed seeds
    pub seeds_failing: Vec<u64>,
    /// Reliability score over all runs
    pub score: ReliabilityScore,
}

impl SimulationReport {
    /// Assemble a report from results (in any order) and the scorer that observed them.
    pub(crate) fn from_runs(
        base_seed: u64,
        seed_generated: bool,
        mut runs: Vec<RunResult>,
        scorer: &ReliabilityScorer,
    ) -> Self {
        runs.sort_by_key(|run| run.iteration);

        let mut metrics = SimulationMetrics::default();
        for run in &runs {
            metrics.accumulate(&run.metrics);
        }
        let seeds_used = runs.iter().map(|run| run.seed).collect();
        let seeds_failing: Vec<u64> = runs
            .iter()
            .filter(|run| !run.passed())
            .map(|run| run.seed)
            .collect();

        Self {
            base_seed,
            seed_generated,
            iterations: runs.len(),
            successful_runs: runs.len() - seeds_failing.len(),
            failed_runs: seeds_failing.len(),
            metrics,
            runs,
            seeds_used,
            seeds_failing,
            score: scorer.score(),
        }
    }

    /// Calculate the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            (self.successful_runs as f64 / self.iterations as f64) * 100.0
        }
    }

    /// Get the average wall time per iteration.
    pub fn average_wall_time(&self) -> Duration {
        if self.iterations == 0 {
            Duration::ZERO
        } else {
            self.metrics.wall_time / self.iterations as u32
        }
    }

    /// Get the average simulated time per iteration.
    pub fn average_simulated_time(&self) -> Duration {
        if self.iterations == 0 {
            Duration::ZERO
        } else {
            self.metrics.simulated_time / self.iterations as u32
        }
    }

    /// Get the average number of events processed per iteration.
    pub fn average_events_processed(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.metrics.events_processed as f64 / self.iterations as f64
        }
    }

    /// Every invariant result of every run, in iteration order.
    pub fn invariant_results(&self) -> impl Iterator<Item = (u64, &InvariantResult)> {
        self.runs
            .iter()
            .flat_map(|run| run.invariant_results.iter().map(move |result| (run.seed, result)))
    }

    /// Every recorded fault, in iteration order.
    pub fn faults(&self) -> impl Iterator<Item = (u64, &FaultRecord)> {
        self.runs
            .iter()
            .flat_map(|run| run.faults.iter().map(move |fault| (run.seed, fault)))
    }

    /// Result of the run with the given seed.
    pub fn run_for_seed(&self, seed: u64) -> Option<&RunResult> {
        self.runs.iter().find(|run| run.seed == seed)
    }

    /// Seeds grouped by the final state their run ended in.
    ///
    /// More than one key means the outcome depends on the interleaving.
    /// Runs whose system exposes no fingerprint are left out.
    pub fn divergent_states(&self) -> BTreeMap<String, Vec<u64>> {
        let mut groups: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for run in &self.runs {
            if let Some(state) = &run.final_state {
                groups.entry(state.clone()).or_default().push(run.seed);
            }
        }
        groups
    }

    /// Failing seeds grouped by each distinct failure pattern they showed.
    pub fn failure_patterns(&self) -> BTreeMap<String, Vec<u64>> {
        let mut groups: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for run in self.runs.iter().filter(|run| !run.passed()) {
            for pattern in run.failure_patterns() {
                groups.entry(pattern).or_default().push(run.seed);
            }
        }
        groups
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Report ===")?;
        if self.seed_generated {
            writeln!(f, "Base Seed: {} (generated)", self.base_seed)?;
        } else {
            writeln!(f, "Base Seed: {}", self.base_seed)?;
        }
        writeln!(f, "Iterations: {}", self.iterations)?;
        writeln!(f, "Successful: {}", self.successful_runs)?;
        writeln!(f, "Failed: {}", self.failed_runs)?;
        writeln!(f, "Success Rate: {:.2}%", self.success_rate())?;
        writeln!(f)?;
        writeln!(f, "Average Wall Time: {:?}", self.average_wall_time())?;
        writeln!(f, "Average Simulated Time: {:?}", self.average_simulated_time())?;
        writeln!(f, "Average Events Processed: {:.1}", self.average_events_processed())?;
        writeln!(f)?;
        writeln!(f, "Reliability: {}", self.score)?;
        writeln!(f, "  {}", self.score.grade.interpretation())?;
        writeln!(
            f,
            "  states: {} unique / {} observed, {} singletons",
            self.score.unique_states, self.score.total_observations, self.score.singleton_states
        )?;
        if let Some(estimate) = self.score.estimated_total_states {
            writeln!(f, "  estimated state space: {estimate}")?;
        }

        let divergent = self.divergent_states();
        if divergent.len() > 1 {
            writeln!(f)?;
            writeln!(f, "Divergent final states: {}", divergent.len())?;
            for (state, seeds) in &divergent {
                writeln!(f, "  {state}: {} runs", seeds.len())?;
            }
        }

        if !self.seeds_failing.is_empty() {
            writeln!(f)?;
            writeln!(f, "Faulty seeds: {:?}", self.seeds_failing)?;
            for (pattern, seeds) in self.failure_patterns() {
                writeln!(f, "  pattern '{pattern}': {} runs", seeds.len())?;
            }
            for run in self.runs.iter().filter(|run| !run.passed()) {
                for violation in run.violations() {
                    let at = violation
                        .violating_event_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "end of trace".to_string());
                    writeln!(
                        f,
                        "  seed {}: {} violated at {}",
                        run.seed, violation.invariant_id, at
                    )?;
                }
                for fault in &run.faults {
                    writeln!(
                        f,
                        "  seed {}: fault in '{}' at {:?}: {}",
                        run.seed, fault.kind, fault.time, fault.message
                    )?;
                }
            }
        }

        Ok(())
    }
}
