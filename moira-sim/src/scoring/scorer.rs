//! Aggregation of run outcomes into a reliability score.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::coverage::CoverageTracker;
use super::stats::{ConfidenceInterval, Z_95, wilson_interval};

/// What one finished run contributes to the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Seed of the run.
    pub seed: u64,
    /// Distinct abstract states visited during the run.
    pub states: BTreeSet<String>,
    /// Whether any invariant was violated (or the system faulted).
    pub violated: bool,
}

impl RunOutcome {
    /// Build an outcome from the sequence of states a run went through.
    pub fn new<I, T>(seed: u64, states: I, violated: bool) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            seed,
            states: states.into_iter().map(Into::into).collect(),
            violated,
        }
    }
}

/// Letter grade derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    /// Score of at least 95.
    A,
    /// Score of at least 85.
    B,
    /// Score of at least 70.
    C,
    /// Anything lower.
    F,
}

impl Grade {
    /// Grade for a score in `[0, 100]`.
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            Grade::A
        } else if score >= 85.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else {
            Grade::F
        }
    }

    /// Human-readable meaning of the grade.
    pub fn interpretation(&self) -> &'static str {
        match self {
            Grade::A => "Excellent - high confidence in system correctness",
            Grade::B => "Good - reasonable confidence, minor gaps possible",
            Grade::C => "Fair - more testing recommended",
            Grade::F => "Poor - failures found or coverage insufficient",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

/// Immutable result of [`ReliabilityScorer::score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityScore {
    /// `100 * wilson_lower * sample_coverage`, within `[0, 100]`.
    pub score: f64,
    /// Grade of `score`.
    pub grade: Grade,
    /// Unique states over state observations.
    pub coverage_rate: f64,
    /// Wilson interval around the pass rate.
    pub confidence_interval: ConfidenceInterval,
    /// Good-Turing probability of an unseen state.
    pub unseen_state_probability: f64,
    /// `1 - unseen_state_probability`.
    pub sample_coverage: f64,
    /// Distinct states across all runs.
    pub unique_states: u64,
    /// Sum over runs of distinct states visited.
    pub total_observations: u64,
    /// States seen in exactly one run.
    pub singleton_states: u64,
    /// Runs observed.
    pub runs: u64,
    /// Runs without violations.
    pub passing_runs: u64,
    /// Heaps'-law state-space estimate, once there is enough data.
    pub estimated_total_states: Option<u64>,
}

impl fmt::Display for ReliabilityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}/100 (grade {}) pass {}/{} [{:.3}, {:.3}], coverage {:.1}%",
            self.score,
            self.grade,
            self.passing_runs,
            self.runs,
            self.confidence_interval.lower,
            self.confidence_interval.upper,
            self.sample_coverage * 100.0
        )
    }
}

/// Accumulates run outcomes.
///
/// Owned by a single consumer; parallel runners funnel outcomes to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityScorer {
    coverage: CoverageTracker,
    runs: u64,
    passing: u64,
    z: f64,
}

impl Default for ReliabilityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliabilityScorer {
    /// A scorer using the 95% normal quantile.
    pub fn new() -> Self {
        Self::with_z(Z_95)
    }

    /// A scorer using a custom normal quantile.
    pub fn with_z(z: f64) -> Self {
        Self {
            coverage: CoverageTracker::new(),
            runs: 0,
            passing: 0,
            z,
        }
    }

    /// Record one finished run.
    pub fn observe(&mut self, outcome: &RunOutcome) {
        self.runs += 1;
        if !outcome.violated {
            self.passing += 1;
        }
        for state in &outcome.states {
            self.coverage.add_state(state.as_str());
        }
    }

    /// Fold in another scorer's counts.
    pub fn merge(&mut self, other: &ReliabilityScorer) {
        self.coverage.merge(&other.coverage);
        self.runs += other.runs;
        self.passing += other.passing;
    }

    /// Runs observed so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Coverage counters.
    pub fn coverage(&self) -> &CoverageTracker {
        &self.coverage
    }

    /// Compute the score from everything observed so far.
    pub fn score(&self) -> ReliabilityScore {
        let confidence_interval = wilson_interval(self.passing, self.runs, self.z);
        let unseen_state_probability = self.coverage.unseen_probability();
        let sample_coverage = 1.0 - unseen_state_probability;

        let score = (100.0 * confidence_interval.lower * sample_coverage).clamp(0.0, 100.0);
        ReliabilityScore {
            score,
            grade: Grade::from_score(score),
            coverage_rate: self.coverage.coverage_rate(),
            confidence_interval,
            unseen_state_probability,
            sample_coverage,
            unique_states: self.coverage.unique_states(),
            total_observations: self.coverage.total_observations(),
            singleton_states: self.coverage.singleton_states(),
            runs: self.runs,
            passing_runs: self.passing,
            estimated_total_states: self.coverage.estimate_total_states(),
        }
    }

    /// Rough number of additional runs needed to reach `target`.
    ///
    /// Assumes each doubling of runs adds about seven points, and never
    /// recommends fewer than the runs already made.
    pub fn recommend_runs(&self, target: f64) -> u64 {
        let current = self.score().score;
        if current >= target {
            return 0;
        }
        let runs = self.runs.max(1);
        let multiplier = 2f64.powf((target - current) / 7.0);
        let total = (runs as f64 * multiplier) as u64;
        total.saturating_sub(runs).max(runs)
    }
}
