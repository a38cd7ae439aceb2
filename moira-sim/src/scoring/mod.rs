//! Statistical reliability scoring across many runs.
//!
//! The score combines two signals: the Wilson lower bound on the pass rate
//! (how sure we are runs pass) and Good-Turing sample coverage (how sure we
//! are the runs explored the state space). Both degrade gracefully to the
//! most conservative value when there is no data.

pub mod coverage;
pub mod scorer;
pub mod stats;

pub use coverage::{CoverageTracker, state_fingerprint};
pub use scorer::{Grade, ReliabilityScore, ReliabilityScorer, RunOutcome};
pub use stats::{ConfidenceInterval, Z_95, good_turing_unseen, wilson_interval};
