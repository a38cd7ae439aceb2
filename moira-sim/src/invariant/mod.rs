//! Trait-based invariant evaluation over finished traces.
//!
//! An [`Invariant`] inspects the ordered event log of a run (or the causal
//! graph of one transaction) and reports whether it held. Evaluation happens
//! after the run, so invariants never influence scheduling.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::causality::CausalDag;
use crate::sim::{Event, EventId};

pub mod temporal;

pub use temporal::{
    Always, Eventually, LeadsTo, Never, Until, always, eventually, leads_to, never, until,
};

/// Outcome of evaluating one invariant against one trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantResult {
    /// Name of the evaluated invariant.
    pub invariant_id: String,
    /// Whether the invariant held.
    pub satisfied: bool,
    /// First event at which the violation became observable, if any.
    pub violating_event_id: Option<EventId>,
}

impl InvariantResult {
    /// The invariant held.
    pub fn holds(invariant_id: impl Into<String>) -> Self {
        Self {
            invariant_id: invariant_id.into(),
            satisfied: true,
            violating_event_id: None,
        }
    }

    /// The invariant was violated, optionally at a specific event.
    pub fn violated(invariant_id: impl Into<String>, event: Option<EventId>) -> Self {
        Self {
            invariant_id: invariant_id.into(),
            satisfied: false,
            violating_event_id: event,
        }
    }
}

/// A named property of a trace.
///
/// Invariants are shared across parallel workers, hence `Send + Sync`.
///
/// # Example
///
/// ```
/// use moira_sim::{Invariant, always};
///
/// let non_negative = always("non_negative_balance", |event| {
///     event.field_i64("balance").is_none_or(|balance| balance >= 0)
/// });
/// assert_eq!(non_negative.name(), "non_negative_balance");
/// assert!(non_negative.evaluate(&[]).satisfied);
/// ```
pub trait Invariant: Send + Sync {
    /// The human-readable name of this invariant.
    fn name(&self) -> &str;

    /// Evaluate against an event trace in dispatch order.
    fn evaluate(&self, trace: &[Event]) -> InvariantResult;

    /// Evaluate against the causal graph of one transaction.
    ///
    /// Defaults to evaluating the graph's nodes in time order.
    fn evaluate_dag(&self, dag: &CausalDag) -> InvariantResult {
        self.evaluate(&dag.nodes)
    }
}

impl<I: Invariant + ?Sized> Invariant for Arc<I> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn evaluate(&self, trace: &[Event]) -> InvariantResult {
        (**self).evaluate(trace)
    }

    fn evaluate_dag(&self, dag: &CausalDag) -> InvariantResult {
        (**self).evaluate_dag(dag)
    }
}

/// Create a shared invariant from a name and closure.
///
/// The closure returns `None` when the trace is fine and `Some(event)` naming
/// the first offending event otherwise.
pub fn invariant_fn<F>(name: &str, check: F) -> Arc<dyn Invariant>
where
    F: Fn(&[Event]) -> Option<EventId> + Send + Sync + 'static,
{
    Arc::new(FnInvariant {
        name: name.to_string(),
        check,
    })
}

struct FnInvariant<F> {
    name: String,
    check: F,
}

impl<F> Invariant for FnInvariant<F>
where
    F: Fn(&[Event]) -> Option<EventId> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, trace: &[Event]) -> InvariantResult {
        match (self.check)(trace) {
            None => InvariantResult::holds(&self.name),
            Some(event) => InvariantResult::violated(&self.name, Some(event)),
        }
    }
}
