//! Linear-time evaluators over finite traces.
//!
//! "Eventually" means at the current event or any later one.

use super::{Invariant, InvariantResult};
use crate::sim::Event;

/// `P` holds at every event.
pub struct Always<P> {
    name: String,
    predicate: P,
}

/// `P` holds at no event.
pub struct Never<P> {
    name: String,
    predicate: P,
}

/// `P` holds at some event.
pub struct Eventually<P> {
    name: String,
    predicate: P,
}

/// `P` holds at every event before the first `Q`, and `Q` occurs.
pub struct Until<P, Q> {
    name: String,
    hold: P,
    release: Q,
}

/// Every event satisfying `P` is eventually followed by one satisfying `Q`.
pub struct LeadsTo<P, Q> {
    name: String,
    trigger: P,
    response: Q,
}

/// Build an [`Always`] invariant.
pub fn always<P>(name: impl Into<String>, predicate: P) -> Always<P>
where
    P: Fn(&Event) -> bool + Send + Sync,
{
    Always {
        name: name.into(),
        predicate,
    }
}

/// Build a [`Never`] invariant.
pub fn never<P>(name: impl Into<String>, predicate: P) -> Never<P>
where
    P: Fn(&Event) -> bool + Send + Sync,
{
    Never {
        name: name.into(),
        predicate,
    }
}

/// Build an [`Eventually`] invariant.
pub fn eventually<P>(name: impl Into<String>, predicate: P) -> Eventually<P>
where
    P: Fn(&Event) -> bool + Send + Sync,
{
    Eventually {
        name: name.into(),
        predicate,
    }
}

/// Build an [`Until`] invariant.
pub fn until<P, Q>(name: impl Into<String>, hold: P, release: Q) -> Until<P, Q>
where
    P: Fn(&Event) -> bool + Send + Sync,
    Q: Fn(&Event) -> bool + Send + Sync,
{
    Until {
        name: name.into(),
        hold,
        release,
    }
}

/// Build a [`LeadsTo`] invariant.
pub fn leads_to<P, Q>(name: impl Into<String>, trigger: P, response: Q) -> LeadsTo<P, Q>
where
    P: Fn(&Event) -> bool + Send + Sync,
    Q: Fn(&Event) -> bool + Send + Sync,
{
    LeadsTo {
        name: name.into(),
        trigger,
        response,
    }
}

impl<P> Invariant for Always<P>
where
    P: Fn(&Event) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, trace: &[Event]) -> InvariantResult {
        match trace.iter().find(|event| !(self.predicate)(*event)) {
            Some(event) => InvariantResult::violated(&self.name, Some(event.id)),
            None => InvariantResult::holds(&self.name),
        }
    }
}

impl<P> Invariant for Never<P>
where
    P: Fn(&Event) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, trace: &[Event]) -> InvariantResult {
        match trace.iter().find(|event| (self.predicate)(*event)) {
            Some(event) => InvariantResult::violated(&self.name, Some(event.id)),
            None => InvariantResult::holds(&self.name),
        }
    }
}

impl<P> Invariant for Eventually<P>
where
    P: Fn(&Event) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, trace: &[Event]) -> InvariantResult {
        if trace.iter().any(|event| (self.predicate)(event)) {
            InvariantResult::holds(&self.name)
        } else {
            InvariantResult::violated(&self.name, None)
        }
    }
}

impl<P, Q> Invariant for Until<P, Q>
where
    P: Fn(&Event) -> bool + Send + Sync,
    Q: Fn(&Event) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, trace: &[Event]) -> InvariantResult {
        for event in trace {
            if (self.release)(event) {
                return InvariantResult::holds(&self.name);
            }
            if !(self.hold)(event) {
                return InvariantResult::violated(&self.name, Some(event.id));
            }
        }
        InvariantResult::violated(&self.name, None)
    }
}

impl<P, Q> Invariant for LeadsTo<P, Q>
where
    P: Fn(&Event) -> bool + Send + Sync,
    Q: Fn(&Event) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, trace: &[Event]) -> InvariantResult {
        // Triggers after the last response are the unanswered ones.
        let answered_up_to = trace.iter().rposition(|event| (self.response)(event));
        let unanswered = trace
            .iter()
            .enumerate()
            .filter(|(index, _)| answered_up_to.is_none_or(|last| *index > last))
            .find(|(_, event)| (self.trigger)(*event));
        match unanswered {
            Some((_, event)) => InvariantResult::violated(&self.name, Some(event.id)),
            None => InvariantResult::holds(&self.name),
        }
    }
}
