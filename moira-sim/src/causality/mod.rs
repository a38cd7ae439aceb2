//! Causal DAG reconstruction and critical-path analysis.
//!
//! ## Submodules
//!
//! - `tracker` - [`CausalityTracker`], the arena-backed index fed by the scheduler
//! - `dag` - [`CausalDag`], the read-only export consumed by invariants and visualizers

pub mod dag;
pub mod tracker;

pub use dag::{CausalDag, DagEdge};
pub use tracker::{CausalityTracker, PathWeight};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::SimulationError;
    use crate::sim::{CorrelationId, Event, EventId, Payload};

    const TX: CorrelationId = CorrelationId(7);

    fn event(id: u64, parent: Option<u64>, millis: u64) -> Event {
        Event {
            id: EventId(id),
            correlation_id: TX,
            causation_id: parent.map(EventId),
            timestamp: Duration::from_millis(millis),
            kind: format!("step-{id}"),
            payload: Payload::new(),
        }
    }

    fn ids(raw: &[u64]) -> Vec<EventId> {
        raw.iter().copied().map(EventId).collect()
    }

    #[test]
    fn critical_path_prefers_longer_chain() {
        // A(1) -> B(2) -> C(3), A -> D(4)
        let tracker = CausalityTracker::from_trace(
            1,
            vec![
                event(1, None, 0),
                event(4, Some(1), 1),
                event(2, Some(1), 2),
                event(3, Some(2), 3),
            ],
        )
        .unwrap();

        let path = tracker.get_critical_path(TX, PathWeight::EventCount).unwrap();
        assert_eq!(path, ids(&[1, 2, 3]));
    }

    #[test]
    fn critical_path_by_virtual_time() {
        // A -> B (10ms) and A -> C -> D (1ms + 1ms): time weight picks A -> B.
        let tracker = CausalityTracker::from_trace(
            1,
            vec![
                event(1, None, 0),
                event(3, Some(1), 1),
                event(4, Some(3), 2),
                event(2, Some(1), 10),
            ],
        )
        .unwrap();

        assert_eq!(
            tracker.get_critical_path(TX, PathWeight::VirtualTime).unwrap(),
            ids(&[1, 2])
        );
        assert_eq!(
            tracker.get_critical_path(TX, PathWeight::EventCount).unwrap(),
            ids(&[1, 3, 4])
        );
    }

    #[test]
    fn critical_path_ties_go_to_earliest_events() {
        // Two roots with equal-length chains; the earlier root wins, and at
        // its branch point the earlier child wins.
        let tracker = CausalityTracker::from_trace(
            1,
            vec![
                event(20, None, 5),
                event(21, Some(20), 6),
                event(10, None, 1),
                event(12, Some(10), 3),
                event(11, Some(10), 2),
            ],
        )
        .unwrap();

        assert_eq!(
            tracker.get_critical_path(TX, PathWeight::EventCount).unwrap(),
            ids(&[10, 11])
        );
    }

    #[test]
    fn dag_export_contains_group_edges() {
        let mut tracker = CausalityTracker::new(1);
        tracker.record(event(1, None, 0)).unwrap();
        tracker.record(event(2, Some(1), 1)).unwrap();
        let mut other = event(3, Some(2), 2);
        other.correlation_id = CorrelationId(8);
        tracker.record(other).unwrap();

        let dag = tracker.get_trace_as_dag(TX).unwrap();
        assert_eq!(dag.nodes.len(), 2);
        assert_eq!(
            dag.edges,
            vec![DagEdge {
                from: EventId(1),
                to: EventId(2)
            }]
        );
        assert!(dag.is_acyclic());
        assert_eq!(dag.roots(), ids(&[1]));
        assert_eq!(dag.leaves(), ids(&[2]));

        // The cross-transaction child is a root of its own group.
        let other_dag = tracker.get_trace_as_dag(CorrelationId(8)).unwrap();
        assert!(other_dag.edges.is_empty());
        assert_eq!(
            tracker.get_critical_path(CorrelationId(8), PathWeight::EventCount).unwrap(),
            ids(&[3])
        );
    }

    #[test]
    fn dag_json_shape() {
        let tracker =
            CausalityTracker::from_trace(1, vec![event(1, None, 0), event(2, Some(1), 1)]).unwrap();
        let rendered = tracker.get_trace_as_dag(TX).unwrap().to_json().unwrap();
        let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(json["edges"][0]["from"], 1);
        assert_eq!(json["edges"][0]["to"], 2);
        assert_eq!(json["nodes"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn unknown_correlation_is_not_found() {
        let tracker = CausalityTracker::new(1);
        let err = tracker.get_trace_as_dag(CorrelationId(99)).unwrap_err();
        assert_eq!(
            err,
            SimulationError::NotFound {
                correlation_id: CorrelationId(99)
            }
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn cycle_is_integrity_violation() {
        let trace = vec![event(1, Some(2), 0), event(2, Some(1), 0)];
        let tracker = CausalityTracker::from_trace(5, trace).unwrap();

        let err = tracker.get_critical_path(TX, PathWeight::EventCount).unwrap_err();
        assert!(matches!(err, SimulationError::IntegrityViolation { seed: 5, .. }));
        assert!(tracker.get_trace_as_dag(TX).is_err());
        assert!(tracker.ancestors(EventId(1)).is_err());
    }

    #[test]
    fn duplicate_and_self_cause_rejected() {
        let mut tracker = CausalityTracker::new(1);
        tracker.record(event(1, None, 0)).unwrap();
        assert!(tracker.record(event(1, None, 0)).is_err());
        assert!(tracker.record(event(2, Some(2), 0)).is_err());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn chains_backward_and_forward() {
        let tracker = CausalityTracker::from_trace(
            1,
            vec![
                event(1, None, 0),
                event(2, Some(1), 1),
                event(3, Some(2), 2),
                event(4, Some(1), 3),
            ],
        )
        .unwrap();

        assert_eq!(tracker.ancestors(EventId(3)).unwrap(), ids(&[3, 2, 1]));
        assert_eq!(tracker.descendants(EventId(1)).unwrap(), ids(&[1, 2, 3, 4]));
        assert!(tracker.descendants(EventId(42)).unwrap().is_empty());
    }

    #[test]
    fn out_of_order_trace_reconstructs_same_graph() {
        let in_order = CausalityTracker::from_trace(
            1,
            vec![event(1, None, 0), event(2, Some(1), 1), event(3, Some(2), 2)],
        )
        .unwrap();
        let shuffled = CausalityTracker::from_trace(
            1,
            vec![event(3, Some(2), 2), event(1, None, 0), event(2, Some(1), 1)],
        )
        .unwrap();

        assert_eq!(
            in_order.get_trace_as_dag(TX).unwrap(),
            shuffled.get_trace_as_dag(TX).unwrap()
        );
    }
}
