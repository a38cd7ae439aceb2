//! Scoring the bank over many seeds.

use moira_sim::{FuzzingConfig, Grade, NewEvent, SimulationBuilder};

use crate::banking::{
    Bank, DebitMode, OPENING_BALANCE, WITHDRAWAL, non_negative_balance, opening_state, withdrawal,
};
use crate::init_tracing;

fn bank_batch(seed: u64, iterations: usize) -> SimulationBuilder {
    SimulationBuilder::new()
        .seed(seed)
        .iterations(iterations)
        .initial_state(opening_state())
        .step(withdrawal())
        .step(withdrawal())
        .invariant(non_negative_balance())
}

#[test]
fn hundred_racy_runs_grade_f() {
    init_tracing();
    let report = bank_batch(42, 100)
        .run(|state| Bank::from_state(state, DebitMode::Trusting))
        .unwrap();

    assert_eq!(report.iterations, 100);
    assert_eq!(report.seeds_failing.first(), Some(&42));
    assert!(report.failed_runs > 50, "failed {}", report.failed_runs);
    assert!(report.failed_runs < 100, "failed {}", report.failed_runs);
    assert!(report.score.score < 70.0, "score {}", report.score.score);
    assert_eq!(report.score.grade, Grade::F);

    let mut distinct = report.seeds_used.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), 100);
}

#[test]
fn racy_runs_diverge_by_final_balance() {
    let report = bank_batch(42, 100)
        .run(|state| Bank::from_state(state, DebitMode::Trusting))
        .unwrap();

    let overdrawn = format!("balance={}", OPENING_BALANCE - 2 * WITHDRAWAL);
    let serialized = format!("balance={}", OPENING_BALANCE - WITHDRAWAL);
    let divergent = report.divergent_states();
    assert_eq!(divergent.keys().collect::<Vec<_>>(), vec![&overdrawn, &serialized]);
    assert_eq!(divergent[&overdrawn], report.seeds_failing);
    assert_eq!(
        divergent.values().map(Vec::len).sum::<usize>(),
        report.iterations
    );
    assert!(report.to_string().contains("Divergent final states: 2"));
}

#[test]
fn failure_patterns_separate_faults_from_violations() {
    // A withdrawal without an amount faults in every run.
    let report = bank_batch(42, 100)
        .step(NewEvent::new("withdraw").with("account", "acc1"))
        .run(|state| Bank::from_state(state, DebitMode::Trusting))
        .unwrap();

    assert_eq!(report.failed_runs, 100);
    let patterns = report.failure_patterns();
    assert_eq!(patterns.len(), 2);
    assert_eq!(patterns["withdraw without an integer amount"], report.seeds_used);

    let overdrawn = format!("balance={}", OPENING_BALANCE - 2 * WITHDRAWAL);
    let violating = &patterns["non_negative_balance violated"];
    assert_eq!(violating, &report.divergent_states()[&overdrawn]);
    assert!(violating.len() < 100);
}

#[test]
fn hundred_safe_runs_grade_a() {
    let report = bank_batch(42, 100)
        .run(|state| Bank::from_state(state, DebitMode::Rechecking))
        .unwrap();

    assert_eq!(report.failed_runs, 0);
    // Only balance=100 and balance=20 are ever visited, so nothing is a singleton.
    assert_eq!(report.score.unique_states, 2);
    assert_eq!(report.score.unseen_state_probability, 0.0);
    assert!(report.score.score > 95.0, "score {}", report.score.score);
    assert_eq!(report.score.grade, Grade::A);
}

#[test]
fn fuzzed_batch_is_reproducible() {
    let run = || {
        bank_batch(7, 30)
            .fuzzing(FuzzingConfig::default())
            .run(|state| Bank::from_state(state, DebitMode::Rechecking))
            .unwrap()
    };
    let first = run();
    let second = run();

    assert_eq!(first.seeds_used, second.seeds_used);
    assert_eq!(first.seeds_failing, second.seeds_failing);
    assert_eq!(first.score, second.score);
    let mutations = |report: &moira_sim::SimulationReport| {
        report.runs.iter().map(|run| run.mutations.clone()).collect::<Vec<_>>()
    };
    assert_eq!(mutations(&first), mutations(&second));
    assert!(first.runs.iter().any(|run| !run.mutations.is_empty()));
}

#[tokio::test]
async fn parallel_batch_matches_sequential() {
    let sequential = bank_batch(99, 40)
        .run(|state| Bank::from_state(state, DebitMode::Trusting))
        .unwrap();
    let parallel = bank_batch(99, 40)
        .run_parallel(4, |state| Bank::from_state(state, DebitMode::Trusting))
        .await
        .unwrap();

    assert_eq!(sequential.seeds_used, parallel.seeds_used);
    assert_eq!(sequential.seeds_failing, parallel.seeds_failing);
    assert_eq!(sequential.score, parallel.score);
    assert_eq!(sequential.metrics.events_processed, parallel.metrics.events_processed);
}
