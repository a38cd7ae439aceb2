//! Seed 42 reproduces the overdraft, step for step.

use moira_sim::{
    Invariant, RunStatus, SchedulerConfig, SimRng, SimWorld, SimulationBuilder, TieBreak,
};

use crate::banking::{
    Bank, DebitMode, OPENING_BALANCE, WITHDRAWAL, non_negative_balance, opening_state, withdrawal,
};
use crate::init_tracing;

/// Seed whose first debit lands before the second check.
const SERIALIZED_SEED: u64 = 23;

fn race(seed: u64, mode: DebitMode) -> SimWorld<Bank> {
    race_with(seed, mode, SchedulerConfig::default())
}

fn race_with(seed: u64, mode: DebitMode, config: SchedulerConfig) -> SimWorld<Bank> {
    let bank = Bank::new(OPENING_BALANCE, mode);
    let mut world = SimWorld::with_rng(SimRng::new(seed), bank, config);
    let transaction = world.begin_transaction();
    world.schedule(withdrawal().in_transaction(transaction)).unwrap();
    world.schedule(withdrawal().in_transaction(transaction)).unwrap();
    assert_eq!(world.run_to_completion().unwrap(), RunStatus::Completed);
    world
}

#[test]
fn seed_42_overdraws_the_account() {
    init_tracing();
    let world = race(42, DebitMode::Trusting);

    assert_eq!(world.system().balance, OPENING_BALANCE - 2 * WITHDRAWAL);
    assert!(world.faults().is_empty());

    // withdraw, check and debit twice, plus one balance_changed per debit
    assert_eq!(world.events_processed(), 8);
    let kinds: Vec<&str> = world.event_log().iter().map(|event| event.kind.as_str()).collect();
    let second_check = kinds.iter().rposition(|kind| *kind == "check").unwrap();
    let first_debit = kinds.iter().position(|kind| *kind == "debit").unwrap();
    assert!(second_check < first_debit, "{kinds:?}");

    let result = non_negative_balance().evaluate(world.event_log());
    assert!(!result.satisfied);
    let culprit = result.violating_event_id.unwrap();
    let event = world.event_log().iter().find(|event| event.id == culprit).unwrap();
    assert_eq!(event.kind, "balance_changed");
    assert_eq!(event.field_i64("balance"), Some(OPENING_BALANCE - 2 * WITHDRAWAL));
}

#[test]
fn debit_landing_before_the_second_check_prevents_the_overdraft() {
    let world = race(SERIALIZED_SEED, DebitMode::Trusting);

    assert_eq!(world.system().balance, OPENING_BALANCE - WITHDRAWAL);
    assert!(non_negative_balance().evaluate(world.event_log()).satisfied);

    let kinds: Vec<&str> = world.event_log().iter().map(|event| event.kind.as_str()).collect();
    let first_debit = kinds.iter().position(|kind| *kind == "debit").unwrap();
    let second_check = kinds.iter().rposition(|kind| *kind == "check").unwrap();
    assert!(first_debit < second_check, "{kinds:?}");
    assert_eq!(kinds.last(), Some(&"rejected"));
}

#[test]
fn overdraft_depends_on_the_interleaving() {
    let overdrawn: Vec<bool> = (0..100)
        .map(|seed| race(seed, DebitMode::Trusting).system().balance < 0)
        .collect();
    assert!(overdrawn.iter().any(|&overdrawn| overdrawn));
    assert!(overdrawn.iter().any(|&overdrawn| !overdrawn));

    // Insertion order always runs both checks before either debit.
    let fifo = SchedulerConfig {
        tie_break: TieBreak::Fifo,
        ..SchedulerConfig::default()
    };
    let serialized = race_with(SERIALIZED_SEED, DebitMode::Trusting, fifo);
    assert_eq!(serialized.system().balance, OPENING_BALANCE - 2 * WITHDRAWAL);
}

#[test]
fn seed_42_replays_byte_for_byte() {
    let first = race(42, DebitMode::Trusting);
    let second = race(42, DebitMode::Trusting);
    assert_eq!(first.event_log_bytes().unwrap(), second.event_log_bytes().unwrap());
    assert_eq!(first.rng_state(), second.rng_state());
    assert_eq!(first.visited_states(), second.visited_states());
}

#[test]
fn overdraft_is_traceable_to_its_withdrawal() {
    let world = race(42, DebitMode::Trusting);
    let last_change = world
        .event_log()
        .iter()
        .rev()
        .find(|event| event.kind == "balance_changed")
        .unwrap();

    let chain = world.tracker().ancestors(last_change.id).unwrap();
    let kinds: Vec<&str> = chain
        .iter()
        .map(|id| world.tracker().get(*id).unwrap().kind.as_str())
        .collect();
    assert_eq!(kinds, vec!["balance_changed", "debit", "check", "withdraw"]);
}

#[test]
fn rechecking_debit_keeps_balance_non_negative() {
    let world = race(42, DebitMode::Rechecking);
    assert_eq!(world.system().balance, OPENING_BALANCE - WITHDRAWAL);
    assert!(non_negative_balance().evaluate(world.event_log()).satisfied);
    assert!(world.event_log().iter().any(|event| event.kind == "rejected"));
}

#[test]
fn builder_reports_the_failing_seed() {
    let report = SimulationBuilder::new()
        .seed(42)
        .iterations(1)
        .initial_state(opening_state())
        .step(withdrawal())
        .step(withdrawal())
        .invariant(non_negative_balance())
        .run(|state| Bank::from_state(state, DebitMode::Trusting))
        .unwrap();

    assert_eq!(report.seeds_used, vec![42]);
    assert_eq!(report.seeds_failing, vec![42]);
    let run = report.run_for_seed(42).unwrap();
    assert_eq!(run.violations().count(), 1);
    assert!(report.to_string().contains("non_negative_balance violated"));
}
