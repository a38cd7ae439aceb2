//! Seeded perturbation of inputs, initial state, and orderings.

use std::collections::HashMap;
use std::time::Duration;

use moira_sim::{
    ChainMode, Event, EventId, FuzzingConfig, InputFuzzer, MutationKind, NewEvent, Payload,
    Scenario, ScenarioFuzzer, SimContext, SimRng, SimWorld, StateFuzzer, System, SystemFault,
};
use serde_json::{Value, json};

fn quiet() -> FuzzingConfig {
    FuzzingConfig {
        fuzz_scenarios: true,
        boundary_value_prob: 0.0,
        type_confusion_prob: 0.0,
        null_prob: 0.0,
        extreme_value_prob: 0.0,
        empty_collection_prob: 0.0,
        expand_collection_prob: 0.0,
        ..FuzzingConfig::default()
    }
}

fn transfer() -> Payload {
    match json!({"amount": 80, "memo": "rent", "urgent": false, "tags": ["a", "b"]}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[test]
fn input_fuzzing_is_reproducible() {
    let fuzzer = InputFuzzer::new(FuzzingConfig::default());
    let payload = transfer();
    for seed in 0..50 {
        let first = fuzzer.fuzz_payload(&mut SimRng::new(seed), &payload);
        let second = fuzzer.fuzz_payload(&mut SimRng::new(seed), &payload);
        assert_eq!(first, second);
    }
}

#[test]
fn zero_probabilities_leave_payload_alone_but_still_draw() {
    let fuzzer = InputFuzzer::new(quiet());
    let mut rng = SimRng::new(1);
    let fuzzed = fuzzer.fuzz_payload(&mut rng, &transfer());
    assert_eq!(fuzzed.value, transfer());
    assert!(fuzzed.mutations.is_empty());
    assert!(rng.draw_count() > 0);
}

#[test]
fn mutations_name_the_field_and_original() {
    let fuzzer = InputFuzzer::new(FuzzingConfig {
        null_prob: 1.0,
        ..quiet()
    });
    let fuzzed = fuzzer.fuzz_payload(&mut SimRng::new(3), &transfer());
    assert!(fuzzed.value.values().all(Value::is_null));

    let amount = fuzzed.mutations.iter().find(|m| m.field == "amount").unwrap();
    assert_eq!(amount.kind, MutationKind::Null);
    assert_eq!(amount.original, json!(80));
    assert_eq!(amount.mutated, Value::Null);
}

#[test]
fn state_tables_can_empty_or_expand() {
    let state = json!({
        "accounts": [{"id": "acc1", "balance": 100}, {"id": "acc2", "balance": 5}],
        "version": 3
    });

    let emptied = StateFuzzer::new(FuzzingConfig {
        empty_collection_prob: 1.0,
        ..quiet()
    })
    .fuzz_state(&mut SimRng::new(4), &state);
    assert_eq!(emptied.value["accounts"], json!([]));
    assert_eq!(emptied.value["version"], json!(3));

    let expanded = StateFuzzer::new(FuzzingConfig {
        expand_collection_prob: 1.0,
        ..quiet()
    })
    .fuzz_state(&mut SimRng::new(4), &state);
    let accounts = expanded.value["accounts"].as_array().unwrap();
    assert!((20..200).contains(&accounts.len()));
    assert!(accounts.iter().all(|account| account["id"].is_string()));
    assert_eq!(
        expanded.mutations.last().map(|m| m.kind),
        Some(MutationKind::ExpandCollection)
    );
}

#[test]
fn identifier_fields_survive_state_fuzzing() {
    let fuzzer = StateFuzzer::new(FuzzingConfig::default());
    let state = json!({"accounts": [{"account_id": 7, "id": "acc1", "balance": 100}]});
    for seed in 0..100 {
        let fuzzed = fuzzer.fuzz_state(&mut SimRng::new(seed), &state);
        if let Some(first) = fuzzed.value["accounts"].get(0) {
            assert_eq!(first["account_id"], json!(7));
            assert_eq!(first["id"], json!("acc1"));
        }
    }
}

/// Launches a short chain per `start`, with jittered delays.
struct Chains;

impl System for Chains {
    fn on_event(&mut self, event: &Event, ctx: &mut SimContext<'_>) -> Result<(), SystemFault> {
        let depth = event.field_i64("depth").unwrap_or(0);
        if depth < 3 {
            let delay = Duration::from_millis(ctx.rng().random_range(0..5));
            ctx.emit(NewEvent::new("link").with("depth", depth + 1).after(delay));
        }
        Ok(())
    }
}

#[test]
fn permutations_respect_causation() {
    let mut world = SimWorld::new(21, Chains);
    for _ in 0..4 {
        world.schedule(NewEvent::new("start")).unwrap();
    }
    world.run_to_completion().unwrap();
    let log = world.event_log().to_vec();
    assert_eq!(log.len(), 16);

    let fuzzer = ScenarioFuzzer::new(FuzzingConfig::default());
    let mut orders = Vec::new();
    for seed in 0..20 {
        let permuted = fuzzer.permute(&mut SimRng::new(seed), log.clone()).unwrap();
        assert_eq!(permuted.len(), log.len());

        let position: HashMap<EventId, usize> =
            permuted.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        for event in &permuted {
            if let Some(parent) = event.causation_id {
                assert!(position[&parent] < position[&event.id]);
            }
        }
        orders.push(permuted.iter().map(|event| event.id).collect::<Vec<_>>());
    }

    // Same seed, same order; across seeds the order varies.
    let again = fuzzer.permute(&mut SimRng::new(0), log).unwrap();
    assert_eq!(again.iter().map(|event| event.id).collect::<Vec<_>>(), orders[0]);
    assert!(orders.iter().any(|order| order != &orders[0]));
}

#[test]
fn combined_scenarios_keep_every_step() {
    let deposit = Scenario::new("deposit")
        .initial_state(json!({"accounts": []}))
        .step(NewEvent::new("deposit").with("n", 1))
        .step(NewEvent::new("deposit").with("n", 2));
    let withdraw = Scenario::new("withdraw").step(NewEvent::new("withdraw").with("n", 3));
    let fuzzer = ScenarioFuzzer::new(quiet());

    let both = [deposit.clone(), withdraw.clone()];
    let interleaved = fuzzer.combine(&mut SimRng::new(1), &both, ChainMode::Interleaved);
    assert_eq!(interleaved.name, "fuzzed_interleaved_deposit_withdraw");
    assert_eq!(interleaved.initial_state, json!({"accounts": []}));
    let numbers = |scenario: &Scenario| -> Vec<i64> {
        scenario.steps.iter().filter_map(|step| step.payload["n"].as_i64()).collect()
    };
    let order = numbers(&interleaved);
    assert_eq!(order, vec![1, 3, 2]);

    let parallel = fuzzer.combine(&mut SimRng::new(1), &both, ChainMode::Parallel);
    let mut pooled = numbers(&parallel);
    pooled.sort_unstable();
    assert_eq!(pooled, vec![1, 2, 3]);

    let off = ScenarioFuzzer::new(FuzzingConfig::default());
    let unchanged = off.combine(&mut SimRng::new(1), &both, ChainMode::Sequential);
    assert_eq!(unchanged, deposit);
}

/// Rejects any event whose `amount` is not a positive integer.
struct Strict {
    accepted: u32,
}

impl System for Strict {
    fn on_event(&mut self, event: &Event, _ctx: &mut SimContext<'_>) -> Result<(), SystemFault> {
        match event.field_i64("amount") {
            Some(amount) if amount > 0 => {
                self.accepted += 1;
                Ok(())
            }
            _ => Err(SystemFault::new("invalid amount")),
        }
    }
}

#[test]
fn fuzzed_inputs_surface_as_faults() {
    let mut world = SimWorld::new(13, Strict { accepted: 0 });
    world.enable_input_fuzzing(FuzzingConfig {
        null_prob: 1.0,
        ..quiet()
    });
    for _ in 0..5 {
        world.schedule(NewEvent::new("pay").with("amount", 10)).unwrap();
    }
    world.run_to_completion().unwrap();

    assert_eq!(world.faults().len(), 5);
    assert_eq!(world.mutations().len(), 5);
    assert_eq!(world.system().accepted, 0);
    assert_eq!(world.events_processed(), 5);
}
