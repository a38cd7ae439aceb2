//! A single-account bank with a check-then-debit race.

use std::time::Duration;

use moira_sim::{Event, Invariant, NewEvent, SimContext, System, SystemFault, always};
use serde_json::{Value, json};

/// Balance every test starts from.
pub const OPENING_BALANCE: i64 = 100;

/// Amount of each racing withdrawal.
pub const WITHDRAWAL: i64 = 80;

/// How a debit treats the balance it was approved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitMode {
    /// Apply the debit unconditionally, trusting the earlier check.
    Trusting,
    /// Re-check the balance at debit time.
    Rechecking,
}

pub struct Bank {
    pub balance: i64,
    mode: DebitMode,
}

impl Bank {
    pub fn new(balance: i64, mode: DebitMode) -> Self {
        Self { balance, mode }
    }

    /// Build a bank from a `{"accounts": [{"id": .., "balance": ..}]}` document.
    pub fn from_state(state: &Value, mode: DebitMode) -> Self {
        let balance = state["accounts"][0]["balance"].as_i64().unwrap_or(0);
        Self::new(balance, mode)
    }

    fn amount(event: &Event) -> Result<i64, SystemFault> {
        event
            .field_i64("amount")
            .ok_or_else(|| SystemFault::new(format!("{} without an integer amount", event.kind)))
    }
}

impl System for Bank {
    fn on_event(&mut self, event: &Event, ctx: &mut SimContext<'_>) -> Result<(), SystemFault> {
        match event.kind.as_str() {
            "withdraw" => {
                let amount = Self::amount(event)?;
                ctx.emit(NewEvent::new("check").with("amount", amount));
            }
            "check" => {
                let amount = Self::amount(event)?;
                if self.balance >= amount {
                    // A zero delay lets this debit land before the other check.
                    let delay = Duration::from_millis(ctx.rng().random_range(0..10));
                    ctx.emit(NewEvent::new("debit").with("amount", amount).after(delay));
                } else {
                    ctx.emit(NewEvent::new("rejected").with("amount", amount));
                }
            }
            "debit" => {
                let amount = Self::amount(event)?;
                if self.mode == DebitMode::Rechecking && self.balance < amount {
                    ctx.emit(NewEvent::new("rejected").with("amount", amount));
                    return Ok(());
                }
                self.balance = self
                    .balance
                    .checked_sub(amount)
                    .ok_or_else(|| SystemFault::new("balance overflow"))?;
                ctx.emit(NewEvent::new("balance_changed").with("balance", self.balance));
            }
            _ => {}
        }
        Ok(())
    }

    fn state_fingerprint(&self) -> Option<String> {
        Some(format!("balance={}", self.balance))
    }
}

pub fn opening_state() -> Value {
    json!({"accounts": [{"id": "acc1", "balance": OPENING_BALANCE}]})
}

pub fn withdrawal() -> NewEvent {
    NewEvent::new("withdraw").with("account", "acc1").with("amount", WITHDRAWAL)
}

pub fn non_negative_balance() -> impl Invariant {
    always("non_negative_balance", |event| {
        event.kind != "balance_changed"
            || event.field_i64("balance").is_none_or(|balance| balance >= 0)
    })
}
