//! Deterministic driver activity for the island bank.
//!
//! Each round is one tick of the driver: a transfer between two islanders,
//! a pair of rate changes every 10th round and a RaiStone top-up for every
//! islander every 15th round.

use crate::bank::CrossRate;
use crate::model::{CURRENCIES, ClientId, CurrencyPair, Operation, RAI_STONE};
use crate::{Amount, Bank, BankError};

/// Rounds between two rate changes.
pub const RATE_EVERY: u64 = 10;
/// Rounds between two top-ups.
pub const TOP_UP_EVERY: u64 = 15;
pub const TOP_UP_AMOUNT: f64 = 1_000.0;

/// Something the driver asks the bank to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Submit(Operation),
    UpdateRate { pair: CurrencyPair, rate: f64 },
}

impl Action {
    /// Hand the action to the bank. Rejected rate updates are reported, not fatal.
    pub fn apply(self, bank: &Bank) -> Result<(), BankError> {
        match self {
            Action::Submit(op) => bank.submit(op),
            Action::UpdateRate { pair, rate } => bank.update_currency_rate(&pair, rate),
        }
    }
}

/// Endless, reproducible sequence of rounds over a fixed set of clients.
#[derive(Debug, Clone)]
pub struct Schedule {
    clients: Vec<ClientId>,
    cross: CrossRate,
    round: u64,
}

impl Schedule {
    pub fn new(clients: Vec<ClientId>, cross: CrossRate) -> Self {
        Self {
            clients,
            cross,
            round: 0,
        }
    }

    fn transfer(&self, round: u64) -> Operation {
        let n = self.clients.len() as u64;
        let from = self.clients[(round % n) as usize];
        let to = self.clients[((round * 7 + 3) % n) as usize];
        Operation::Transfer {
            from,
            to,
            currency: CURRENCIES[(round % 3) as usize].to_string(),
            amount: Amount::new(50.0 + (round * 37 % 50) as f64),
        }
    }

    fn rate_changes(&self, round: u64) -> [Action; 2] {
        let step = round / RATE_EVERY;
        [
            Action::UpdateRate {
                pair: self.cross.numerator.clone(),
                rate: 0.15 + (step % 10) as f64 * 0.01,
            },
            Action::UpdateRate {
                pair: self.cross.denominator.clone(),
                rate: 0.30 + (step * 3 % 10) as f64 * 0.01,
            },
        ]
    }
}

impl Iterator for Schedule {
    type Item = Vec<Action>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.clients.is_empty() {
            return None;
        }

        let round = self.round;
        self.round += 1;

        let mut actions = vec![Action::Submit(self.transfer(round))];
        if (round + 1) % RATE_EVERY == 0 {
            actions.extend(self.rate_changes(round));
        }
        if (round + 1) % TOP_UP_EVERY == 0 {
            actions.extend(self.clients.iter().map(|&client| {
                Action::Submit(Operation::Deposit {
                    client,
                    currency: RAI_STONE.to_string(),
                    amount: Amount::new(TOP_UP_AMOUNT),
                })
            }));
        }
        Some(actions)
    }
}
