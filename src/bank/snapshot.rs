use std::collections::BTreeMap;
use std::fmt;

use crate::Amount;
use crate::model::{CURRENCIES, ClientId, Currency, CurrencyPair};

/// Balances of one client, read under the account's lock.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientBalances {
    pub client: ClientId,
    pub balances: BTreeMap<Currency, Amount>,
}

impl ClientBalances {
    pub fn get(&self, currency: &str) -> Amount {
        self.balances.get(currency).copied().unwrap_or_default()
    }
}

/// Point-in-time report of every account and every rate.
///
/// Each client's balances are consistent with each other; different clients
/// may be read at slightly different moments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Sorted by client id.
    pub clients: Vec<ClientBalances>,
    /// Sorted by pair.
    pub rates: Vec<(CurrencyPair, f64)>,
}

impl Snapshot {
    pub fn client(&self, client: ClientId) -> Option<&ClientBalances> {
        self.clients
            .binary_search_by_key(&client, |c| c.client)
            .ok()
            .map(|idx| &self.clients[idx])
    }

    /// Sum of every client's balance in `currency`.
    pub fn total(&self, currency: &str) -> Amount {
        self.clients
            .iter()
            .fold(Amount::ZERO, |sum, c| sum + c.get(currency))
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bank of the Yap Islands balances:")?;
        for client in &self.clients {
            write!(f, "Islander {}:", client.client)?;
            for (idx, currency) in CURRENCIES.iter().enumerate() {
                let sep = if idx == 0 { " " } else { ", " };
                write!(f, "{sep}{currency}: {}", client.get(currency))?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Current exchange rates:")?;
        for (pair, rate) in &self.rates {
            writeln!(f, "{pair}: {rate:.4}")?;
        }
        Ok(())
    }
}
