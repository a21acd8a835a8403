use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::Amount;
use crate::bank::OperationError;
use crate::model::{ClientId, Currency};

/// Per-currency balances of one client.
///
/// Only reachable through [`Account::lock`], so every method here runs with
/// the account's lock held.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Balances {
    client: ClientId,
    by_currency: BTreeMap<Currency, Amount>,
}

impl Balances {
    pub fn get(&self, currency: &str) -> Amount {
        self.by_currency.get(currency).copied().unwrap_or_default()
    }

    pub fn deposit(&mut self, currency: &str, amount: Amount) {
        *self.entry(currency) += amount;
    }

    /// Check and subtract in one step. On failure the balance is unchanged.
    pub fn withdraw(&mut self, currency: &str, amount: Amount) -> Result<(), OperationError> {
        let available = self.get(currency);
        if available < amount {
            return Err(OperationError::InsufficientFunds {
                client: self.client,
                currency: currency.to_string(),
                available,
                requested: amount,
            });
        }
        *self.entry(currency) -= amount;
        Ok(())
    }

    /// Receiving half of a transfer.
    pub fn credit(&mut self, currency: &str, amount: Amount) {
        *self.entry(currency) += amount;
    }

    pub fn to_map(&self) -> BTreeMap<Currency, Amount> {
        self.by_currency.clone()
    }

    fn entry(&mut self, currency: &str) -> &mut Amount {
        self.by_currency.entry(currency.to_string()).or_default()
    }
}

/// A client account: an immutable id and balances guarded by the account's own lock.
#[derive(Debug)]
pub struct Account {
    id: ClientId,
    balances: Mutex<Balances>,
}

impl Account {
    pub fn new(id: ClientId) -> Self {
        Self::with_balances(id, std::iter::empty::<(Currency, Amount)>())
    }

    pub fn with_balances<C: Into<Currency>>(
        id: ClientId,
        initial: impl IntoIterator<Item = (C, Amount)>,
    ) -> Self {
        let by_currency = initial.into_iter().map(|(c, a)| (c.into(), a)).collect();
        Self {
            id,
            balances: Mutex::new(Balances {
                client: id,
                by_currency,
            }),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Take the account's lock.
    ///
    /// A panic in another holder poisons the mutex; the balances themselves
    /// are never left half-updated by any `Balances` method, so the guard is
    /// recovered instead of propagating the poison.
    pub fn lock(&self) -> MutexGuard<'_, Balances> {
        self.balances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Balance for `currency`, zero if the account never held it.
    pub fn balance(&self, currency: &str) -> Amount {
        self.lock().get(currency)
    }

    pub fn deposit(&self, currency: &str, amount: Amount) {
        self.lock().deposit(currency, amount);
    }

    pub fn withdraw(&self, currency: &str, amount: Amount) -> Result<(), OperationError> {
        self.lock().withdraw(currency, amount)
    }

    pub fn credit(&self, currency: &str, amount: Amount) {
        self.lock().credit(currency, amount);
    }

    /// Consistent copy of every currency balance.
    pub fn snapshot(&self) -> BTreeMap<Currency, Amount> {
        self.lock().to_map()
    }
}

/// Move `amount` of `currency` from `sender` to `receiver`.
///
/// Both locks are taken in ascending client id order, whichever side is
/// sending, and released in reverse. The receiver is credited only after the
/// sender's withdraw succeeded. A transfer to oneself locks the account once
/// and moves nothing.
pub fn transfer(
    sender: &Account,
    receiver: &Account,
    currency: &str,
    amount: Amount,
) -> Result<(), OperationError> {
    if sender.id() == receiver.id() {
        let _balances = sender.lock();
        return Ok(());
    }

    let sender_first = sender.id() < receiver.id();
    let (first, second) = if sender_first {
        (sender, receiver)
    } else {
        (receiver, sender)
    };
    let mut first = first.lock();
    let mut second = second.lock();
    let (from, to) = if sender_first {
        (&mut *first, &mut *second)
    } else {
        (&mut *second, &mut *first)
    };

    from.withdraw(currency, amount)?;
    to.credit(currency, amount);
    Ok(())
}
