//! The bank: account registry, exchange rates, notification bus and the
//! cashier pool serving the transaction queue.
//!
//! Callers submit operations and return immediately; a cashier later
//! dequeues each operation, runs it under the accounts' locks and publishes
//! the outcome to every observer.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::Amount;
use crate::config::BankConfig;
use crate::model::{ClientId, Currency, CurrencyPair, Event, Operation};
use crate::notify::{NotificationBus, Observer};

mod account;
pub use account::{Account, Balances, transfer};

mod cashier;
pub use cashier::{Cashier, Executor};

mod error;
pub use error::{BankError, OperationError, RateError};

mod queue;
pub use queue::TransactionQueue;

mod rates;
pub use rates::{CrossRate, RateChange, RateTable};

mod snapshot;
pub use snapshot::{ClientBalances, Snapshot};

/// The multi-cashier bank.
///
/// Must be created from inside a tokio runtime, which runs the cashiers.
#[derive(Debug)]
pub struct Bank {
    ledger: Arc<Ledger>,
    queue: Arc<TransactionQueue>,
    cashiers: Mutex<Vec<Cashier>>,
    cashier_count: usize,
    shutdown_timeout: Duration,
    /// Held across a rate update and its notifications.
    rate_updates: Mutex<()>,
}

/// Outcome of [`Bank::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Cashiers that drained the queue and stopped in time.
    pub drained: usize,
    /// Cashiers still running at the deadline, left detached.
    pub abandoned: usize,
}

/// State the cashiers work on.
#[derive(Debug)]
struct Ledger {
    clients: RwLock<BTreeMap<ClientId, Arc<Account>>>,
    rates: RateTable,
    bus: NotificationBus,
}

/// Public API
impl Bank {
    /// Start a bank with `cashiers` workers, the given base rates and the
    /// default `EUR/USD` cross rate.
    pub fn new<P: Into<CurrencyPair>>(
        cashiers: usize,
        rates: impl IntoIterator<Item = (P, f64)>,
    ) -> Result<Self, BankError> {
        Self::with_config(BankConfig {
            cashiers,
            rates: rates.into_iter().map(|(p, r)| (p.into(), r)).collect(),
            ..BankConfig::default()
        })
    }

    pub fn with_config(config: BankConfig) -> Result<Self, BankError> {
        if config.cashiers == 0 {
            return Err(BankError::InvalidCashierCount);
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BankError::NoRuntime);
        }

        let ledger = Arc::new(Ledger {
            clients: RwLock::new(BTreeMap::new()),
            rates: RateTable::new(config.cross_rate, config.rates)?,
            bus: NotificationBus::new(),
        });
        let queue = Arc::new(TransactionQueue::new());
        let cashiers = (0..config.cashiers)
            .map(|id| Cashier::spawn(id, queue.clone(), ledger.clone()))
            .collect();

        info!(cashiers = config.cashiers, "bank open");

        Ok(Self {
            ledger,
            queue,
            cashiers: Mutex::new(cashiers),
            cashier_count: config.cashiers,
            shutdown_timeout: config.shutdown_timeout,
            rate_updates: Mutex::new(()),
        })
    }

    /// Register a client with its opening balances. Client ids are unique.
    pub fn add_client<C: Into<Currency>>(
        &self,
        id: ClientId,
        initial: impl IntoIterator<Item = (C, Amount)>,
    ) -> Result<Arc<Account>, BankError> {
        let mut clients = self
            .ledger
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match clients.entry(id) {
            Entry::Occupied(_) => Err(BankError::DuplicateClient(id)),
            Entry::Vacant(slot) => {
                let account = Arc::new(Account::with_balances(id, initial));
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    pub fn get_client(&self, id: ClientId) -> Option<Arc<Account>> {
        self.ledger.client(id)
    }

    /// Enqueue an operation for the cashiers. Returns before it runs.
    pub fn submit(&self, op: Operation) -> Result<(), BankError> {
        let amount = op.amount();
        if !amount.is_valid_operand() {
            return Err(BankError::InvalidAmount(amount.value()));
        }
        debug!(
            kind = op.kind(),
            currency = op.currency(),
            amount = %amount,
            "operation queued"
        );
        self.queue.enqueue(op).inspect_err(|e| {
            warn!(reason = %e, "operation rejected");
        })
    }

    pub fn submit_deposit(
        &self,
        client: ClientId,
        currency: impl Into<Currency>,
        amount: impl Into<Amount>,
    ) -> Result<(), BankError> {
        self.submit(Operation::Deposit {
            client,
            currency: currency.into(),
            amount: amount.into(),
        })
    }

    pub fn submit_withdraw(
        &self,
        client: ClientId,
        currency: impl Into<Currency>,
        amount: impl Into<Amount>,
    ) -> Result<(), BankError> {
        self.submit(Operation::Withdraw {
            client,
            currency: currency.into(),
            amount: amount.into(),
        })
    }

    pub fn submit_transfer(
        &self,
        from: ClientId,
        to: ClientId,
        currency: impl Into<Currency>,
        amount: impl Into<Amount>,
    ) -> Result<(), BankError> {
        self.submit(Operation::Transfer {
            from,
            to,
            currency: currency.into(),
            amount: amount.into(),
        })
    }

    /// Set an exchange rate, then notify the change and, when a base of the
    /// cross rate moved, the recomputed cross rate.
    ///
    /// Concurrent updates are serialized, so observers receive rate
    /// notifications in the order the rates were written.
    pub fn update_currency_rate(&self, pair: &str, rate: f64) -> Result<(), BankError> {
        let _serial = self
            .rate_updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let changes = self.ledger.rates.update(pair, rate).inspect_err(|e| {
            warn!(pair, rate, reason = %e, "rate update rejected");
        })?;

        for change in changes {
            info!(pair = %change.pair, rate = change.rate, derived = change.derived, "rate updated");
            let event = if change.derived {
                Event::CrossRateUpdated {
                    pair: change.pair,
                    rate: change.rate,
                }
            } else {
                Event::RateChanged {
                    pair: change.pair,
                    rate: change.rate,
                }
            };
            self.ledger.publish(&event);
        }
        Ok(())
    }

    pub fn rate(&self, pair: &str) -> Option<f64> {
        self.ledger.rates.get(pair)
    }

    /// Report every account, each read under its own lock, and every rate.
    pub fn display_balances(&self) -> Snapshot {
        let clients = self
            .ledger
            .accounts()
            .into_iter()
            .map(|account| ClientBalances {
                client: account.id(),
                balances: account.snapshot(),
            })
            .collect();

        Snapshot {
            clients,
            rates: self.ledger.rates.snapshot(),
        }
    }

    pub fn add_observer(&self, observer: impl Observer + 'static) {
        self.ledger.bus.subscribe(Arc::new(observer));
    }

    /// Operations submitted but not yet picked up by a cashier.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn cashier_count(&self) -> usize {
        self.cashier_count
    }

    /// Shut down with the configured timeout.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_within(self.shutdown_timeout).await
    }

    /// Stop accepting operations, let the cashiers drain the queue and wait
    /// for them until `timeout` elapses. Cashiers still busy at the deadline
    /// are detached, not aborted.
    pub async fn shutdown_within(&self, timeout: Duration) -> ShutdownReport {
        self.queue.close();
        let cashiers = std::mem::take(
            &mut *self.cashiers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let deadline = Instant::now() + timeout;

        let mut report = ShutdownReport {
            drained: 0,
            abandoned: 0,
        };
        for cashier in cashiers {
            let id = cashier.id();
            match timeout_at(deadline, cashier.into_handle()).await {
                Ok(Ok(())) => report.drained += 1,
                Ok(Err(e)) => {
                    error!(cashier = id, reason = %e, "cashier stopped abnormally");
                    report.abandoned += 1;
                }
                Err(_) => {
                    warn!(cashier = id, "cashier still busy at shutdown deadline, abandoning it");
                    report.abandoned += 1;
                }
            }
        }

        info!(
            drained = report.drained,
            abandoned = report.abandoned,
            pending = self.queue.pending(),
            "bank closed"
        );
        report
    }
}

impl Drop for Bank {
    fn drop(&mut self) {
        // idle cashiers exit once the queue is drained
        self.queue.close();
    }
}

impl Ledger {
    fn client(&self, id: ClientId) -> Option<Arc<Account>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn accounts(&self) -> Vec<Arc<Account>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Small helper to log operation results
    fn log_result(
        kind: &str,
        client: ClientId,
        currency: &str,
        amount: Amount,
        result: &Result<(), OperationError>,
    ) {
        match result {
            Ok(()) => info!(client, currency, amount = %amount, "{kind} applied"),
            Err(e) => info!(client, currency, amount = %amount, reason = %e, "{kind} skipped"),
        }
    }

    fn unknown_client(&self, client: ClientId, operation: &'static str) -> Event {
        let reason = OperationError::UnknownClient(client);
        warn!(client, reason = %reason, "{operation} skipped");
        Event::UnknownClient { client, operation }
    }
}

impl Executor for Ledger {
    fn execute(&self, op: Operation) -> Event {
        match op {
            Operation::Deposit {
                client,
                currency,
                amount,
            } => {
                let Some(account) = self.client(client) else {
                    return self.unknown_client(client, "deposit");
                };
                account.deposit(&currency, amount);
                Self::log_result("deposit", client, &currency, amount, &Ok(()));
                Event::Deposited {
                    client,
                    currency,
                    amount,
                }
            }
            Operation::Withdraw {
                client,
                currency,
                amount,
            } => {
                let Some(account) = self.client(client) else {
                    return self.unknown_client(client, "withdraw");
                };
                let result = account.withdraw(&currency, amount);
                Self::log_result("withdraw", client, &currency, amount, &result);
                match result {
                    Ok(()) => Event::Withdrew {
                        client,
                        currency,
                        amount,
                    },
                    Err(_) => Event::WithdrawDeclined {
                        client,
                        currency,
                        amount,
                    },
                }
            }
            Operation::Transfer {
                from,
                to,
                currency,
                amount,
            } => {
                let Some(sender) = self.client(from) else {
                    return self.unknown_client(from, "transfer");
                };
                let Some(receiver) = self.client(to) else {
                    return self.unknown_client(to, "transfer");
                };
                let result = transfer(&sender, &receiver, &currency, amount);
                Self::log_result("transfer", from, &currency, amount, &result);
                match result {
                    Ok(()) => Event::Transferred {
                        from,
                        to,
                        currency,
                        amount,
                    },
                    Err(_) => Event::TransferDeclined {
                        from,
                        to,
                        currency,
                        amount,
                    },
                }
            }
        }
    }

    fn publish(&self, event: &Event) {
        self.bus.publish(&event.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EUR, RAI_STONE, USD};

    fn recorded(bank: &Bank) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bank.add_observer(move |message: &str| sink.lock().unwrap().push(message.to_string()));
        seen
    }

    fn island_bank(cashiers: usize) -> Bank {
        Bank::new(cashiers, [("RaiStone/USD", 0.15), ("RaiStone/EUR", 0.30)]).unwrap()
    }

    #[test]
    fn new_outside_runtime_fails() {
        let result = Bank::new(1, [("RaiStone/USD", 0.15)]);
        assert!(matches!(result, Err(BankError::NoRuntime)));
    }

    #[tokio::test]
    async fn zero_cashiers_rejected() {
        let result = Bank::new(0, [("RaiStone/USD", 0.15)]);
        assert!(matches!(result, Err(BankError::InvalidCashierCount)));
    }

    #[tokio::test]
    async fn invalid_initial_rate_rejected() {
        let result = Bank::new(1, [("RaiStone/USD", -1.0)]);
        assert!(matches!(
            result,
            Err(BankError::Rate(RateError::InvalidRate { .. }))
        ));
    }

    #[tokio::test]
    async fn duplicate_client_rejected() {
        let bank = island_bank(1);
        bank.add_client(1, [(USD, Amount::new(1.0))]).unwrap();
        let result = bank.add_client(1, [(USD, Amount::new(2.0))]);
        assert!(matches!(result, Err(BankError::DuplicateClient(1))));
        assert_eq!(bank.get_client(1).unwrap().balance(USD), Amount::new(1.0));
    }

    #[tokio::test]
    async fn invalid_amounts_are_rejected_at_submission() {
        let bank = island_bank(1);
        bank.add_client(1, [(USD, Amount::new(1.0))]).unwrap();

        assert!(matches!(
            bank.submit_deposit(1, USD, -5.0),
            Err(BankError::InvalidAmount(_))
        ));
        assert!(matches!(
            bank.submit_transfer(1, 2, USD, f64::NAN),
            Err(BankError::InvalidAmount(_))
        ));
        assert_eq!(bank.pending(), 0);
    }

    #[tokio::test]
    async fn deposit_and_withdraw_are_notified() {
        let bank = island_bank(1);
        let seen = recorded(&bank);
        bank.add_client(1, [(USD, Amount::new(10.0))]).unwrap();

        bank.submit_deposit(1, USD, 5.25).unwrap();
        bank.submit_withdraw(1, USD, 12.0).unwrap();
        bank.submit_withdraw(1, USD, 12.0).unwrap();
        bank.shutdown().await;

        assert_eq!(bank.get_client(1).unwrap().balance(USD), Amount::new(3.25));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "client 1 deposited 5 USD",
                "client 1 withdrew 12 USD",
                "client 1 could not withdraw 12 USD: insufficient funds",
            ]
        );
    }

    #[tokio::test]
    async fn unknown_client_is_notified_and_discarded() {
        let bank = island_bank(1);
        let seen = recorded(&bank);
        bank.add_client(1, [(EUR, Amount::new(10.0))]).unwrap();

        bank.submit_deposit(9, EUR, 1.0).unwrap();
        bank.submit_transfer(1, 9, EUR, 5.0).unwrap();
        bank.submit_deposit(1, EUR, 1.0).unwrap();
        let report = bank.shutdown().await;

        assert_eq!(report.drained, 1);
        assert_eq!(bank.get_client(1).unwrap().balance(EUR), Amount::new(11.0));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "deposit discarded: client 9 not found",
                "transfer discarded: client 9 not found",
                "client 1 deposited 1 EUR",
            ]
        );
    }

    #[tokio::test]
    async fn transfer_to_self_is_a_noop() {
        let bank = island_bank(1);
        let seen = recorded(&bank);
        bank.add_client(1, [(RAI_STONE, Amount::new(10.0))]).unwrap();

        bank.submit_transfer(1, 1, RAI_STONE, 500.0).unwrap();
        bank.shutdown().await;

        assert_eq!(
            bank.get_client(1).unwrap().balance(RAI_STONE),
            Amount::new(10.0)
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["client 1 transferred 500 RaiStone to client 1"]
        );
    }

    #[tokio::test]
    async fn rate_update_notifies_base_then_cross() {
        let bank = island_bank(1);
        let seen = recorded(&bank);

        bank.update_currency_rate("RaiStone/USD", 0.24).unwrap();
        bank.update_currency_rate("USD/EUR", 0.9).unwrap();

        assert_eq!(bank.rate("EUR/USD"), Some(0.24 / 0.30));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "rate RaiStone/USD changed to 0.24".to_string(),
                format!("cross rate EUR/USD updated to {}", 0.24 / 0.30),
                "rate USD/EUR changed to 0.9".to_string(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_rate_updates_notify_in_write_order() {
        let bank = island_bank(1);
        let seen = recorded(&bank);

        std::thread::scope(|scope| {
            for (pair, base) in [("RaiStone/USD", 0.1), ("RaiStone/EUR", 0.2)] {
                let bank = &bank;
                scope.spawn(move || {
                    for i in 1..=500 {
                        bank.update_currency_rate(pair, base + f64::from(i) / 1_000.0)
                            .unwrap();
                    }
                });
            }
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2_000);
        // every base notification is directly followed by its cross rate
        for pair in seen.chunks(2) {
            assert!(pair[0].starts_with("rate RaiStone/"));
            assert!(pair[1].starts_with("cross rate EUR/USD"));
        }
        let cross = bank.rate("EUR/USD").unwrap();
        assert_eq!(
            seen.last().unwrap(),
            &format!("cross rate EUR/USD updated to {cross}")
        );
    }

    #[tokio::test]
    async fn direct_cross_rate_update_rejected() {
        let bank = island_bank(1);
        let seen = recorded(&bank);

        let result = bank.update_currency_rate("EUR/USD", 2.0);
        assert!(matches!(
            result,
            Err(BankError::Rate(RateError::DerivedPair(_)))
        ));
        assert_eq!(bank.rate("EUR/USD"), Some(0.5));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn display_balances_reports_clients_and_rates() {
        let bank = island_bank(2);
        bank.add_client(2, [(USD, Amount::new(5.0))]).unwrap();
        bank.add_client(1, [(RAI_STONE, Amount::new(100.0))]).unwrap();

        let snapshot = bank.display_balances();
        let ids: Vec<_> = snapshot.clients.iter().map(|c| c.client).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(snapshot.client(1).unwrap().get(RAI_STONE), Amount::new(100.0));
        assert_eq!(
            snapshot.rates,
            vec![
                ("EUR/USD".to_string(), 0.5),
                ("RaiStone/EUR".to_string(), 0.30),
                ("RaiStone/USD".to_string(), 0.15),
            ]
        );
    }

    #[tokio::test]
    async fn submissions_after_shutdown_are_rejected() {
        let bank = island_bank(2);
        assert_eq!(bank.cashier_count(), 2);
        bank.add_client(1, [(USD, Amount::new(1.0))]).unwrap();
        let report = bank.shutdown().await;

        assert_eq!(
            report,
            ShutdownReport {
                drained: 2,
                abandoned: 0
            }
        );
        assert!(matches!(
            bank.submit_deposit(1, USD, 1.0),
            Err(BankError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn second_shutdown_has_nothing_to_join() {
        let bank = island_bank(2);
        bank.shutdown().await;
        assert_eq!(
            bank.shutdown().await,
            ShutdownReport {
                drained: 0,
                abandoned: 0
            }
        );
    }
}
