pub mod amount;
pub mod bank;
pub mod config;
pub mod csv;
pub mod model;
pub mod notify;
pub mod simulation;

pub use amount::Amount;
pub use bank::{Bank, BankError, ShutdownReport, Snapshot};
pub use config::BankConfig;
pub use model::{ClientId, Currency, CurrencyPair, Event, Operation};
pub use notify::{LogObserver, Observer};
