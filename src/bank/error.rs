//! Error types for the bank and its cashiers.

use thiserror::Error;

use crate::Amount;
use crate::model::{ClientId, Currency, CurrencyPair};

/// Error returned by the public [`Bank`](super::Bank) API.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("a bank needs at least one cashier")]
    InvalidCashierCount,

    #[error("a bank must be started from inside a tokio runtime")]
    NoRuntime,

    #[error("client {0} is already registered")]
    DuplicateClient(ClientId),

    #[error("invalid amount {0}: must be finite and non-negative")]
    InvalidAmount(f64),

    #[error("bank is shutting down, operation rejected")]
    ShuttingDown,

    #[error("rate update failed: {0}")]
    Rate(#[from] RateError),
}

/// Error during a rate update.
#[derive(Debug, Error, PartialEq)]
pub enum RateError {
    #[error("invalid rate {rate} for {pair}: must be finite and positive")]
    InvalidRate { pair: CurrencyPair, rate: f64 },

    #[error("{0} is derived from its base rates and cannot be set directly")]
    DerivedPair(CurrencyPair),
}

/// Business outcome of a dequeued operation that did not apply.
///
/// These are normal outcomes: they are logged, notified and the operation is
/// discarded.
#[derive(Debug, Error, PartialEq)]
pub enum OperationError {
    #[error("insufficient funds for client {client}: available {available} {currency}, requested {requested}")]
    InsufficientFunds {
        client: ClientId,
        currency: Currency,
        available: Amount,
        requested: Amount,
    },

    #[error("client {0} not found")]
    UnknownClient(ClientId),
}
