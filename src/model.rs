//! Core domain types shared by the bank, its cashiers and the drivers.

use std::fmt;

use crate::Amount;

/// Client identifier. Also the total order used when locking several accounts.
pub type ClientId = u32;

/// Currency code, e.g. `RaiStone`.
pub type Currency = String;

/// Currency pair key, `BASE/QUOTE`.
pub type CurrencyPair = String;

pub const RAI_STONE: &str = "RaiStone";
pub const USD: &str = "USD";
pub const EUR: &str = "EUR";

/// The currencies every islander holds.
pub const CURRENCIES: [&str; 3] = [RAI_STONE, USD, EUR];

/// A pending operation, with all of its arguments bound at submission time.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Add funds to a client's balance.
    Deposit {
        client: ClientId,
        currency: Currency,
        amount: Amount,
    },
    /// Remove funds from a client's balance, if it covers the amount.
    Withdraw {
        client: ClientId,
        currency: Currency,
        amount: Amount,
    },
    /// Move funds between two clients, if the sender's balance covers the amount.
    Transfer {
        from: ClientId,
        to: ClientId,
        currency: Currency,
        amount: Amount,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Deposit { .. } => "deposit",
            Operation::Withdraw { .. } => "withdraw",
            Operation::Transfer { .. } => "transfer",
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            Operation::Deposit { amount, .. }
            | Operation::Withdraw { amount, .. }
            | Operation::Transfer { amount, .. } => *amount,
        }
    }

    pub fn currency(&self) -> &str {
        match self {
            Operation::Deposit { currency, .. }
            | Operation::Withdraw { currency, .. }
            | Operation::Transfer { currency, .. } => currency,
        }
    }
}

/// Something that happened in the bank. Its `Display` is the notification
/// text delivered to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Deposited {
        client: ClientId,
        currency: Currency,
        amount: Amount,
    },
    Withdrew {
        client: ClientId,
        currency: Currency,
        amount: Amount,
    },
    WithdrawDeclined {
        client: ClientId,
        currency: Currency,
        amount: Amount,
    },
    Transferred {
        from: ClientId,
        to: ClientId,
        currency: Currency,
        amount: Amount,
    },
    TransferDeclined {
        from: ClientId,
        to: ClientId,
        currency: Currency,
        amount: Amount,
    },
    /// An operation referenced a client that is not registered.
    UnknownClient {
        client: ClientId,
        operation: &'static str,
    },
    /// An operation failed unexpectedly and was discarded.
    OperationFailed {
        operation: &'static str,
        reason: String,
    },
    RateChanged {
        pair: CurrencyPair,
        rate: f64,
    },
    CrossRateUpdated {
        pair: CurrencyPair,
        rate: f64,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Deposited {
                client,
                currency,
                amount,
            } => write!(
                f,
                "client {client} deposited {} {currency}",
                amount.rounded()
            ),
            Event::Withdrew {
                client,
                currency,
                amount,
            } => write!(f, "client {client} withdrew {} {currency}", amount.rounded()),
            Event::WithdrawDeclined {
                client,
                currency,
                amount,
            } => write!(
                f,
                "client {client} could not withdraw {} {currency}: insufficient funds",
                amount.rounded()
            ),
            Event::Transferred {
                from,
                to,
                currency,
                amount,
            } => write!(
                f,
                "client {from} transferred {} {currency} to client {to}",
                amount.rounded()
            ),
            Event::TransferDeclined {
                from,
                to,
                currency,
                amount,
            } => write!(
                f,
                "client {from} could not transfer {} {currency} to client {to}: insufficient funds",
                amount.rounded()
            ),
            Event::UnknownClient { client, operation } => {
                write!(f, "{operation} discarded: client {client} not found")
            }
            Event::OperationFailed { operation, reason } => {
                write!(f, "{operation} discarded: {reason}")
            }
            Event::RateChanged { pair, rate } => write!(f, "rate {pair} changed to {rate}"),
            Event::CrossRateUpdated { pair, rate } => {
                write!(f, "cross rate {pair} updated to {rate}")
            }
        }
    }
}
