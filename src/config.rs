//! Bank configuration.

use std::time::Duration;

use crate::bank::CrossRate;
use crate::model::CurrencyPair;

/// Settings a [`Bank`](crate::Bank) is built from.
#[derive(Debug, Clone)]
pub struct BankConfig {
    /// Number of cashier tasks consuming the transaction queue.
    pub cashiers: usize,
    /// Initial base rates. The cross rate is derived from them.
    pub rates: Vec<(CurrencyPair, f64)>,
    pub cross_rate: CrossRate,
    /// How long `shutdown` waits for the cashiers before abandoning them.
    pub shutdown_timeout: Duration,
}

impl Default for BankConfig {
    fn default() -> Self {
        let cross_rate = CrossRate::default();
        Self {
            cashiers: 3,
            rates: vec![
                (cross_rate.numerator.clone(), 0.15),
                (cross_rate.denominator.clone(), 0.30),
            ],
            cross_rate,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
