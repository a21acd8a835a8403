use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::bank::RateError;
use crate::model::{CurrencyPair, EUR, RAI_STONE, USD};

/// A pair whose rate is always `numerator / denominator`.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossRate {
    pub derived: CurrencyPair,
    pub numerator: CurrencyPair,
    pub denominator: CurrencyPair,
}

impl CrossRate {
    fn is_base(&self, pair: &str) -> bool {
        pair == self.numerator || pair == self.denominator
    }
}

impl Default for CrossRate {
    /// `EUR/USD` from the two RaiStone quotes.
    fn default() -> Self {
        Self {
            derived: format!("{EUR}/{USD}"),
            numerator: format!("{RAI_STONE}/{USD}"),
            denominator: format!("{RAI_STONE}/{EUR}"),
        }
    }
}

/// One rate written by an update, in the order it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct RateChange {
    pub pair: CurrencyPair,
    pub rate: f64,
    pub derived: bool,
}

/// Exchange rates keyed by ordered pair.
#[derive(Debug)]
pub struct RateTable {
    rates: RwLock<BTreeMap<CurrencyPair, f64>>,
    cross: CrossRate,
}

impl RateTable {
    pub fn new(
        cross: CrossRate,
        initial: impl IntoIterator<Item = (CurrencyPair, f64)>,
    ) -> Result<Self, RateError> {
        let mut rates = BTreeMap::new();
        for (pair, rate) in initial {
            Self::validate(&cross, &pair, rate)?;
            rates.insert(pair, rate);
        }
        if let Some(rate) = Self::cross_rate(&cross, &rates) {
            rates.insert(cross.derived.clone(), rate);
        }

        Ok(Self {
            rates: RwLock::new(rates),
            cross,
        })
    }

    pub fn get(&self, pair: &str) -> Option<f64> {
        self.read().get(pair).copied()
    }

    /// Set `pair` to `rate`.
    ///
    /// Updating one of the cross rate's bases recomputes the derived rate
    /// under the same write lock, so no reader sees a stale derived rate.
    /// Returns the rates written, base first.
    pub fn update(&self, pair: &str, rate: f64) -> Result<Vec<RateChange>, RateError> {
        Self::validate(&self.cross, pair, rate)?;

        let mut rates = self.rates.write().unwrap_or_else(PoisonError::into_inner);
        rates.insert(pair.to_string(), rate);

        let mut changes = vec![RateChange {
            pair: pair.to_string(),
            rate,
            derived: false,
        }];

        if self.cross.is_base(pair) {
            if let Some(derived) = Self::cross_rate(&self.cross, &rates) {
                rates.insert(self.cross.derived.clone(), derived);
                changes.push(RateChange {
                    pair: self.cross.derived.clone(),
                    rate: derived,
                    derived: true,
                });
            }
        }

        Ok(changes)
    }

    /// All rates, sorted by pair.
    pub fn snapshot(&self) -> Vec<(CurrencyPair, f64)> {
        self.read().iter().map(|(p, r)| (p.clone(), *r)).collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<CurrencyPair, f64>> {
        self.rates.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate(cross: &CrossRate, pair: &str, rate: f64) -> Result<(), RateError> {
        if pair == cross.derived {
            return Err(RateError::DerivedPair(pair.to_string()));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateError::InvalidRate {
                pair: pair.to_string(),
                rate,
            });
        }
        Ok(())
    }

    fn cross_rate(cross: &CrossRate, rates: &BTreeMap<CurrencyPair, f64>) -> Option<f64> {
        let numerator = rates.get(&cross.numerator)?;
        let denominator = rates.get(&cross.denominator)?;
        Some(numerator / denominator)
    }
}
