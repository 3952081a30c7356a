//! Payment currency normalization
//!
//! Stages are priced in a single reference currency. Payments in any other
//! accepted currency (e.g. the chain's native token) are converted at a
//! fixed configured rate before they reach the allocator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{PresaleError, PresaleResult};

/// Fixed conversion rate of one payment currency into the reference currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub symbol: String,
    /// Reference-currency units per one unit of `symbol`
    pub rate: f64,
}

/// Converts payment amounts into reference-currency units
#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    reference: String,
    rates: HashMap<String, f64>,
}

impl CurrencyConverter {
    /// Converter that only accepts the reference currency itself
    pub fn new(reference: &str) -> Self {
        let reference = reference.to_uppercase();
        let mut rates = HashMap::new();
        rates.insert(reference.clone(), 1.0);
        Self { reference, rates }
    }

    /// Build a converter from configured rates
    pub fn with_rates(reference: &str, rates: &[CurrencyRate]) -> PresaleResult<Self> {
        let mut converter = Self::new(reference);
        for rate in rates {
            converter.add_rate(&rate.symbol, rate.rate)?;
        }
        Ok(converter)
    }

    /// Register or replace the rate for `symbol`
    pub fn add_rate(&mut self, symbol: &str, rate: f64) -> PresaleResult<()> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(PresaleError::Config("currency symbol cannot be empty".to_string()));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PresaleError::Config(format!(
                "rate for {} must be positive, got {}",
                symbol, rate
            )));
        }
        if symbol == self.reference && rate != 1.0 {
            return Err(PresaleError::Config(format!(
                "reference currency {} must have rate 1",
                symbol
            )));
        }
        self.rates.insert(symbol, rate);
        Ok(())
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Accepted currency symbols, sorted
    pub fn currencies(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.rates.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Convert `amount` of `symbol` into reference-currency units
    pub fn to_reference(&self, amount: f64, symbol: &str) -> PresaleResult<f64> {
        let symbol = symbol.trim().to_uppercase();
        let rate = self
            .rates
            .get(&symbol)
            .ok_or(PresaleError::UnsupportedCurrency(symbol.clone()))?;
        Ok(amount * rate)
    }
}
