//! Spread evaluation and alert deduplication.
//!
//! A reading qualifies when the t0/t1 variation crosses the threshold with
//! t0 priced above t1 (the "desarbitraje" direction). [`AlertState`] remembers
//! the last key emitted per symbol so an unchanged condition never re-alerts.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::quote::QuoteSample;

/// Identity of an emitted alert, used only for comparison.
///
/// Two readings are "the same alert" when both prices and the rounded
/// variation match; any change re-arms the symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertKey {
    /// Current-session price at emission.
    pub price_t0: Decimal,
    /// Next-session price at emission.
    pub price_t1: Decimal,
    /// Variation rounded to two decimals.
    pub variation_pct: Decimal,
}

/// Percentage spread between tenors, positive when t0 > t1.
///
/// Returns `None` when `price_t1` is zero (no meaningful spread).
pub fn variation_pct(price_t0: Decimal, price_t1: Decimal) -> Option<Decimal> {
    if price_t1.is_zero() {
        return None;
    }
    Some((price_t0 - price_t1) / price_t1 * Decimal::ONE_HUNDRED)
}

/// Apply the alert policy to a sample.
///
/// Qualifies iff `abs(variation) >= threshold` and `t0 > t1`. Only the
/// current-above-next direction is of interest.
pub fn evaluate(sample: &QuoteSample, threshold_pct: Decimal) -> Option<AlertKey> {
    let variation = variation_pct(sample.price_t0, sample.price_t1)?;

    if variation.abs() < threshold_pct || sample.price_t0 <= sample.price_t1 {
        return None;
    }

    Some(AlertKey {
        price_t0: sample.price_t0,
        price_t1: sample.price_t1,
        variation_pct: variation.round_dp(2),
    })
}

/// Render the operator-facing alert text.
pub fn format_message(symbol: &str, key: &AlertKey) -> String {
    format!(
        "🚨 {symbol}: desarbitraje {:.2}% (t0 {} > t1 {})",
        key.variation_pct, key.price_t0, key.price_t1
    )
}

/// Per-symbol memory of the last alert emitted.
///
/// Owned by the polling engine; single writer, advanced only after a
/// successful notification send. Lives for the process lifetime.
#[derive(Debug, Default)]
pub struct AlertState {
    last_sent: HashMap<String, AlertKey>,
}

impl AlertState {
    /// Empty state; nothing has alerted yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` matches the last alert emitted for `symbol`.
    pub fn is_duplicate(&self, symbol: &str, key: &AlertKey) -> bool {
        self.last_sent.get(symbol) == Some(key)
    }

    /// Record that `key` was just emitted for `symbol`.
    pub fn record(&mut self, symbol: impl Into<String>, key: AlertKey) {
        self.last_sent.insert(symbol.into(), key);
    }

    /// Last emitted key for `symbol`, if any.
    pub fn last_for(&self, symbol: &str) -> Option<&AlertKey> {
        self.last_sent.get(symbol)
    }
}
