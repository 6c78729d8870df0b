//! The polling-and-alerting control loop.
//!
//! One cycle fans out a bounded number of concurrent quote fetches, joins
//! them all, evaluates each sample against the alert policy, and delivers
//! qualifying non-duplicate alerts. Cycles run strictly sequentially with a
//! cancellable sleep in between.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::alert::{self, AlertState};
use crate::config::Config;
use crate::error::QuoteError;
use crate::notify::Notify;
use crate::quote::{QuoteFetch, QuoteSample};

/// Orchestrates polling cycles over a fixed symbol set.
pub struct PollingEngine {
    quotes: Arc<dyn QuoteFetch>,
    notifier: Arc<dyn Notify>,
    symbols: Vec<String>,
    threshold_pct: Decimal,
    interval: Duration,
    concurrency: usize,
    /// Last emitted key per symbol; single writer (this engine).
    state: AlertState,
    cycle: u64,
}

impl PollingEngine {
    /// Build an engine from configuration and its collaborators.
    pub fn new(config: &Config, quotes: Arc<dyn QuoteFetch>, notifier: Arc<dyn Notify>) -> Self {
        Self {
            quotes,
            notifier,
            symbols: config.ticker_list(),
            threshold_pct: config.variation_threshold_pct,
            interval: config.poll_interval(),
            concurrency: config.fetch_concurrency,
            state: AlertState::new(),
            cycle: 0,
        }
    }

    /// Announce startup on the operator channel. Delivery failure is logged,
    /// never fatal.
    pub async fn announce_start(&self) {
        let message = format!(
            "🕒 desarbitraje monitor started: {} tickers, threshold {}%, interval {}s\nTickers: {}",
            self.symbols.len(),
            self.threshold_pct,
            self.interval.as_secs(),
            self.symbols.join(", "),
        );
        info!(
            tickers = self.symbols.len(),
            threshold = %self.threshold_pct,
            interval_s = self.interval.as_secs(),
            "starting monitor"
        );
        if let Err(e) = self.notifier.send(&message).await {
            warn!(error = %e, "failed to deliver startup announcement");
        }
    }

    /// Run cycles until `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(cycles = self.cycle, "shutdown requested, stopping");
                    break;
                }
                _ = self.run_cycle() => {}
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!(cycles = self.cycle, "shutdown requested, stopping");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One full cycle: fan out, join everything, evaluate, alert.
    pub async fn run_cycle(&mut self) {
        self.cycle += 1;
        debug!(cycle = self.cycle, "cycle started");

        let quotes = Arc::clone(&self.quotes);
        let results: Vec<(String, Result<QuoteSample, QuoteError>)> =
            stream::iter(self.symbols.clone())
                .map(|symbol| {
                    let quotes = Arc::clone(&quotes);
                    async move {
                        let result = quotes.fetch_symbol(&symbol).await;
                        (symbol, result)
                    }
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        // Full join barrier above: evaluation never overlaps fetching.
        for (symbol, result) in results {
            match result {
                Ok(sample) => self.evaluate(sample).await,
                Err(e) => {
                    warn!(cycle = self.cycle, symbol = %symbol, error = %e, "fetch failed, symbol skipped this cycle");
                }
            }
        }

        debug!(cycle = self.cycle, "cycle finished");
    }

    /// Apply policy and dedup to one sample; advance state only after a
    /// successful send so an undelivered alert retries next cycle.
    async fn evaluate(&mut self, sample: QuoteSample) {
        let Some(key) = alert::evaluate(&sample, self.threshold_pct) else {
            debug!(symbol = %sample.symbol, t0 = %sample.price_t0, t1 = %sample.price_t1, "no qualifying spread");
            return;
        };

        if self.state.is_duplicate(&sample.symbol, &key) {
            debug!(symbol = %sample.symbol, variation = %key.variation_pct, "unchanged condition, alert suppressed");
            return;
        }

        let message = alert::format_message(&sample.symbol, &key);
        match self.notifier.send(&message).await {
            Ok(()) => {
                info!(
                    symbol = %sample.symbol,
                    t0 = %key.price_t0,
                    t1 = %key.price_t1,
                    variation = %key.variation_pct,
                    "alert sent"
                );
                self.state.record(sample.symbol, key);
            }
            Err(e) => {
                warn!(symbol = %sample.symbol, error = %e, "alert delivery failed, will retry next cycle");
            }
        }
    }

    /// Symbols watched, in fan-out order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Read access to the dedup state, for diagnostics and tests.
    pub fn state(&self) -> &AlertState {
        &self.state
    }
}
