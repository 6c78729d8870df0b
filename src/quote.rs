//! Per-symbol t0/t1 price retrieval against the IOL quote API.
//!
//! A 401 from the quote endpoint is modeled as a [`TenorOutcome::Expired`]
//! state rather than an error, so the refresh-then-retry branch is an
//! explicit transition: on expiry the client asks the [`TokenManager`] for a
//! refresh and retries both tenors exactly once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::auth::TokenManager;
use crate::config::Config;
use crate::error::QuoteError;

/// Settlement tenor of a quote: spot (`t0`) or next session (`t1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tenor {
    /// Current-session settlement.
    T0,
    /// Next-session settlement.
    T1,
}

impl Tenor {
    /// Tenor code as the IOL API spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tenor::T0 => "t0",
            Tenor::T1 => "t1",
        }
    }
}

impl fmt::Display for Tenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single tenor request.
#[derive(Debug, Clone)]
pub enum TenorOutcome {
    /// The endpoint returned a last price.
    Price(Decimal),
    /// The access token was rejected; a refresh is needed.
    Expired,
}

/// One symbol's t0/t1 prices for a single polling cycle.
///
/// Immutable once constructed and discarded after evaluation; nothing is
/// retained across cycles except the derived alert key.
#[derive(Debug, Clone)]
pub struct QuoteSample {
    /// Ticker symbol.
    pub symbol: String,
    /// Current-session settlement price.
    pub price_t0: Decimal,
    /// Next-session settlement price.
    pub price_t1: Decimal,
    /// When the pair was retrieved.
    pub fetched_at: OffsetDateTime,
}

/// Raw transport for a single tenor request.
#[async_trait]
pub trait QuoteTransport: Send + Sync {
    /// Fetch the last price for `symbol` at `tenor` using `access_token`.
    async fn last_price(
        &self,
        symbol: &str,
        tenor: Tenor,
        access_token: &str,
    ) -> Result<TenorOutcome, QuoteError>;
}

/// Quote payload from IOL; only the last price is of interest.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "ultimoPrecio")]
    ultimo_precio: Option<Decimal>,
}

/// Transport against the real IOL quote endpoint.
#[derive(Debug, Clone)]
pub struct IolQuoteTransport {
    /// Shared HTTP client; carries the per-request timeout.
    http: reqwest::Client,
    /// API base URL.
    api_url: String,
    /// Market identifier (e.g. `bcba`).
    market: String,
}

impl IolQuoteTransport {
    /// Create a transport for the configured market.
    pub fn new(http: reqwest::Client, api_url: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            market: market.into(),
        }
    }
}

#[async_trait]
impl QuoteTransport for IolQuoteTransport {
    async fn last_price(
        &self,
        symbol: &str,
        tenor: Tenor,
        access_token: &str,
    ) -> Result<TenorOutcome, QuoteError> {
        let url = format!(
            "{}/{}/Titulos/{}/Cotizacion",
            self.api_url, self.market, symbol
        );

        let response = self
            .http
            .get(&url)
            .query(&[
                ("model.mercado", self.market.as_str()),
                ("model.plazo", tenor.as_str()),
                ("model.simbolo", symbol),
            ])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| QuoteError::Http {
                symbol: symbol.to_string(),
                source: e,
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(TenorOutcome::Expired);
        }

        if !response.status().is_success() {
            return Err(QuoteError::Status {
                symbol: symbol.to_string(),
                status: response.status().as_u16(),
            });
        }

        let quote: QuoteResponse =
            response.json().await.map_err(|e| QuoteError::MalformedPayload {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;

        let price = quote.ultimo_precio.ok_or_else(|| QuoteError::MissingPrice {
            symbol: symbol.to_string(),
            tenor,
        })?;

        Ok(TenorOutcome::Price(price))
    }
}

/// Trait the polling engine fetches through.
#[async_trait]
pub trait QuoteFetch: Send + Sync {
    /// Fetch one symbol's t0/t1 pair.
    async fn fetch_symbol(&self, symbol: &str) -> Result<QuoteSample, QuoteError>;
}

/// Both tenors of a pair fetch, or an expiry detected partway through.
enum PairOutcome {
    Prices { price_t0: Decimal, price_t1: Decimal },
    Expired,
}

/// Fetches a symbol's tenor pair, refreshing the token once on expiry.
pub struct QuoteClient {
    transport: Arc<dyn QuoteTransport>,
    tokens: Arc<TokenManager>,
}

impl QuoteClient {
    /// Create a client over an arbitrary transport.
    pub fn new(transport: Arc<dyn QuoteTransport>, tokens: Arc<TokenManager>) -> Self {
        Self { transport, tokens }
    }

    /// Create a client against the configured IOL endpoint.
    pub fn from_config(config: &Config, http: reqwest::Client, tokens: Arc<TokenManager>) -> Self {
        let transport = IolQuoteTransport::new(http, config.iol_api_url.clone(), config.market.clone());
        Self::new(Arc::new(transport), tokens)
    }

    /// Fetch both tenors with one token. Expiry on either sub-request aborts
    /// the pair so the retry refetches both with the new token.
    async fn fetch_pair(&self, symbol: &str, access_token: &str) -> Result<PairOutcome, QuoteError> {
        let price_t0 = match self.transport.last_price(symbol, Tenor::T0, access_token).await? {
            TenorOutcome::Price(p) => p,
            TenorOutcome::Expired => return Ok(PairOutcome::Expired),
        };

        let price_t1 = match self.transport.last_price(symbol, Tenor::T1, access_token).await? {
            TenorOutcome::Price(p) => p,
            TenorOutcome::Expired => return Ok(PairOutcome::Expired),
        };

        Ok(PairOutcome::Prices { price_t0, price_t1 })
    }

    fn sample(symbol: &str, price_t0: Decimal, price_t1: Decimal) -> QuoteSample {
        QuoteSample {
            symbol: symbol.to_string(),
            price_t0,
            price_t1,
            fetched_at: OffsetDateTime::now_utc(),
        }
    }
}

#[async_trait]
impl QuoteFetch for QuoteClient {
    async fn fetch_symbol(&self, symbol: &str) -> Result<QuoteSample, QuoteError> {
        let snapshot = self.tokens.snapshot().await.map_err(|e| QuoteError::Auth {
            symbol: symbol.to_string(),
            source: e,
        })?;

        match self.fetch_pair(symbol, &snapshot.access_token).await? {
            PairOutcome::Prices { price_t0, price_t1 } => {
                Ok(Self::sample(symbol, price_t0, price_t1))
            }
            PairOutcome::Expired => {
                debug!(symbol, "access token expired, refreshing");
                let snapshot = self.tokens.refresh(&snapshot).await.map_err(|e| {
                    QuoteError::Auth {
                        symbol: symbol.to_string(),
                        source: e,
                    }
                })?;

                // One retry with the new token; a second 401 is terminal for
                // this symbol until the next cycle.
                match self.fetch_pair(symbol, &snapshot.access_token).await? {
                    PairOutcome::Prices { price_t0, price_t1 } => {
                        Ok(Self::sample(symbol, price_t0, price_t1))
                    }
                    PairOutcome::Expired => Err(QuoteError::Auth {
                        symbol: symbol.to_string(),
                        source: crate::error::AuthError::StillExpired,
                    }),
                }
            }
        }
    }
}
