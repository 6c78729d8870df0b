//! Unified error types for the alert bot.

use thiserror::Error;

use crate::quote::Tenor;

/// Unified error type for the alert bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Authentication error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Quote fetch error.
    #[error("quote error: {0}")]
    Quote(#[from] QuoteError),

    /// Notification delivery error.
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Token acquisition and refresh errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No credential has been installed yet; `acquire` must run first.
    #[error("not authenticated: acquire() has not succeeded")]
    NotAuthenticated,

    /// The password grant was rejected.
    #[error("login rejected: HTTP {status}: {body}")]
    LoginRejected {
        /// HTTP status code returned by the token endpoint.
        status: u16,
        /// Response body, for the operator's eyes.
        body: String,
    },

    /// The refresh grant was rejected (refresh token expired or revoked).
    #[error("refresh rejected: HTTP {status}: {body}")]
    RefreshRejected {
        /// HTTP status code returned by the token endpoint.
        status: u16,
        /// Response body, for the operator's eyes.
        body: String,
    },

    /// The access token was still rejected after one refresh.
    #[error("access token still expired after refresh")]
    StillExpired,

    /// Token endpoint returned a payload we could not parse.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Per-symbol quote fetch errors. Every variant carries the symbol so a
/// failure can be logged and skipped without losing context.
#[derive(Error, Debug)]
pub enum QuoteError {
    /// Authentication failed for this symbol's fetch.
    #[error("{symbol}: authentication failed: {source}")]
    Auth {
        /// Symbol whose fetch failed.
        symbol: String,
        /// Underlying auth failure.
        #[source]
        source: AuthError,
    },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("{symbol}: http request failed: {source}")]
    Http {
        /// Symbol whose fetch failed.
        symbol: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx, non-auth response from the quote endpoint.
    #[error("{symbol}: quote request failed with HTTP {status}")]
    Status {
        /// Symbol whose fetch failed.
        symbol: String,
        /// HTTP status code.
        status: u16,
    },

    /// Response body could not be parsed.
    #[error("{symbol}: malformed quote payload: {reason}")]
    MalformedPayload {
        /// Symbol whose fetch failed.
        symbol: String,
        /// Parse failure description.
        reason: String,
    },

    /// Payload parsed but the expected price field was absent.
    #[error("{symbol}: missing ultimoPrecio for tenor {tenor}")]
    MissingPrice {
        /// Symbol whose fetch failed.
        symbol: String,
        /// Tenor whose price was missing.
        tenor: Tenor,
    },
}

/// Notification delivery errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Transport-level failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The messaging API rejected the send.
    #[error("message rejected: HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body from the messaging API.
        body: String,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
