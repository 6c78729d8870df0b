//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === IOL Credentials ===
    /// InvertirOnline account username.
    pub iol_username: String,

    /// InvertirOnline account password.
    pub iol_password: String,

    // === Telegram ===
    /// Bot API token obtained from BotFather.
    pub telegram_token: String,

    /// Target chat ID for alerts.
    pub telegram_chat_id: String,

    // === Monitoring Parameters ===
    /// Comma-separated ticker symbols to watch (e.g. "GGAL,YPFD,PAMP").
    pub tickers: String,

    /// Minimum t0/t1 variation (in percent) that raises an alert.
    #[serde(default = "default_variation_threshold")]
    pub variation_threshold_pct: Decimal,

    /// Minutes to sleep between polling cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u64,

    /// Market identifier in IOL's URL scheme.
    #[serde(default = "default_market")]
    pub market: String,

    // === Endpoints ===
    /// IOL REST API base URL.
    #[serde(default = "default_api_url")]
    pub iol_api_url: String,

    /// IOL OAuth token endpoint.
    #[serde(default = "default_token_url")]
    pub iol_token_url: String,

    /// Telegram Bot API base URL.
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    // === HTTP Tuning ===
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Maximum concurrent symbol fetches per cycle.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    // === Logging ===
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_variation_threshold() -> Decimal {
    Decimal::ONE // 1%
}

fn default_poll_interval() -> u64 {
    1
}

fn default_market() -> String {
    "bcba".to_string()
}

fn default_api_url() -> String {
    "https://api.invertironline.com/api".to_string()
}

fn default_token_url() -> String {
    "https://api.invertironline.com/token".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_fetch_concurrency() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.iol_username.is_empty() {
            return Err("IOL_USERNAME is required".to_string());
        }

        if self.iol_password.is_empty() {
            return Err("IOL_PASSWORD is required".to_string());
        }

        if self.telegram_token.is_empty() {
            return Err("TELEGRAM_TOKEN is required".to_string());
        }

        if self.telegram_chat_id.is_empty() {
            return Err("TELEGRAM_CHAT_ID is required".to_string());
        }

        if self.ticker_list().is_empty() {
            return Err("TICKERS must list at least one symbol".to_string());
        }

        if self.variation_threshold_pct <= Decimal::ZERO {
            return Err("VARIATION_THRESHOLD_PCT must be positive".to_string());
        }

        if self.poll_interval_minutes == 0 {
            return Err("POLL_INTERVAL_MINUTES must be at least 1".to_string());
        }

        if self.fetch_concurrency == 0 {
            return Err("FETCH_CONCURRENCY must be at least 1".to_string());
        }

        Ok(())
    }

    /// Parse the ticker list, preserving configuration order.
    pub fn ticker_list(&self) -> Vec<String> {
        self.tickers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_uppercase())
            .collect()
    }

    /// Sleep duration between polling cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }

    /// Per-request HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_config() -> Config {
        Config {
            iol_username: "user@example.com".to_string(),
            iol_password: "hunter2".to_string(),
            telegram_token: "123:token".to_string(),
            telegram_chat_id: "-100123".to_string(),
            tickers: "GGAL,YPFD".to_string(),
            variation_threshold_pct: default_variation_threshold(),
            poll_interval_minutes: default_poll_interval(),
            market: default_market(),
            iol_api_url: default_api_url(),
            iol_token_url: default_token_url(),
            telegram_api_url: default_telegram_api_url(),
            http_timeout_ms: default_http_timeout_ms(),
            fetch_concurrency: default_fetch_concurrency(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }

    #[test]
    fn default_values_are_sensible() {
        assert_eq!(default_variation_threshold(), Decimal::ONE);
        assert_eq!(default_poll_interval(), 1);
        assert_eq!(default_market(), "bcba");
        assert_eq!(default_fetch_concurrency(), 5);
    }

    #[test]
    fn ticker_list_splits_trims_and_uppercases() {
        let mut config = test_config();
        config.tickers = " ggal, YPFD ,pamp,,".to_string();
        assert_eq!(config.ticker_list(), vec!["GGAL", "YPFD", "PAMP"]);
    }

    #[test]
    fn ticker_list_preserves_order() {
        let mut config = test_config();
        config.tickers = "ZZZ,AAA,MMM".to_string();
        assert_eq!(config.ticker_list(), vec!["ZZZ", "AAA", "MMM"]);
    }

    #[test]
    fn validate_rejects_empty_tickers() {
        let mut config = test_config();
        config.tickers = " , ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_threshold() {
        let mut config = test_config();
        config.variation_threshold_pct = dec!(0);
        assert!(config.validate().is_err());

        config.variation_threshold_pct = dec!(-1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = test_config();
        config.poll_interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_full_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn poll_interval_converts_minutes() {
        let mut config = test_config();
        config.poll_interval_minutes = 3;
        assert_eq!(config.poll_interval(), Duration::from_secs(180));
    }
}
