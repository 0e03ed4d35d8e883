use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub db_path: String,

    // Closing policy: fee applied when the close price is derived from a
    // target or stop level (manual closes always collect the fee)
    pub default_exit_fee_pct: Decimal,

    // Statistics
    pub instrument_lookback_days: i64,

    // Sessions
    pub session_ttl_minutes: i64,

    // Export
    pub export_dir: String,

    // Mode
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            db_path: env::var("JOURNAL_DB_PATH").unwrap_or_else(|_| "trades.db".to_string()),

            default_exit_fee_pct: env::var("DEFAULT_EXIT_FEE_PCT")
                .unwrap_or_else(|_| "0.18".to_string())
                .parse()
                .context("Invalid DEFAULT_EXIT_FEE_PCT")?,

            instrument_lookback_days: env::var("INSTRUMENT_LOOKBACK_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid INSTRUMENT_LOOKBACK_DAYS")?,

            session_ttl_minutes: env::var("SESSION_TTL_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid SESSION_TTL_MINUTES")?,

            export_dir: env::var("EXPORT_DIR").unwrap_or_else(|_| ".".to_string()),

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "trades.db".to_string(),
            default_exit_fee_pct: dec!(0.18),
            instrument_lookback_days: 30,
            session_ttl_minutes: 60,
            export_dir: ".".to_string(),
            log_level: "info".to_string(),
        }
    }
}
