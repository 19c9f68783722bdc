//! Application configuration.
//!
//! Loaded from the environment (with a `.env` file layered in for local
//! development), following the common convention of a single `from_env`
//! constructor that fails fast on a missing or malformed variable.

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Allowed match durations, in real minutes.
    pub match_durations_min: Vec<u32>,
    /// Starting total account value for a new participant, in cents.
    pub starting_account_value_cents: i64,
    /// Seconds spent in PRE_MATCH before an operator can start TRADING.
    pub pre_match_countdown_secs: u64,
    /// Max absolute fuzz applied to NAV to derive the MM reference, in cents.
    pub mm_fuzz_cents: i64,
    /// Which bot roster to spin up per match.
    pub ecosystem_size: EcosystemSize,
    /// Size of the matching engine's bounded recent-trades ring.
    pub recent_trades_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcosystemSize {
    Minimal,
    Full,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let match_durations_min = std::env::var("MATCH_DURATIONS_MIN")
            .ok()
            .map(|v| {
                v.split(',')
                    .filter_map(|s| s.trim().parse::<u32>().ok())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec![10, 15, 30]);

        let starting_account_value_cents = std::env::var("STARTING_ACCOUNT_VALUE_CENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100_000_000);

        let pre_match_countdown_secs = std::env::var("PRE_MATCH_COUNTDOWN_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        let mm_fuzz_cents = std::env::var("MM_FUZZ_CENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let ecosystem_size = match std::env::var("ECOSYSTEM_SIZE")
            .unwrap_or_else(|_| "full".to_string())
            .as_str()
        {
            "minimal" => EcosystemSize::Minimal,
            _ => EcosystemSize::Full,
        };

        let recent_trades_capacity = std::env::var("RECENT_TRADES_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);

        Ok(Self {
            port,
            match_durations_min,
            starting_account_value_cents,
            pre_match_countdown_secs,
            mm_fuzz_cents,
            ecosystem_size,
            recent_trades_capacity,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            match_durations_min: vec![10, 15, 30],
            starting_account_value_cents: 100_000_000,
            pre_match_countdown_secs: 15,
            mm_fuzz_cents: 10,
            ecosystem_size: EcosystemSize::Full,
            recent_trades_capacity: 1000,
        }
    }
}
