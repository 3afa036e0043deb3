use std::time::Duration;

use crate::race::{CategoryFilter, CountryFilter};
use crate::store::{StoreSettings, DEFAULT_FETCH_COUNT, DEFAULT_REFRESH_SECS};
use crate::store::views::NEXT_TO_GO_LIMIT;

pub const DEFAULT_API_BASE: &str = "https://api.neds.com.au/rest/v1/racing";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    /// CORS-style proxy prefix, e.g. `https://corsproxy.io/`.
    pub api_proxy: Option<String>,
    pub request_timeout: Duration,
    pub fetch_count: u32,
    pub refresh_every: Duration,
    pub next_to_go_limit: usize,
    pub category: CategoryFilter,
    pub country: CountryFilter,
    pub board_every: Duration,
    pub once: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |key: &str, default: u64| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(default))
        };

        Self {
            api_base: var("RACING_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_proxy: var("RACING_API_PROXY").filter(|v| !v.trim().is_empty()),
            request_timeout: secs("RACING_TIMEOUT_SECS", 10),
            fetch_count: var("RACE_FETCH_COUNT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_FETCH_COUNT),
            refresh_every: secs("RACE_REFRESH_SECS", DEFAULT_REFRESH_SECS),
            next_to_go_limit: var("RACE_NEXT_TO_GO")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(NEXT_TO_GO_LIMIT),
            category: var("RACE_CATEGORY")
                .and_then(|v| CategoryFilter::parse(&v))
                .unwrap_or_default(),
            country: CountryFilter::parse(&var("RACE_COUNTRY").unwrap_or_else(|| "AUS".to_string())),
            board_every: secs("RACE_BOARD_SECS", 5),
            once: var("RACE_ONCE").map_or(false, |v| matches!(v.trim(), "1" | "true" | "yes")),
        }
    }

    /// Base URL requests are built from, with the proxy prefix applied.
    pub fn effective_base(&self) -> String {
        match &self.api_proxy {
            Some(proxy) => {
                let encoded: String = url::form_urlencoded::byte_serialize(self.api_base.as_bytes()).collect();
                format!("{}?{}", proxy, encoded)
            }
            None => self.api_base.clone(),
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            fetch_count: self.fetch_count,
            refresh_every: self.refresh_every,
            next_to_go_limit: self.next_to_go_limit,
            category: self.category,
            country: self.country.clone(),
        }
    }
}
