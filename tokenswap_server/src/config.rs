use std::{env, time::Duration};

use log::*;
use tokenswap_engine::{
    db_types::TradingPair,
    market::{MarketConfig, MonitoredToken},
    reconciler::DEFAULT_POLL_INTERVAL,
    timeout_supervisor::DEFAULT_SWEEP_INTERVAL,
};
use tsw_common::{helpers::parse_boolean_flag, Secret, TokenAmount};

const DEFAULT_TSW_DATABASE_URL: &str = "sqlite://data/tokenswap.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    /// Apply pending schema migrations at startup
    pub run_migrations: bool,
    pub max_connections: u32,
    /// Base URL of the ledger indexer, e.g. `https://ledger.example.com/api`
    pub ledger_url: String,
    pub ledger_api_key: Secret<String>,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    pub market: MarketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_TSW_DATABASE_URL.to_string(),
            run_migrations: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            ledger_url: String::default(),
            ledger_api_key: Secret::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            market: MarketConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to its value. Invalid values are logged and
    /// replaced with the default.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();
        let database_url = lookup("TSW_DATABASE_URL").unwrap_or_else(|| {
            info!("🪛️ TSW_DATABASE_URL is not set. Using the default, {DEFAULT_TSW_DATABASE_URL}.");
            DEFAULT_TSW_DATABASE_URL.to_string()
        });
        let run_migrations = parse_boolean_flag(lookup("TSW_RUN_MIGRATIONS"), true);
        let ledger_url = lookup("TSW_LEDGER_URL").map(|s| s.trim_end_matches('/').to_string()).unwrap_or_else(|| {
            error!("🪛️ TSW_LEDGER_URL is not set. Deposits will not be detected until it points at a ledger indexer.");
            String::default()
        });
        let ledger_api_key = Secret::new(lookup("TSW_LEDGER_API_KEY").unwrap_or_default());
        let poll_interval = duration_or_default("TSW_POLL_INTERVAL", lookup("TSW_POLL_INTERVAL"), defaults.poll_interval);
        let sweep_interval =
            duration_or_default("TSW_SWEEP_INTERVAL", lookup("TSW_SWEEP_INTERVAL"), defaults.sweep_interval);
        let market = configure_market(&lookup);
        Self {
            database_url,
            run_migrations,
            max_connections: defaults.max_connections,
            ledger_url,
            ledger_api_key,
            poll_interval,
            sweep_interval,
            market,
        }
    }
}

fn configure_market<F: Fn(&str) -> Option<String>>(lookup: &F) -> MarketConfig {
    let mut market = MarketConfig::default();
    if let Some(pairs) = lookup("TSW_PAIRS") {
        let pairs = parse_pairs(&pairs);
        if pairs.is_empty() {
            warn!("🪛️ TSW_PAIRS does not contain any valid trading pairs. Using the default pairs instead.");
        } else {
            market = market.with_pairs(pairs);
        }
    }
    if let Some(chains) = lookup("TSW_CHAINS") {
        let chains = parse_list(&chains);
        if chains.is_empty() {
            warn!("🪛️ TSW_CHAINS is empty. Using the default chains instead.");
        } else {
            market = market.with_chains(chains);
        }
    }
    if let Some(amount) = lookup("TSW_MINIMUM_AMOUNT") {
        match amount.parse::<TokenAmount>() {
            Ok(v) if v.is_positive() => market = market.with_minimum_amount(v),
            Ok(v) => warn!("🪛️ TSW_MINIMUM_AMOUNT must be positive, not {v}. Using {}.", market.minimum_amount),
            Err(e) => warn!("🪛️ {amount} is not a valid TSW_MINIMUM_AMOUNT. {e} Using {}.", market.minimum_amount),
        }
    }
    let timeout = duration_or_default("TSW_ORDER_TIMEOUT", lookup("TSW_ORDER_TIMEOUT"), market.order_timeout);
    market = market.with_order_timeout(timeout);
    if let Some(max) = lookup("TSW_MAX_PENDING_TIMEOUTS") {
        match max.trim().parse::<usize>() {
            Ok(v) if v > 0 => market = market.with_max_pending_timeouts(v),
            _ => warn!(
                "🪛️ {max} is not a valid TSW_MAX_PENDING_TIMEOUTS. Using the default, {}.",
                market.max_pending_timeouts
            ),
        }
    }
    match lookup("TSW_MONITORED_TOKENS") {
        Some(s) => {
            for token in parse_monitored_tokens(&s) {
                info!("🪛️ Monitoring {} deposits into {}", token.token, token.target_address);
                market = market.with_monitored_token(token);
            }
        },
        None => warn!("🪛️ TSW_MONITORED_TOKENS is not set. No deposits will be reconciled."),
    }
    market
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|v| !v.is_empty()).map(String::from).collect()
}

fn parse_pairs(s: &str) -> Vec<TradingPair> {
    parse_list(s)
        .into_iter()
        .filter_map(|p| {
            p.parse::<TradingPair>().map_err(|e| warn!("🪛️ Ignoring invalid entry in TSW_PAIRS. {e}")).ok()
        })
        .collect()
}

/// Parses `TOKEN=target_address[:scale],...`. Malformed entries are skipped with a warning.
fn parse_monitored_tokens(s: &str) -> Vec<MonitoredToken> {
    parse_list(s)
        .into_iter()
        .filter_map(|entry| {
            let Some((token, rest)) = entry.split_once('=') else {
                warn!("🪛️ Ignoring '{entry}' in TSW_MONITORED_TOKENS. Expected TOKEN=address[:scale].");
                return None;
            };
            // Addresses may contain ':' themselves, so only an all-digit suffix is a scale
            let (address, scale) = match rest.rsplit_once(':') {
                Some((address, scale)) if !scale.is_empty() && scale.bytes().all(|b| b.is_ascii_digit()) => {
                    match scale.parse::<u64>() {
                        Ok(v) if v > 0 => (address, Some(v)),
                        _ => {
                            warn!("🪛️ Ignoring '{entry}' in TSW_MONITORED_TOKENS. '{scale}' is not a valid scale.");
                            return None;
                        },
                    }
                },
                _ => (rest, None),
            };
            let (token, address) = (token.trim(), address.trim());
            if token.is_empty() || address.is_empty() {
                warn!("🪛️ Ignoring '{entry}' in TSW_MONITORED_TOKENS. Token and address are both required.");
                return None;
            }
            let monitored = MonitoredToken::new(token, address);
            Some(match scale {
                Some(scale) => monitored.with_scale(scale),
                None => monitored,
            })
        })
        .collect()
}

/// Reads a whole number of seconds.
fn duration_or_default(name: &str, value: Option<String>, default: Duration) -> Duration {
    let Some(value) = value else {
        info!("🪛️ {name} is not set. Using the default value of {}s.", default.as_secs());
        return default;
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            warn!("🪛️ {value} is not a valid number of seconds for {name}. Using the default, {}s.", default.as_secs());
            default
        },
    }
}
