//! Market configuration.
//!
//! The vocabulary the engine accepts (trading pairs, chains, address formats) and the tuning knobs of the background
//! workers live in a single immutable [`MarketConfig`]. It is built once at start-up and handed to each component as
//! an `Arc<MarketConfig>`; nothing in the engine modifies it afterwards.
use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use tsw_common::{TokenAmount, DEFAULT_LEDGER_SCALE};

use crate::db_types::{OrderType, TradingPair, WalletRole};

pub const DEFAULT_MINIMUM_AMOUNT: i64 = 10;
pub const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_PENDING_TIMEOUTS: usize = 10_000;
pub const DEFAULT_PAIRS: [&str; 2] = ["XEL/USDT", "XEL/USDC"];
pub const DEFAULT_CHAINS: [&str; 1] = ["polygon"];
pub const DEFAULT_ADDRESS_FORMATS: [(&str, &str); 3] =
    [("XEL", r"^xet:[a-z0-9]{59}$"), ("USDT", r"^0x[0-9a-fA-F]{40}$"), ("USDC", r"^0x[0-9a-fA-F]{40}$")];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    #[error("{0} is not a supported trading pair")]
    UnsupportedPair(String),
    #[error("{0} is not a supported chain")]
    UnsupportedChain(String),
    #[error("No address format is known for token {0}")]
    UnknownToken(String),
    #[error("{address} is not a valid {token} wallet address")]
    InvalidAddress { token: String, address: String },
    #[error("Invalid address pattern for {token}: {reason}")]
    InvalidPattern { token: String, reason: String },
}

/// A ledger account the engine watches for incoming deposits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredToken {
    pub token: String,
    /// The custodial address participants pay into
    pub target_address: String,
    /// Number of ledger units per whole token
    pub scale: u64,
}

impl MonitoredToken {
    pub fn new<S: Into<String>>(token: S, target_address: S) -> Self {
        Self { token: token.into(), target_address: target_address.into(), scale: DEFAULT_LEDGER_SCALE }
    }

    pub fn with_scale(mut self, scale: u64) -> Self {
        self.scale = scale;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub pairs: Vec<TradingPair>,
    pub chains: Vec<String>,
    pub minimum_amount: TokenAmount,
    /// How long an order may wait for a deposit before it is cancelled
    pub order_timeout: Duration,
    /// Upper bound on the number of in-memory timeout tasks
    pub max_pending_timeouts: usize,
    pub address_formats: HashMap<String, Regex>,
    pub monitored: Vec<MonitoredToken>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let pairs = DEFAULT_PAIRS.iter().filter_map(|p| p.parse().ok()).collect();
        let address_formats = DEFAULT_ADDRESS_FORMATS
            .iter()
            .filter_map(|(token, pattern)| Regex::new(pattern).ok().map(|re| (token.to_string(), re)))
            .collect();
        Self {
            pairs,
            chains: DEFAULT_CHAINS.iter().map(|c| c.to_string()).collect(),
            minimum_amount: TokenAmount::from_whole(DEFAULT_MINIMUM_AMOUNT),
            order_timeout: DEFAULT_ORDER_TIMEOUT,
            max_pending_timeouts: DEFAULT_MAX_PENDING_TIMEOUTS,
            address_formats,
            monitored: Vec::new(),
        }
    }
}

impl MarketConfig {
    pub fn with_pairs(mut self, pairs: Vec<TradingPair>) -> Self {
        self.pairs = pairs;
        self
    }

    pub fn with_chains(mut self, chains: Vec<String>) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_minimum_amount(mut self, minimum_amount: TokenAmount) -> Self {
        self.minimum_amount = minimum_amount;
        self
    }

    pub fn with_order_timeout(mut self, order_timeout: Duration) -> Self {
        self.order_timeout = order_timeout;
        self
    }

    pub fn with_max_pending_timeouts(mut self, max: usize) -> Self {
        self.max_pending_timeouts = max;
        self
    }

    pub fn with_monitored_token(mut self, token: MonitoredToken) -> Self {
        self.monitored.push(token);
        self
    }

    /// Registers (or replaces) the wallet address format for `token`.
    pub fn with_address_format(mut self, token: &str, pattern: &str) -> Result<Self, MarketError> {
        let re = Regex::new(pattern)
            .map_err(|e| MarketError::InvalidPattern { token: token.to_string(), reason: e.to_string() })?;
        self.address_formats.insert(token.to_string(), re);
        Ok(self)
    }

    pub fn validate_pair(&self, pair: &str) -> Result<TradingPair, MarketError> {
        self.pairs
            .iter()
            .find(|p| p.as_str() == pair)
            .cloned()
            .ok_or_else(|| MarketError::UnsupportedPair(pair.to_string()))
    }

    pub fn validate_chain(&self, chain: &str) -> Result<(), MarketError> {
        if self.chains.iter().any(|c| c == chain) {
            Ok(())
        } else {
            Err(MarketError::UnsupportedChain(chain.to_string()))
        }
    }

    pub fn validate_wallet_address(&self, token: &str, address: &str) -> Result<(), MarketError> {
        let re = self.address_formats.get(token).ok_or_else(|| MarketError::UnknownToken(token.to_string()))?;
        if re.is_match(address) {
            Ok(())
        } else {
            Err(MarketError::InvalidAddress { token: token.to_string(), address: address.to_string() })
        }
    }

    /// The moment an order entering a deposit-waiting status at `now` times out.
    pub fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.order_timeout).unwrap_or_else(|_| chrono::Duration::days(365));
        now + timeout
    }

    pub fn monitored_token(&self, token: &str) -> Option<&MonitoredToken> {
        self.monitored.iter().find(|m| m.token == token)
    }
}

/// The token that the participant with the given role pays into the swap.
///
/// The maker of a buy order pays in the quote token, and the maker of a sell order pays in the base token. The taker
/// always pays in the other leg of the pair.
pub fn token_for(pair: &TradingPair, order_type: OrderType, role: WalletRole) -> &str {
    match (order_type, role) {
        (OrderType::Buy, WalletRole::Maker) | (OrderType::Sell, WalletRole::Taker) => pair.quote(),
        (OrderType::Sell, WalletRole::Maker) | (OrderType::Buy, WalletRole::Taker) => pair.base(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const XEL_ADDRESS: &str = "xet:qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq";
    const EVM_ADDRESS: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    #[test]
    fn defaults() {
        let config = MarketConfig::default();
        assert_eq!(config.pairs.len(), 2);
        assert_eq!(config.minimum_amount.to_string(), "10.00");
        assert_eq!(config.order_timeout, Duration::from_secs(120));
        assert_eq!(config.address_formats.len(), 3);
        assert!(config.validate_chain("polygon").is_ok());
        assert!(matches!(config.validate_chain("solana"), Err(MarketError::UnsupportedChain(_))));
    }

    #[test]
    fn deadlines_follow_the_order_timeout() {
        let config = MarketConfig::default().with_order_timeout(Duration::from_secs(5));
        let now = Utc::now();
        assert_eq!(config.deadline_from(now) - now, chrono::Duration::seconds(5));
    }

    #[test]
    fn pairs_must_be_configured() {
        let config = MarketConfig::default();
        assert_eq!(config.validate_pair("XEL/USDT").unwrap().quote(), "USDT");
        assert!(matches!(config.validate_pair("XEL/DAI"), Err(MarketError::UnsupportedPair(_))));
        assert!(config.validate_pair("xel/usdt").is_err());
    }

    #[test]
    fn wallet_token_follows_role_and_type() {
        let pair: TradingPair = "XEL/USDT".parse().unwrap();
        assert_eq!(token_for(&pair, OrderType::Buy, WalletRole::Maker), "USDT");
        assert_eq!(token_for(&pair, OrderType::Buy, WalletRole::Taker), "XEL");
        assert_eq!(token_for(&pair, OrderType::Sell, WalletRole::Maker), "XEL");
        assert_eq!(token_for(&pair, OrderType::Sell, WalletRole::Taker), "USDT");
    }

    #[test]
    fn address_formats() {
        let config = MarketConfig::default();
        assert_eq!(XEL_ADDRESS.len(), 63);
        assert!(config.validate_wallet_address("XEL", XEL_ADDRESS).is_ok());
        assert!(config.validate_wallet_address("USDT", EVM_ADDRESS).is_ok());
        assert!(config.validate_wallet_address("USDC", &EVM_ADDRESS.to_lowercase()).is_ok());
        assert!(matches!(
            config.validate_wallet_address("USDT", XEL_ADDRESS),
            Err(MarketError::InvalidAddress { .. })
        ));
        assert!(config.validate_wallet_address("XEL", &XEL_ADDRESS[..62]).is_err());
        assert!(matches!(config.validate_wallet_address("DAI", EVM_ADDRESS), Err(MarketError::UnknownToken(_))));
    }

    #[test]
    fn custom_address_format() {
        let config = MarketConfig::default().with_address_format("DAI", r"^0x[0-9a-f]{40}$").unwrap();
        assert!(config.validate_wallet_address("DAI", &EVM_ADDRESS.to_lowercase()).is_ok());
        assert!(matches!(
            MarketConfig::default().with_address_format("DAI", "(unclosed"),
            Err(MarketError::InvalidPattern { .. })
        ));
    }
}
