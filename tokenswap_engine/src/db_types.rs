use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
pub use tsw_common::TokenAmount;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

/// Declares a closed vocabulary that is stored and transmitted as a snake_case string.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
        #[sqlx(rename_all = "snake_case")]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(ConversionError(format!("'{other}' is not a valid {}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
string_enum! {
    /// The lifecycle status of an order. See [`crate::state_machine`] for the permitted transitions.
    OrderStatusType {
        /// The order has been created and the maker's deposit has not been observed yet.
        WaitingDeposit => "waiting_deposit",
        /// The maker's deposit has been confirmed. The order can be taken.
        Active => "active",
        /// A taker has accepted the order, and their deposit has not been observed yet.
        TakeInProgress => "take_in_progress",
        /// Both legs have been deposited.
        Completed => "completed",
        /// The owner cancelled the order.
        Cancelled => "cancelled",
        /// A deposit deadline elapsed before the order advanced.
        TimeoutCancelled => "timeout_cancelled",
    }
}

impl OrderStatusType {
    /// Terminal orders never change status again. They are kept for auditing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::TimeoutCancelled)
    }
}

//--------------------------------------     Vocabularies      ---------------------------------------------------------
string_enum! {
    OrderType {
        Buy => "buy",
        Sell => "sell",
    }
}

string_enum! {
    /// Who pays the swap fee.
    FeePayer {
        Split => "split",
        Buyer => "buyer",
        Seller => "seller",
    }
}

string_enum! {
    Network {
        Mainnet => "mainnet",
        Testnet => "testnet",
    }
}

string_enum! {
    Visibility {
        Public => "public",
        Private => "private",
    }
}

string_enum! {
    /// The side of the trade a registered wallet belongs to.
    WalletRole {
        Maker => "maker",
        Taker => "taker",
    }
}

impl WalletRole {
    /// The order status in which a deposit from a wallet with this role is expected.
    pub fn awaited_status(&self) -> OrderStatusType {
        match self {
            WalletRole::Maker => OrderStatusType::WaitingDeposit,
            WalletRole::Taker => OrderStatusType::TakeInProgress,
        }
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub const ORDER_ID_LENGTH: usize = 10;

impl OrderId {
    /// A fresh random id of [`ORDER_ID_LENGTH`] characters from `[A-Za-z0-9]`.
    pub fn random() -> Self {
        let id = rand::thread_rng().sample_iter(&Alphanumeric).take(ORDER_ID_LENGTH).map(char::from).collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      TradingPair      ---------------------------------------------------------
/// A `BASE/QUOTE` token pair, e.g. `XEL/USDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TradingPair(String);

impl TradingPair {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn base(&self) -> &str {
        self.legs().0
    }

    pub fn quote(&self) -> &str {
        self.legs().1
    }

    fn legs(&self) -> (&str, &str) {
        self.0.split_once('/').unwrap_or((self.0.as_str(), ""))
    }
}

impl FromStr for TradingPair {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('/') => {
                Ok(Self(s.to_string()))
            },
            _ => Err(ConversionError(format!("'{s}' is not a BASE/QUOTE trading pair"))),
        }
    }
}

impl Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    /// Opaque reference to the user that created the order
    pub owner_id: String,
    pub order_type: OrderType,
    pub pair: TradingPair,
    pub amount: TokenAmount,
    pub price: TokenAmount,
    pub fee_payer: FeePayer,
    pub chain: String,
    pub network: Network,
    pub visibility: Visibility,
    pub referral: Option<String>,
    pub status: OrderStatusType,
    /// The status held before the most recent transition. `None` for orders that have never moved.
    pub previous_status: Option<OrderStatusType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
/// A validated order that has not been stored yet. New orders always start in `WaitingDeposit`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub owner_id: String,
    pub order_type: OrderType,
    pub pair: TradingPair,
    pub amount: TokenAmount,
    pub price: TokenAmount,
    pub fee_payer: FeePayer,
    pub chain: String,
    pub network: Network,
    pub visibility: Visibility,
    pub referral: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  WalletRegistration   ---------------------------------------------------------
/// Links a participant's wallet address to the order it will pay into.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WalletRegistration {
    pub id: i64,
    pub order_id: OrderId,
    pub role: WalletRole,
    /// The token this wallet is expected to deposit
    pub token: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWalletRegistration {
    pub order_id: OrderId,
    pub role: WalletRole,
    pub token: String,
    pub address: String,
}

impl NewWalletRegistration {
    pub fn new(order_id: OrderId, role: WalletRole, token: impl Into<String>, address: impl Into<String>) -> Self {
        Self { order_id, role, token: token.into(), address: address.into() }
    }
}

//--------------------------------------    OrderDeadline      ---------------------------------------------------------
/// A persisted timeout: if the order is still in `status` at `fires_at`, it is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderDeadline {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub fires_at: DateTime<Utc>,
}

impl OrderDeadline {
    pub fn new(order_id: OrderId, status: OrderStatusType, fires_at: DateTime<Utc>) -> Self {
        Self { order_id, status, fires_at }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fires_at <= now
    }
}

//--------------------------------------    LedgerTransfer     ---------------------------------------------------------
/// An incoming transfer as reported by a ledger client. These are never stored; the same transfer may be reported on
/// several consecutive polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransfer {
    /// The address the funds came from
    pub sender: String,
    /// The amount in the ledger's smallest unit
    pub amount_units: u128,
    pub txid: String,
}

impl LedgerTransfer {
    pub fn new(sender: impl Into<String>, amount_units: u128, txid: impl Into<String>) -> Self {
        Self { sender: sender.into(), amount_units, txid: txid.into() }
    }
}
