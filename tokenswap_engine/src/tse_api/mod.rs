//! # Token swap engine public API
//!
//! [`order_flow_api::OrderFlowApi`] is what an API layer talks to. It is created from a storage backend that
//! implements [`crate::traits::OrderStore`] and [`crate::traits::WalletIndex`], plus the market configuration:
//!
//! ```rust,ignore
//! use tokenswap_engine::{events::EventProducers, market::MarketConfig, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = OrderFlowApi::new(db, Arc::new(MarketConfig::default()), EventProducers::default());
//! let order = api.create_order("alice", request, "0x5290...9EE7").await?;
//! ```
//!
//! Every operation returns a typed [`errors::OrderFlowError`]. [`order_objects::ApiResponse`] wraps a result in the
//! tagged envelope used on the wire.
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
