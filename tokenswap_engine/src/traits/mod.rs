//! # Storage contracts
//!
//! This module defines what the engine needs from a persistence backend.
//!
//! * [`OrderStore`] holds orders and their pending deadlines. Its central primitive is
//!   [`OrderStore::update_status_if`], a compare-and-set on the order status. Every status change in the engine goes
//!   through it (or through [`OrderStore::take_order`], which wraps the same check in a transaction), and it is the
//!   only concurrency control the engine relies on.
//! * [`WalletIndex`] is the append-only mapping from participant wallet addresses to the orders they were registered
//!   for.
//!
//! Multi-record writes (order + maker registration, status change + taker registration) must be all-or-nothing.
mod order_store;
mod wallet_index;

pub use order_store::{OrderStore, StoreError};
pub use wallet_index::WalletIndex;
