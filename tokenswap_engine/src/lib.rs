//! Token Swap Engine
//!
//! The engine manages the lifecycle of peer-to-peer token swap orders and settles them against deposits observed on
//! external ledgers.
//!
//! Three kinds of actors change orders concurrently:
//! 1. Makers and takers, through the [`OrderFlowApi`] (create, take, cancel).
//! 2. One [`reconciler::DepositReconciler`] per monitored token, which polls a ledger for incoming transfers and
//!    advances the orders they pay for.
//! 3. The [`timeout_supervisor::TimeoutSupervisor`], which cancels orders whose deposits did not arrive in time.
//!
//! None of them take locks. Every status change is a conditional write that only succeeds if the order is still in the
//! status the writer expects (see [`traits::OrderStore::update_status_if`]), so of any two actors racing to move the
//! same order, exactly one wins. The transition table itself lives in [`state_machine`].
//!
//! Storage is pluggable via the traits in [`traits`]; [`SqliteDatabase`] is the bundled backend.
//!
//! Hooks can be attached to order events (see [`events`]).
pub mod db_types;
pub mod events;
pub mod market;
pub mod reconciler;
pub mod state_machine;
pub mod timeout_supervisor;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;
mod tse_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::{db, SqliteDatabase};
pub use tse_api::{
    errors::{ErrorKind, OrderFlowError},
    order_flow_api::OrderFlowApi,
    order_objects,
};
