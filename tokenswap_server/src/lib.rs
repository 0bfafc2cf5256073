//! # Token swap server
//! This crate hosts the long-running process for the token swap engine. It is responsible for:
//! Opening (and migrating) the order database.
//! Restoring the deposit deadlines of orders that were pending when the process last stopped.
//! Polling the ledger of every monitored token for incoming deposits and advancing the matching orders.
//! Cancelling orders whose deposit never arrives.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod server;
