//! # SQLite Database methods
//!
//! "Low-level" SQLite interactions, written as free functions that accept a `&mut SqliteConnection`. Callers obtain a
//! connection from the pool, or open a transaction and pass `&mut tx`, when several calls must succeed or fail
//! together.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod deadlines;
pub mod orders;
pub mod transfers;
pub mod wallets;

const SQLITE_DB_URL: &str = "sqlite://data/tokenswap.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("TSW_DATABASE_URL").unwrap_or_else(|_| {
        info!("TSW_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // Readers must not block behind the single writer
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
