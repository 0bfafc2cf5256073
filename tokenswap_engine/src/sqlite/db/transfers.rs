use log::debug;
use sqlx::SqliteConnection;

use crate::{db_types::OrderId, traits::StoreError};

/// Records that `txid` on the `token` ledger paid for `order_id`. Run it in the same transaction as the status change
/// it pays for.
pub async fn insert_applied_transfer(
    token: &str,
    txid: &str,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<(), StoreError> {
    let result = sqlx::query("INSERT INTO applied_transfers (token, txid, order_id) VALUES ($1, $2, $3)")
        .bind(token)
        .bind(txid)
        .bind(order_id.as_str())
        .execute(conn)
        .await;
    match result {
        Ok(_) => {
            debug!("🧾️ {token} transfer {txid} recorded against order {order_id}");
            Ok(())
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(StoreError::TransferAlreadyApplied { token: token.to_string(), txid: txid.to_string() })
        },
        Err(e) => Err(e.into()),
    }
}

/// The order `txid` was applied to, if it has been applied at all.
pub async fn fetch_applied_transfer(
    token: &str,
    txid: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderId>, sqlx::Error> {
    let order_id: Option<String> =
        sqlx::query_scalar("SELECT order_id FROM applied_transfers WHERE token = $1 AND txid = $2")
            .bind(token)
            .bind(txid)
            .fetch_optional(conn)
            .await?;
    Ok(order_id.map(OrderId::from))
}
