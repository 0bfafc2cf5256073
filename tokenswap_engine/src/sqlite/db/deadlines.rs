use sqlx::SqliteConnection;

use crate::db_types::{OrderDeadline, OrderId, OrderStatusType};

pub async fn upsert_deadline(deadline: &OrderDeadline, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO order_deadlines (order_id, status, fires_at) VALUES ($1, $2, $3)
            ON CONFLICT (order_id, status) DO UPDATE SET fires_at = excluded.fires_at;
        "#,
    )
    .bind(deadline.order_id.as_str())
    .bind(deadline.status)
    .bind(deadline.fires_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Removes every deadline of the order that is not tagged with `current`.
pub async fn remove_stale_deadlines(
    order_id: &OrderId,
    current: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM order_deadlines WHERE order_id = $1 AND status <> $2")
        .bind(order_id.as_str())
        .bind(current)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn remove_deadline(
    order_id: &OrderId,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM order_deadlines WHERE order_id = $1 AND status = $2")
        .bind(order_id.as_str())
        .bind(status)
        .execute(conn)
        .await?;
    Ok(())
}

/// All pending deadlines, soonest first.
pub async fn fetch_deadlines(conn: &mut SqliteConnection) -> Result<Vec<OrderDeadline>, sqlx::Error> {
    let mut deadlines: Vec<OrderDeadline> =
        sqlx::query_as("SELECT order_id, status, fires_at FROM order_deadlines").fetch_all(conn).await?;
    deadlines.sort_by(|a, b| a.fires_at.cmp(&b.fires_at));
    Ok(deadlines)
}
