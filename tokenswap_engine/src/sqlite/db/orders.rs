use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    order_objects::OrderQueryFilter,
    traits::StoreError,
};

/// Inserts a new order in `WaitingDeposit`. This is not atomic on its own; run it inside a transaction (passing `&mut
/// tx`) together with the maker registration.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    let order_id = order.order_id.clone();
    let result: Result<Order, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                owner_id,
                order_type,
                pair,
                amount,
                price,
                fee_payer,
                chain,
                network,
                visibility,
                referral,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.owner_id)
    .bind(order.order_type)
    .bind(order.pair)
    .bind(order.amount)
    .bind(order.price)
    .bind(order.fee_payer)
    .bind(order.chain)
    .bind(order.network)
    .bind(order.visibility)
    .bind(order.referral)
    .bind(OrderStatusType::WaitingDeposit)
    .bind(order.created_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::DuplicateOrderId(order_id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id);
    }
    if let Some(owner_id) = query.owner_id {
        where_clause.push("owner_id = ");
        where_clause.push_bind_unseparated(owner_id);
    }
    if let Some(order_type) = query.order_type {
        where_clause.push("order_type = ");
        where_clause.push_bind_unseparated(order_type);
    }
    if let Some(pair) = query.pair {
        where_clause.push("pair = ");
        where_clause.push_bind_unseparated(pair);
    }
    if let Some(chain) = query.chain {
        where_clause.push("chain = ");
        where_clause.push_bind_unseparated(chain);
    }
    if let Some(network) = query.network {
        where_clause.push("network = ");
        where_clause.push_bind_unseparated(network);
    }
    if let Some(visibility) = query.visibility {
        where_clause.push("visibility = ");
        where_clause.push_bind_unseparated(visibility);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        for (i, status) in statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {}", orders.len());
    Ok(orders)
}

/// Compare-and-set on the order status.
///
/// The status is changed only if the current status is one of `expected` (and the order belongs to `owner_id`, when
/// given). Returns `None` when no row matched. SQLite evaluates the check and the write as one statement, so this is
/// atomic even outside a transaction.
pub async fn update_status_if(
    order_id: &OrderId,
    expected: &[OrderStatusType],
    new_status: OrderStatusType,
    owner_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    if expected.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET previous_status = status, status = ");
    builder.push_bind(new_status);
    builder.push(", updated_at = CURRENT_TIMESTAMP WHERE order_id = ");
    builder.push_bind(order_id.as_str());
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in expected {
        statuses.push_bind(*status);
    }
    statuses.push_unseparated(")");
    if let Some(owner_id) = owner_id {
        builder.push(" AND owner_id = ");
        builder.push_bind(owner_id);
    }
    builder.push(" RETURNING *");
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    match &order {
        Some(o) => debug!("📝️ Order {} moved to {}", o.order_id, o.status),
        None => trace!("📝️ Order {order_id} was not in any of {expected:?}. Status unchanged."),
    }
    Ok(order)
}
