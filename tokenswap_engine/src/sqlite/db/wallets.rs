use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewWalletRegistration, OrderId, WalletRegistration},
    traits::StoreError,
};

/// Registers a participant wallet for an order. A second registration for the same (order, role) is rejected with
/// [`StoreError::DuplicateRegistration`].
pub async fn insert_registration(
    registration: NewWalletRegistration,
    conn: &mut SqliteConnection,
) -> Result<WalletRegistration, StoreError> {
    let NewWalletRegistration { order_id, role, token, address } = registration;
    let result: Result<WalletRegistration, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO wallet_registrations (order_id, role, token, address)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(role)
    .bind(token)
    .bind(address)
    .fetch_one(conn)
    .await;
    match result {
        Ok(reg) => {
            debug!("👛️ {} wallet {} registered for order {}", reg.role, reg.address, reg.order_id);
            Ok(reg)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(StoreError::DuplicateRegistration { order_id, role })
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn registrations_for_address(
    address: &str,
    token: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<WalletRegistration>, sqlx::Error> {
    let registrations =
        sqlx::query_as("SELECT * FROM wallet_registrations WHERE address = $1 AND token = $2 ORDER BY id ASC")
            .bind(address)
            .bind(token)
            .fetch_all(conn)
            .await?;
    Ok(registrations)
}

pub async fn registrations_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<WalletRegistration>, sqlx::Error> {
    let registrations = sqlx::query_as("SELECT * FROM wallet_registrations WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(registrations)
}
