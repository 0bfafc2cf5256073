//! `SqliteDatabase` is the SQLite implementation of the engine's storage contracts, [`OrderStore`] and
//! [`WalletIndex`].
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate::Migrator, SqlitePool};

use super::db::{db_url, deadlines, new_pool, orders, transfers, wallets};
use crate::{
    db_types::{
        NewOrder,
        NewWalletRegistration,
        Order,
        OrderDeadline,
        OrderId,
        OrderStatusType,
        WalletRegistration,
    },
    order_objects::OrderQueryFilter,
    traits::{OrderStore, StoreError, WalletIndex},
};

static MIGRATOR: Migrator = sqlx::migrate!("./src/sqlite/migrations");

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

#[async_trait]
impl OrderStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        maker: NewWalletRegistration,
        fires_at: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        wallets::insert_registration(maker, &mut tx).await?;
        let deadline = OrderDeadline::new(order.order_id.clone(), OrderStatusType::WaitingDeposit, fires_at);
        deadlines::upsert_deadline(&deadline, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_id, order.id);
        Ok(order)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(filter, &mut conn).await?;
        Ok(orders)
    }

    async fn update_status_if(
        &self,
        order_id: &OrderId,
        expected: &[OrderStatusType],
        new_status: OrderStatusType,
        owner_id: Option<&str>,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_status_if(order_id, expected, new_status, owner_id, &mut tx)
            .await?
            .ok_or_else(|| StoreError::ConditionNotMet(order_id.clone()))?;
        let removed = deadlines::remove_stale_deadlines(order_id, new_status, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Order {order_id} is now {new_status}. {removed} deadline(s) discarded");
        Ok(order)
    }

    async fn apply_deposit(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
        token: &str,
        txid: &str,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_status_if(order_id, &[expected], new_status, None, &mut tx)
            .await?
            .ok_or_else(|| StoreError::ConditionNotMet(order_id.clone()))?;
        // A unique violation here drops `tx`, undoing the status change above
        transfers::insert_applied_transfer(token, txid, order_id, &mut tx).await?;
        deadlines::remove_stale_deadlines(order_id, new_status, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Order {order_id} is now {new_status}, paid by {token} transfer {txid}");
        Ok(order)
    }

    async fn fetch_applied_transfer(&self, token: &str, txid: &str) -> Result<Option<OrderId>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order_id = transfers::fetch_applied_transfer(token, txid, &mut conn).await?;
        Ok(order_id)
    }

    async fn take_order(
        &self,
        order_id: &OrderId,
        taker: NewWalletRegistration,
        fires_at: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let expected = [OrderStatusType::Active];
        // Dropping `tx` on any early return rolls the whole take back
        let order = orders::update_status_if(order_id, &expected, OrderStatusType::TakeInProgress, None, &mut tx)
            .await?
            .ok_or_else(|| StoreError::ConditionNotMet(order_id.clone()))?;
        deadlines::remove_stale_deadlines(order_id, OrderStatusType::TakeInProgress, &mut tx).await?;
        wallets::insert_registration(taker, &mut tx).await?;
        let deadline = OrderDeadline::new(order_id.clone(), OrderStatusType::TakeInProgress, fires_at);
        deadlines::upsert_deadline(&deadline, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} has been taken");
        Ok(order)
    }

    async fn fetch_deadlines(&self, due_before: Option<DateTime<Utc>>) -> Result<Vec<OrderDeadline>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let mut deadlines = deadlines::fetch_deadlines(&mut conn).await?;
        if let Some(cutoff) = due_before {
            deadlines.retain(|d| d.is_due(cutoff));
        }
        Ok(deadlines)
    }

    async fn remove_deadline(&self, order_id: &OrderId, status: OrderStatusType) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        deadlines::remove_deadline(order_id, status, &mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl WalletIndex for SqliteDatabase {
    async fn registrations_for_address(
        &self,
        address: &str,
        token: &str,
    ) -> Result<Vec<WalletRegistration>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let registrations = wallets::registrations_for_address(address, token, &mut conn).await?;
        Ok(registrations)
    }

    async fn registrations_for_order(&self, order_id: &OrderId) -> Result<Vec<WalletRegistration>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let registrations = wallets::registrations_for_order(order_id, &mut conn).await?;
        Ok(registrations)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `TSW_DATABASE_URL` (or the default path) for the database location.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies any outstanding schema migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        MIGRATOR.run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!("🗃️ Database connection pool closed");
    }
}
