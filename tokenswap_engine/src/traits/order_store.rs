use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, NewWalletRegistration, Order, OrderDeadline, OrderId, OrderStatusType, WalletRole},
    order_objects::OrderQueryFilter,
};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("An order with id {0} already exists")]
    DuplicateOrderId(OrderId),
    #[error("A {role} wallet is already registered for order {order_id}")]
    DuplicateRegistration { order_id: OrderId, role: WalletRole },
    #[error("Order {0} did not match the update condition")]
    ConditionNotMet(OrderId),
    #[error("{token} transfer {txid} has already been applied to an order")]
    TransferAlreadyApplied { token: String, txid: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

#[async_trait]
pub trait OrderStore: Clone + Send + Sync + 'static {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order in `WaitingDeposit`, together with the maker's wallet registration and a deadline for the
    /// maker's deposit, as a single atomic unit.
    ///
    /// Fails with [`StoreError::DuplicateOrderId`] if the order id is already taken. Nothing is written in that case.
    async fn insert_order(
        &self,
        order: NewOrder,
        maker: NewWalletRegistration,
        fires_at: DateTime<Utc>,
    ) -> Result<Order, StoreError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Fetches orders matching the filter, oldest first.
    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, StoreError>;

    /// The conditional write.
    ///
    /// Sets the status of the order to `new_status` if, and only if, its current status is one of `expected` (and, if
    /// given, it belongs to `owner_id`). The check and the write are a single atomic operation, so of several callers
    /// racing to move the same order out of the same status, exactly one succeeds.
    ///
    /// Deadlines for the order that no longer apply are removed in the same transaction.
    ///
    /// Returns the updated order, or [`StoreError::ConditionNotMet`] if nothing matched.
    async fn update_status_if(
        &self,
        order_id: &OrderId,
        expected: &[OrderStatusType],
        new_status: OrderStatusType,
        owner_id: Option<&str>,
    ) -> Result<Order, StoreError>;

    /// The conditional write for a deposit.
    ///
    /// Moves the order from `expected` to `new_status` exactly like [`Self::update_status_if`], and in the same
    /// transaction records that the `token` ledger transfer `txid` paid for it. A transfer pays for at most one order:
    /// if `txid` was already recorded, [`StoreError::TransferAlreadyApplied`] is returned and nothing is written.
    async fn apply_deposit(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
        token: &str,
        txid: &str,
    ) -> Result<Order, StoreError>;

    /// The order a `token` ledger transfer was applied to, if any.
    async fn fetch_applied_transfer(&self, token: &str, txid: &str) -> Result<Option<OrderId>, StoreError>;

    /// Moves the order from `Active` to `TakeInProgress`, registers the taker's wallet and stores a deadline for the
    /// taker's deposit. If the order is not `Active`, [`StoreError::ConditionNotMet`] is returned and nothing is
    /// written.
    async fn take_order(
        &self,
        order_id: &OrderId,
        taker: NewWalletRegistration,
        fires_at: DateTime<Utc>,
    ) -> Result<Order, StoreError>;

    /// Returns the pending deadlines, soonest first. If `due_before` is given, only deadlines firing at or before that
    /// time are returned.
    async fn fetch_deadlines(&self, due_before: Option<DateTime<Utc>>) -> Result<Vec<OrderDeadline>, StoreError>;

    /// Discards a deadline. Removing a deadline that does not exist is not an error.
    async fn remove_deadline(&self, order_id: &OrderId, status: OrderStatusType) -> Result<(), StoreError>;
}
