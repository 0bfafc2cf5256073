//! The order state machine.
//!
//! | From                              | Trigger        | To                  |
//! |-----------------------------------|----------------|---------------------|
//! | `waiting_deposit`                 | maker deposit  | `active`            |
//! | `active`                          | take           | `take_in_progress`  |
//! | `take_in_progress`                | taker deposit  | `completed`         |
//! | `waiting_deposit`, `take_in_progress` | timeout    | `timeout_cancelled` |
//! | any non-terminal status           | owner cancel   | `cancelled`         |
//!
//! Orders are created in `waiting_deposit` and never leave a terminal status.
//!
//! The table is enforced twice. [`transition`] rejects requests that could never succeed before touching the store,
//! and every write is a compare-and-set on the expected prior status ([`OrderStore::update_status_if`]), which is what
//! actually serializes competing writers.
use log::*;
use thiserror::Error;

use crate::{
    db_types::{NewWalletRegistration, Order, OrderId, OrderStatusType},
    events::{EventProducers, OrderStatusChangedEvent},
    traits::{OrderStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    MakerDeposit,
    Take,
    TakerDeposit,
    Timeout,
    OwnerCancel,
}

#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("{trigger:?} is not permitted for an order in {from}")]
    NotPermitted { from: OrderStatusType, trigger: Trigger },
    #[error("No expected status was given for {0:?}")]
    NoExpectedStatus(Trigger),
    #[error("{0:?} is not a deposit")]
    NotADeposit(Trigger),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransitionError {
    /// True when the conditional write lost a race or the order was not in the expected status.
    pub fn is_condition_not_met(&self) -> bool {
        matches!(self, TransitionError::Store(StoreError::ConditionNotMet(_)))
    }
}

/// The statuses from which `trigger` may move an order.
pub fn guard_states(trigger: Trigger) -> &'static [OrderStatusType] {
    use OrderStatusType::*;
    match trigger {
        Trigger::MakerDeposit => &[WaitingDeposit],
        Trigger::Take => &[Active],
        Trigger::TakerDeposit => &[TakeInProgress],
        Trigger::Timeout => &[WaitingDeposit, TakeInProgress],
        Trigger::OwnerCancel => &[WaitingDeposit, Active, TakeInProgress],
    }
}

pub fn target_state(trigger: Trigger) -> OrderStatusType {
    match trigger {
        Trigger::MakerDeposit => OrderStatusType::Active,
        Trigger::Take => OrderStatusType::TakeInProgress,
        Trigger::TakerDeposit => OrderStatusType::Completed,
        Trigger::Timeout => OrderStatusType::TimeoutCancelled,
        Trigger::OwnerCancel => OrderStatusType::Cancelled,
    }
}

/// Looks up the transition table.
pub fn transition(from: OrderStatusType, trigger: Trigger) -> Result<OrderStatusType, TransitionError> {
    if guard_states(trigger).contains(&from) {
        Ok(target_state(trigger))
    } else {
        Err(TransitionError::NotPermitted { from, trigger })
    }
}

/// Drives orders through the transition table using the store's conditional write, and publishes an
/// [`OrderStatusChangedEvent`] for every transition that succeeds.
#[derive(Clone)]
pub struct OrderStateMachine<B> {
    db: B,
    producers: EventProducers,
}

impl<B: OrderStore> OrderStateMachine<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Applies `trigger` to the order, provided it is currently in one of `expected` (and belongs to `owner_id`, if
    /// given). Every status in `expected` must be a legal source for `trigger`.
    ///
    /// A caller that lost a race gets `TransitionError::Store(StoreError::ConditionNotMet)`.
    pub async fn apply(
        &self,
        order_id: &OrderId,
        trigger: Trigger,
        expected: &[OrderStatusType],
        owner_id: Option<&str>,
    ) -> Result<Order, TransitionError> {
        let mut new_status = None;
        for from in expected {
            new_status = Some(transition(*from, trigger)?);
        }
        let new_status = new_status.ok_or(TransitionError::NoExpectedStatus(trigger))?;
        let order = self.db.update_status_if(order_id, expected, new_status, owner_id).await?;
        info!("🔀️ Order {order_id}: {trigger:?} applied. Status is now {new_status}");
        self.notify(&order).await;
        Ok(order)
    }

    /// Applies a deposit trigger (`MakerDeposit` or `TakerDeposit`) on behalf of the `token` ledger transfer `txid`.
    /// The transfer is recorded with the status change, so it can never pay for a second order.
    pub async fn apply_deposit(
        &self,
        order_id: &OrderId,
        trigger: Trigger,
        token: &str,
        txid: &str,
    ) -> Result<Order, TransitionError> {
        let from = match trigger {
            Trigger::MakerDeposit | Trigger::TakerDeposit => guard_states(trigger)[0],
            _ => return Err(TransitionError::NotADeposit(trigger)),
        };
        let new_status = transition(from, trigger)?;
        let order = self.db.apply_deposit(order_id, from, new_status, token, txid).await?;
        info!("🔀️ Order {order_id}: {trigger:?} applied with {token} transfer {txid}. Status is now {new_status}");
        self.notify(&order).await;
        Ok(order)
    }

    /// Takes an `active` order on behalf of the taker whose wallet is given, arming the taker deposit deadline.
    pub async fn take(
        &self,
        order_id: &OrderId,
        taker: NewWalletRegistration,
        fires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Order, TransitionError> {
        transition(OrderStatusType::Active, Trigger::Take)?;
        let order = self.db.take_order(order_id, taker, fires_at).await?;
        info!("🔀️ Order {order_id} has been taken. Waiting for the taker's deposit");
        self.notify(&order).await;
        Ok(order)
    }

    async fn notify(&self, order: &Order) {
        match OrderStatusChangedEvent::from_updated_order(order.clone()) {
            Some(event) => self.producers.publish_status_changed(event).await,
            None => warn!("🔀️ Order {} was updated but has no previous status recorded", order.order_id),
        }
    }
}
