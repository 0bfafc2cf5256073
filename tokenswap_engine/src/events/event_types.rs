use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType};

/// Emitted once a new order and its maker registration have been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted after every successful conditional write. `order` holds the stored record after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub old_status: OrderStatusType,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, old_status: OrderStatusType) -> Self {
        Self { order, old_status }
    }

    /// Builds the event from an order returned by a conditional write. Orders that have never changed status yield
    /// `None`.
    pub fn from_updated_order(order: Order) -> Option<Self> {
        order.previous_status.map(|old_status| Self { order, old_status })
    }

    pub fn new_status(&self) -> OrderStatusType {
        self.order.status
    }
}
