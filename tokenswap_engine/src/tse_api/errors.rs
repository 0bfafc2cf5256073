use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{db_types::OrderId, traits::StoreError};

/// Errors returned to the API layer by [`crate::OrderFlowApi`]. Raw storage errors never cross this boundary.
#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    /// Malformed or out-of-vocabulary input. Never retried.
    #[error("Invalid request: {0}")]
    Validation(String),
    /// The order does not exist, or is not in a state (or not owned by the caller) that allows the request.
    #[error("Order {0} is not available")]
    NotFound(OrderId),
    #[error("Could not allocate an order id: {0}")]
    Conflict(String),
    #[error("The order store is unavailable: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
}

impl OrderFlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderFlowError::Validation(_) => ErrorKind::Validation,
            OrderFlowError::NotFound(_) => ErrorKind::NotFound,
            OrderFlowError::Conflict(_) => ErrorKind::Conflict,
            OrderFlowError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StoreError> for OrderFlowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConditionNotMet(id) => OrderFlowError::NotFound(id),
            StoreError::DuplicateOrderId(id) => OrderFlowError::Conflict(format!("order id {id} is already in use")),
            // Only reachable if a take slipped past the status guard
            StoreError::DuplicateRegistration { order_id, .. } => OrderFlowError::NotFound(order_id),
            StoreError::DatabaseError(msg) => OrderFlowError::Storage(msg),
            // Deposits are applied by the reconciler, never through the facade
            e @ StoreError::TransferAlreadyApplied { .. } => OrderFlowError::Storage(e.to_string()),
        }
    }
}
