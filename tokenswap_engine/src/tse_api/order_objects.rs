use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Network, OrderId, OrderStatusType, OrderType, TradingPair, Visibility},
    tse_api::errors::{ErrorKind, OrderFlowError},
};

/// The raw fields of a create-order request, as received by the API layer. Nothing in here has been validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_type: String,
    pub pair: String,
    /// Decimal string with at most two fractional digits
    pub amount: String,
    /// Decimal string with at most two fractional digits
    pub price: String,
    pub fee_payer: String,
    pub chain: String,
    pub network: String,
    pub visibility: String,
    #[serde(default)]
    pub referral: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub owner_id: Option<String>,
    pub order_type: Option<OrderType>,
    pub pair: Option<TradingPair>,
    pub chain: Option<String>,
    pub network: Option<Network>,
    pub visibility: Option<Visibility>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_owner_id<S: Into<String>>(mut self, owner_id: S) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    pub fn with_pair(mut self, pair: TradingPair) -> Self {
        self.pair = Some(pair);
        self
    }

    pub fn with_chain<S: Into<String>>(mut self, chain: S) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Adds `status` to the set of acceptable statuses. Calling this repeatedly ORs the statuses together.
    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since<T>(mut self, since: T) -> Result<Self, OrderFlowError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = since.try_into().map_err(|e| OrderFlowError::Validation(e.to_string()))?;
        self.since = Some(dt);
        Ok(self)
    }

    pub fn until<T>(mut self, until: T) -> Result<Self, OrderFlowError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = until.try_into().map_err(|e| OrderFlowError::Validation(e.to_string()))?;
        self.until = Some(dt);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.owner_id.is_none() &&
            self.order_type.is_none() &&
            self.pair.is_none() &&
            self.chain.is_none() &&
            self.network.is_none() &&
            self.visibility.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        if let Some(owner_id) = &self.owner_id {
            write!(f, "owner_id: {owner_id}. ")?;
        }
        if let Some(order_type) = &self.order_type {
            write!(f, "type: {order_type}. ")?;
        }
        if let Some(pair) = &self.pair {
            write!(f, "pair: {pair}. ")?;
        }
        if let Some(chain) = &self.chain {
            write!(f, "chain: {chain}. ")?;
        }
        if let Some(network) = &self.network {
            write!(f, "network: {network}. ")?;
        }
        if let Some(visibility) = &self.visibility {
            write!(f, "visibility: {visibility}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}

/// The tagged envelope handed to the API layer: either the payload, or a typed error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApiResponse<T> {
    Success { data: T },
    Error { kind: ErrorKind, message: String },
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    pub fn data(self) -> Option<T> {
        match self {
            ApiResponse::Success { data } => Some(data),
            ApiResponse::Error { .. } => None,
        }
    }
}

impl<T> From<Result<T, OrderFlowError>> for ApiResponse<T> {
    fn from(result: Result<T, OrderFlowError>) -> Self {
        match result {
            Ok(data) => ApiResponse::Success { data },
            Err(e) => ApiResponse::Error { kind: e.kind(), message: e.to_string() },
        }
    }
}
