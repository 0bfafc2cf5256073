use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;
use tokio::sync::broadcast;
use tsw_common::{TokenAmount, TokenAmountParseError};

use crate::{
    db_types::{
        FeePayer,
        Network,
        NewOrder,
        NewWalletRegistration,
        Order,
        OrderDeadline,
        OrderId,
        OrderStatusType,
        OrderType,
        TradingPair,
        Visibility,
        WalletRegistration,
        WalletRole,
    },
    events::EventProducers,
    market::{token_for, MarketConfig, MarketError},
    order_objects::{OrderQueryFilter, OrderRequest},
    state_machine::{guard_states, OrderStateMachine, TransitionError, Trigger},
    timeout_supervisor::TimeoutSupervisor,
    traits::{OrderStore, StoreError, WalletIndex},
    tse_api::errors::OrderFlowError,
};

const MAX_REFERRAL_LENGTH: usize = 32;
/// Attempts at allocating a fresh order id before giving up
const ID_ATTEMPTS: usize = 2;

impl From<MarketError> for OrderFlowError {
    fn from(e: MarketError) -> Self {
        OrderFlowError::Validation(e.to_string())
    }
}

impl From<TransitionError> for OrderFlowError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Store(e) => e.into(),
            e => OrderFlowError::Validation(e.to_string()),
        }
    }
}

/// `OrderFlowApi` is the entry point for the API layer: it creates, takes and cancels orders.
///
/// Every request is validated against the [`MarketConfig`] before anything is written, and every status change goes
/// through the [`OrderStateMachine`]. Deadlines for deposits are armed on the shared [`TimeoutSupervisor`].
pub struct OrderFlowApi<B> {
    state_machine: OrderStateMachine<B>,
    supervisor: TimeoutSupervisor<B>,
    market: Arc<MarketConfig>,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B>
where B: OrderStore + WalletIndex
{
    pub fn new(db: B, market: Arc<MarketConfig>, producers: EventProducers) -> Self {
        let state_machine = OrderStateMachine::new(db, producers.clone());
        let supervisor = TimeoutSupervisor::new(state_machine.clone(), market.max_pending_timeouts);
        Self { state_machine, supervisor, market, producers }
    }

    /// Ties the timeout tasks armed by this API to an application-wide shutdown signal.
    pub fn with_shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.supervisor = self.supervisor.with_shutdown(shutdown);
        self
    }

    pub fn db(&self) -> &B {
        self.state_machine.db()
    }

    pub fn market(&self) -> &MarketConfig {
        &self.market
    }

    pub fn state_machine(&self) -> &OrderStateMachine<B> {
        &self.state_machine
    }

    pub fn timeout_supervisor(&self) -> &TimeoutSupervisor<B> {
        &self.supervisor
    }

    /// Validates and stores a new order on behalf of `owner_id`, registering `maker_wallet` as the wallet the maker
    /// will deposit from.
    ///
    /// The order, the maker's registration and the deposit deadline are written as one unit. If the randomly chosen
    /// id is already taken, a new one is drawn once before the request fails with [`OrderFlowError::Conflict`].
    pub async fn create_order(
        &self,
        owner_id: &str,
        request: OrderRequest,
        maker_wallet: &str,
    ) -> Result<Order, OrderFlowError> {
        let terms = self.validate_order_request(owner_id, request)?;
        let token = token_for(&terms.pair, terms.order_type, WalletRole::Maker).to_string();
        self.market.validate_wallet_address(&token, maker_wallet)?;

        let mut attempt = 0;
        let (order, fires_at) = loop {
            attempt += 1;
            let order_id = OrderId::random();
            let new_order = terms.clone().into_new_order(order_id.clone());
            let maker = NewWalletRegistration::new(order_id, WalletRole::Maker, token.as_str(), maker_wallet);
            let fires_at = self.market.deadline_from(Utc::now());
            match self.db().insert_order(new_order, maker, fires_at).await {
                Ok(order) => break (order, fires_at),
                Err(StoreError::DuplicateOrderId(id)) if attempt < ID_ATTEMPTS => {
                    warn!("🔄️📦️ Order id {id} is already in use. Trying another one");
                },
                Err(e) => return Err(e.into()),
            }
        };
        info!("🔄️📦️ Order {} created by {owner_id}. Waiting for the maker's {token} deposit", order.order_id);
        self.supervisor.arm(OrderDeadline::new(order.order_id.clone(), OrderStatusType::WaitingDeposit, fires_at));
        self.producers.publish_order_created(&order).await;
        Ok(order)
    }

    /// Accepts an `active` order on behalf of `requester_id`. The taker will pay in the leg of the pair opposite the
    /// maker's, from `taker_wallet`.
    ///
    /// Fails with [`OrderFlowError::NotFound`] if the order does not exist or is no longer `active`.
    pub async fn take_order(
        &self,
        requester_id: &str,
        order_id: &OrderId,
        taker_wallet: &str,
    ) -> Result<Order, OrderFlowError> {
        if requester_id.trim().is_empty() {
            return Err(OrderFlowError::Validation("A requester id is required".into()));
        }
        let order = self
            .db()
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(order_id.clone()))?;
        let token = token_for(&order.pair, order.order_type, WalletRole::Taker);
        self.market.validate_wallet_address(token, taker_wallet)?;
        let taker = NewWalletRegistration::new(order_id.clone(), WalletRole::Taker, token, taker_wallet);
        let fires_at = self.market.deadline_from(Utc::now());
        let order = self.state_machine.take(order_id, taker, fires_at).await?;
        debug!("🔄️📦️ Order {order_id} taken by {requester_id}. Waiting for the taker's {token} deposit");
        self.supervisor.arm(OrderDeadline::new(order_id.clone(), OrderStatusType::TakeInProgress, fires_at));
        Ok(order)
    }

    /// Cancels an order on behalf of its owner. Only orders that have not reached a terminal status can be
    /// cancelled.
    ///
    /// Fails with [`OrderFlowError::NotFound`] if the order does not exist, is terminal, or belongs to someone else.
    pub async fn cancel_order(&self, requester_id: &str, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self
            .state_machine
            .apply(order_id, Trigger::OwnerCancel, guard_states(Trigger::OwnerCancel), Some(requester_id))
            .await?;
        info!("🔄️📦️ Order {order_id} cancelled by its owner");
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let order = self.db().fetch_order_by_order_id(order_id).await?;
        Ok(order)
    }

    pub async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        trace!("🔄️📦️ Searching orders. {filter}");
        let orders = self.db().search_orders(filter).await?;
        Ok(orders)
    }

    pub async fn wallets_for_order(&self, order_id: &OrderId) -> Result<Vec<WalletRegistration>, OrderFlowError> {
        let wallets = self.db().registrations_for_order(order_id).await?;
        Ok(wallets)
    }

    fn validate_order_request(&self, owner_id: &str, request: OrderRequest) -> Result<OrderTerms, OrderFlowError> {
        let invalid = |field: &str, value: &str| OrderFlowError::Validation(format!("the {field} '{value}' is invalid"));
        let invalid_amount = |field: &str, value: &str, e: TokenAmountParseError| {
            OrderFlowError::Validation(format!("the {field} '{value}' is invalid. {e}"))
        };
        if owner_id.trim().is_empty() {
            return Err(OrderFlowError::Validation("An owner id is required".into()));
        }
        let pair = self.market.validate_pair(&request.pair)?;
        self.market.validate_chain(&request.chain)?;
        let order_type = request.order_type.parse().map_err(|_| invalid("type", &request.order_type))?;
        let network = request.network.parse().map_err(|_| invalid("network", &request.network))?;
        let fee_payer = request.fee_payer.parse().map_err(|_| invalid("fee payer", &request.fee_payer))?;
        let visibility = request.visibility.parse().map_err(|_| invalid("visibility", &request.visibility))?;
        let price = request.price.parse::<TokenAmount>().map_err(|e| invalid_amount("price", &request.price, e))?;
        if !price.is_positive() {
            return Err(invalid("price", &request.price));
        }
        let amount =
            request.amount.parse::<TokenAmount>().map_err(|e| invalid_amount("amount", &request.amount, e))?;
        if amount < self.market.minimum_amount {
            return Err(OrderFlowError::Validation(format!(
                "the amount {amount} is below the minimum of {}",
                self.market.minimum_amount
            )));
        }
        let referral = match request.referral {
            Some(code) if code.is_empty() => None,
            Some(code) if code.len() <= MAX_REFERRAL_LENGTH && code.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Some(code)
            },
            Some(code) => return Err(invalid("referral code", &code)),
            None => None,
        };
        Ok(OrderTerms {
            owner_id: owner_id.to_string(),
            order_type,
            pair,
            amount,
            price,
            fee_payer,
            chain: request.chain,
            network,
            visibility,
            referral,
            created_at: Utc::now(),
        })
    }
}

/// A validated order request. It only becomes a [`NewOrder`] once an id has been drawn for it.
#[derive(Debug, Clone)]
struct OrderTerms {
    owner_id: String,
    order_type: OrderType,
    pair: TradingPair,
    amount: TokenAmount,
    price: TokenAmount,
    fee_payer: FeePayer,
    chain: String,
    network: Network,
    visibility: Visibility,
    referral: Option<String>,
    created_at: DateTime<Utc>,
}

impl OrderTerms {
    fn into_new_order(self, order_id: OrderId) -> NewOrder {
        NewOrder {
            order_id,
            owner_id: self.owner_id,
            order_type: self.order_type,
            pair: self.pair,
            amount: self.amount,
            price: self.price,
            fee_payer: self.fee_payer,
            chain: self.chain,
            network: self.network,
            visibility: self.visibility,
            referral: self.referral,
            created_at: self.created_at,
        }
    }
}
