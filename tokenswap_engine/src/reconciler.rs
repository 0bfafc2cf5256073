//! Deposit reconciliation.
//!
//! One [`DepositReconciler`] watches one custodial address on one token ledger. Every poll it fetches the recent
//! incoming transfers, works out which pending order each transfer pays for, and advances that order through the state
//! machine when the amount is exact.
//!
//! The ledger reports the same transfer on every poll until it ages out, so processing must be idempotent. The txid of
//! every transfer that advanced an order is recorded in the same transaction as the status change, and a transfer that
//! was already applied is ignored, even when its sender has another order waiting for the same amount.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::*;
use thiserror::Error;
use tokio::{sync::broadcast, time::MissedTickBehavior};
use tsw_common::TokenAmount;

use crate::{
    db_types::{LedgerTransfer, Order, OrderId, WalletRole},
    market::MonitoredToken,
    state_machine::{OrderStateMachine, TransitionError, Trigger},
    traits::{OrderStore, StoreError, WalletIndex},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Could not reach the ledger: {0}")]
    Unavailable(String),
    #[error("The ledger returned an unexpected response: {0}")]
    InvalidResponse(String),
}

/// Source of incoming transfer observations for one token ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    async fn list_recent_incoming_transfers(&self, target_address: &str) -> Result<Vec<LedgerTransfer>, LedgerError>;
}

#[async_trait]
impl<L: LedgerClient + ?Sized> LedgerClient for Arc<L> {
    async fn list_recent_incoming_transfers(&self, target_address: &str) -> Result<Vec<LedgerTransfer>, LedgerError> {
        (**self).list_recent_incoming_transfers(target_address).await
    }
}

/// Why a transfer did not advance an order. None of these are surfaced to users; they are logged and the transfer is
/// dropped.
#[derive(Debug, Clone, Error)]
pub enum ObservationRejected {
    #[error("No order is waiting for a {token} deposit from {sender}")]
    NoPendingOrder { sender: String, token: String },
    #[error("Transfer {txid} of {units} ledger units does not match the amount of order {order_id} ({expected})")]
    WrongAmount { txid: String, order_id: OrderId, expected: TokenAmount, units: u128 },
    #[error("Transfer {txid} was already applied to order {order_id}")]
    AlreadyApplied { txid: String, order_id: OrderId },
    #[error("Order {0} changed status before the deposit could be applied")]
    OrderMoved(OrderId),
    #[error("Could not apply the deposit: {0}")]
    Store(String),
}

impl From<StoreError> for ObservationRejected {
    fn from(e: StoreError) -> Self {
        ObservationRejected::Store(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Transfers reported by the ledger
    pub seen: usize,
    /// Orders that moved forward
    pub advanced: usize,
    /// Transfers that resolved to an order but could not be applied
    pub rejected: usize,
    /// Transfers that do not belong to any pending order (including repeats of already applied transfers)
    pub ignored: usize,
}

pub struct DepositReconciler<B, L> {
    state_machine: OrderStateMachine<B>,
    ledger: L,
    monitored: MonitoredToken,
    poll_interval: Duration,
}

impl<B, L> DepositReconciler<B, L>
where
    B: OrderStore + WalletIndex,
    L: LedgerClient,
{
    pub fn new(state_machine: OrderStateMachine<B>, ledger: L, monitored: MonitoredToken) -> Self {
        Self { state_machine, ledger, monitored, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn token(&self) -> &str {
        self.monitored.token.as_str()
    }

    /// Polls the ledger once and processes every reported transfer.
    pub async fn reconcile_once(&self) -> Result<ReconcileSummary, LedgerError> {
        let transfers = self.ledger.list_recent_incoming_transfers(&self.monitored.target_address).await?;
        let mut summary = ReconcileSummary { seen: transfers.len(), ..Default::default() };
        for transfer in &transfers {
            match self.process_transfer(transfer).await {
                Ok(order) => {
                    info!(
                        "💰️ {} deposit {} from {} applied. Order {} is now {}",
                        self.token(),
                        transfer.txid,
                        transfer.sender,
                        order.order_id,
                        order.status
                    );
                    summary.advanced += 1;
                },
                Err(e @ ObservationRejected::AlreadyApplied { .. }) => {
                    trace!("💰️ {e}");
                    summary.ignored += 1;
                },
                Err(e @ ObservationRejected::NoPendingOrder { .. }) => {
                    trace!("💰️ Transfer {} ignored. {e}", transfer.txid);
                    summary.ignored += 1;
                },
                Err(e @ ObservationRejected::OrderMoved(_)) => {
                    debug!("💰️ Transfer {} dropped. {e}", transfer.txid);
                    summary.rejected += 1;
                },
                Err(e @ ObservationRejected::WrongAmount { .. }) => {
                    warn!("💰️ Transfer rejected. {e}");
                    summary.rejected += 1;
                },
                Err(e @ ObservationRejected::Store(_)) => {
                    error!("💰️ Transfer {} could not be processed. {e}", transfer.txid);
                    summary.rejected += 1;
                },
            }
        }
        Ok(summary)
    }

    /// Resolves a single transfer to a pending order and, if the amount is exact, advances it.
    ///
    /// Registrations of the sender for this token are tried in the order they were made. The first one whose order is
    /// waiting for that participant's deposit (`waiting_deposit` for a maker, `take_in_progress` for a taker) wins.
    pub async fn process_transfer(&self, transfer: &LedgerTransfer) -> Result<Order, ObservationRejected> {
        let db = self.state_machine.db();
        if let Some(order_id) = db.fetch_applied_transfer(self.token(), &transfer.txid).await? {
            return Err(ObservationRejected::AlreadyApplied { txid: transfer.txid.clone(), order_id });
        }
        let registrations = db.registrations_for_address(&transfer.sender, self.token()).await?;
        let mut resolved = None;
        for registration in registrations {
            let expected = registration.role.awaited_status();
            match db.fetch_order_by_order_id(&registration.order_id).await? {
                Some(order) if order.status == expected => {
                    resolved = Some((registration.role, order));
                    break;
                },
                _ => continue,
            }
        }
        let (role, order) = resolved.ok_or_else(|| ObservationRejected::NoPendingOrder {
            sender: transfer.sender.clone(),
            token: self.monitored.token.clone(),
        })?;

        if !order.amount.matches_ledger_units(transfer.amount_units, self.monitored.scale) {
            return Err(ObservationRejected::WrongAmount {
                txid: transfer.txid.clone(),
                order_id: order.order_id,
                expected: order.amount,
                units: transfer.amount_units,
            });
        }

        let trigger = match role {
            WalletRole::Maker => Trigger::MakerDeposit,
            WalletRole::Taker => Trigger::TakerDeposit,
        };
        let result = self.state_machine.apply_deposit(&order.order_id, trigger, self.token(), &transfer.txid).await;
        match result {
            Ok(order) => Ok(order),
            Err(e) if e.is_condition_not_met() => Err(ObservationRejected::OrderMoved(order.order_id)),
            Err(TransitionError::Store(StoreError::TransferAlreadyApplied { txid, .. })) => {
                let order_id = db.fetch_applied_transfer(self.token(), &txid).await?.unwrap_or(order.order_id);
                Err(ObservationRejected::AlreadyApplied { txid, order_id })
            },
            Err(TransitionError::Store(e)) => Err(e.into()),
            Err(e) => Err(ObservationRejected::Store(e.to_string())),
        }
    }

    /// Polls the ledger every `poll_interval` until the shutdown signal arrives. Ledger failures skip the cycle.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("💰️ {} deposit reconciler started for {}", self.token(), self.monitored.target_address);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("💰️ {} deposit reconciler shutting down", self.token());
                    break;
                }
                _ = ticker.tick() => {
                    match self.reconcile_once().await {
                        Ok(summary) if summary.advanced > 0 || summary.rejected > 0 => {
                            debug!("💰️ {} reconciliation: {summary:?}", self.token());
                        },
                        Ok(_) => trace!("💰️ {} reconciliation: nothing to do", self.token()),
                        Err(e) => warn!("💰️ {} ledger poll failed. Skipping this cycle. {e}", self.token()),
                    }
                }
            }
        }
    }
}
