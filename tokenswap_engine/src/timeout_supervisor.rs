//! Order timeouts.
//!
//! Every time an order enters a status that waits on a deposit (`waiting_deposit` at creation, `take_in_progress` at
//! take), the store records an [`OrderDeadline`] in the same transaction. The supervisor turns deadlines into
//! conditional writes to `timeout_cancelled`, guarded by the exact status the deadline was tagged with. If the order
//! has moved on in the meantime, the write matches nothing and the deadline is simply discarded.
//!
//! Deadlines reach the supervisor in three ways:
//! * [`TimeoutSupervisor::arm`] spawns a task that sleeps until the deadline. The number of sleeping tasks is capped;
//!   deadlines beyond the cap are not lost, because they are still in the store.
//! * [`TimeoutSupervisor::restore`] arms every stored deadline after a restart.
//! * [`TimeoutSupervisor::sweep`] fires everything that is overdue, and [`TimeoutSupervisor::run_sweeper`] does so
//!   periodically.
use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::*;
use tokio::{
    sync::{broadcast, Semaphore},
    time::MissedTickBehavior,
};

use crate::{
    db_types::{OrderDeadline, OrderId, OrderStatusType},
    state_machine::{OrderStateMachine, TransitionError, Trigger},
    traits::{OrderStore, StoreError},
};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The order was still in the tagged status and is now `timeout_cancelled`.
    Cancelled,
    /// The order had already left the tagged status. Nothing was written.
    Superseded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub cancelled: usize,
    pub superseded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct TimeoutSupervisor<B> {
    state_machine: OrderStateMachine<B>,
    permits: Arc<Semaphore>,
    capacity: usize,
    shutdown: broadcast::Sender<()>,
    sweep_interval: Duration,
}

impl<B: OrderStore> TimeoutSupervisor<B> {
    pub fn new(state_machine: OrderStateMachine<B>, max_pending: usize) -> Self {
        let capacity = max_pending.min(Semaphore::MAX_PERMITS);
        let (shutdown, _) = broadcast::channel(1);
        Self {
            state_machine,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            shutdown,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Listens on an existing shutdown channel instead of a private one.
    pub fn with_shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// The number of armed deadlines that have not fired yet.
    pub fn pending(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Spawns a task that fires the deadline when it is due, unless the supervisor is shut down first.
    ///
    /// Returns `false` without spawning anything when the task cap has been reached. The deadline is then handled by
    /// the next sweep.
    pub fn arm(&self, deadline: OrderDeadline) -> bool {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(
                    "⏰️ {} deadlines already armed. The deadline for order {} is left to the sweeper",
                    self.capacity, deadline.order_id
                );
                return false;
            },
        };
        let mut shutdown = self.shutdown.subscribe();
        let supervisor = self.clone();
        let delay = (deadline.fires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        trace!("⏰️ Deadline for order {} ({}) armed. Fires in {delay:?}", deadline.order_id, deadline.status);
        tokio::spawn(async move {
            let _permit = permit;
            tokio::select! {
                _ = shutdown.recv() => {
                    trace!("⏰️ Deadline for order {} abandoned on shutdown", deadline.order_id);
                }
                _ = tokio::time::sleep(delay) => {
                    let _ = supervisor.fire(&deadline.order_id, deadline.status).await;
                }
            }
        });
        true
    }

    /// Issues the single conditional write for a deadline: `status -> timeout_cancelled`, only if the order is still
    /// in `status`.
    pub async fn fire(&self, order_id: &OrderId, status: OrderStatusType) -> Result<FireOutcome, TransitionError> {
        let result = self.state_machine.apply(order_id, Trigger::Timeout, &[status], None).await;
        match result {
            Ok(_) => {
                info!("⏰️ Order {order_id} timed out while in {status}");
                Ok(FireOutcome::Cancelled)
            },
            Err(e) if e.is_condition_not_met() => {
                debug!("⏰️ Order {order_id} is no longer {status}. Timeout discarded");
                self.discard(order_id, status).await;
                Ok(FireOutcome::Superseded)
            },
            Err(TransitionError::NotPermitted { .. }) => {
                warn!("⏰️ A deadline tagged {status} can never fire for order {order_id}. Discarding it");
                self.discard(order_id, status).await;
                Ok(FireOutcome::Superseded)
            },
            Err(e) => {
                error!("⏰️ Could not time out order {order_id}. {e}");
                Err(e)
            },
        }
    }

    /// Arms every deadline in the store. Returns the number of tasks spawned.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let deadlines = self.state_machine.db().fetch_deadlines(None).await?;
        let total = deadlines.len();
        let armed = deadlines.into_iter().filter(|d| self.arm(d.clone())).count();
        info!("⏰️ Restored {armed} of {total} stored deadlines");
        Ok(armed)
    }

    /// Fires every deadline that is due now.
    pub async fn sweep(&self) -> Result<SweepSummary, StoreError> {
        let due = self.state_machine.db().fetch_deadlines(Some(Utc::now())).await?;
        let mut summary = SweepSummary::default();
        for deadline in due {
            match self.fire(&deadline.order_id, deadline.status).await {
                Ok(FireOutcome::Cancelled) => summary.cancelled += 1,
                Ok(FireOutcome::Superseded) => summary.superseded += 1,
                Err(_) => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// A receiver for this supervisor's shutdown signal. Take it before spawning a task that listens for shutdown, so
    /// that a signal sent before the task first runs is not missed.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Runs [`Self::sweep`] every `sweep_interval` until `shutdown` fires.
    pub async fn run_sweeper(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("⏰️ Timeout sweeper started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("⏰️ Timeout sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(summary) if summary != SweepSummary::default() => {
                            info!("⏰️ Sweep complete: {summary:?}");
                        },
                        Ok(_) => trace!("⏰️ Sweep complete. Nothing was due"),
                        Err(e) => error!("⏰️ Could not load deadlines for the sweep. {e}"),
                    }
                }
            }
        }
    }

    /// Tells every armed task and the sweeper to stop. Tasks exit without writing anything.
    pub fn shutdown(&self) {
        if self.shutdown.send(()).is_err() {
            trace!("⏰️ Shutdown requested, but nothing was listening");
        }
    }

    async fn discard(&self, order_id: &OrderId, status: OrderStatusType) {
        if let Err(e) = self.state_machine.db().remove_deadline(order_id, status).await {
            warn!("⏰️ Could not remove the {status} deadline for order {order_id}. {e}");
        }
    }
}
