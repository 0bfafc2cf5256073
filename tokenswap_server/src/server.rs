use std::{future::Future, path::Path, pin::Pin, sync::Arc};

use futures::future::join_all;
use log::*;
use tokenswap_engine::{
    events::{EventHandlers, EventHooks, OrderStatusChangedEvent},
    reconciler::{DepositReconciler, LedgerClient},
    OrderFlowApi,
    SqliteDatabase,
};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{config::ServerConfig, errors::ServerError, ledger::HttpLedgerClient};

/// Opens the database, starts every background worker and runs until Ctrl-C is received.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = open_database(&config).await?;
    let ledger = HttpLedgerClient::new(&config.ledger_url, config.ledger_api_key.clone())?;
    let engine = start_engine(config, db, ledger).await?;
    tokio::signal::ctrl_c().await?;
    info!("🚀️ Shutdown requested");
    engine.stop().await;
    Ok(())
}

pub async fn open_database(config: &ServerConfig) -> Result<SqliteDatabase, ServerError> {
    if let Some(parent) = config.database_url.strip_prefix("sqlite://").and_then(|p| Path::new(p).parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
        info!("🚀️ Database migrations are up to date");
    }
    Ok(db)
}

/// The running engine. Dropping it leaves the workers running; call [`EngineHandle::stop`] to shut them down.
pub struct EngineHandle {
    api: OrderFlowApi<SqliteDatabase>,
    shutdown: broadcast::Sender<()>,
    workers: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn api(&self) -> &OrderFlowApi<SqliteDatabase> {
        &self.api
    }

    /// Signals every worker and pending timeout task to stop, then waits for the workers to exit.
    pub async fn stop(self) {
        if self.shutdown.send(()).is_err() {
            debug!("🚀️ No workers were listening for the shutdown signal");
        }
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                error!("🚀️ A worker did not shut down cleanly. {e}");
            }
        }
        self.api.db().close().await;
        info!("🚀️ All workers stopped. Bye!");
    }
}

/// Wires the engine together on top of an open database: re-arms persisted deadlines, then spawns the timeout sweeper
/// and one deposit reconciler per monitored token.
pub async fn start_engine<L>(config: ServerConfig, db: SqliteDatabase, ledger: L) -> Result<EngineHandle, ServerError>
where L: LedgerClient + Clone {
    let (shutdown, _) = broadcast::channel(1);
    let handlers = EventHandlers::new(128, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let market = Arc::new(config.market);
    let api = OrderFlowApi::new(db, Arc::clone(&market), producers).with_shutdown(shutdown.clone());
    let restored = api.timeout_supervisor().restore().await?;
    info!("🚀️ Restored {restored} order deadlines");

    let mut workers = Vec::with_capacity(market.monitored.len() + 1);
    let sweeper = api.timeout_supervisor().clone().with_sweep_interval(config.sweep_interval);
    workers.push(tokio::spawn(sweeper.run_sweeper(shutdown.subscribe())));
    for monitored in &market.monitored {
        let reconciler = DepositReconciler::new(api.state_machine().clone(), ledger.clone(), monitored.clone())
            .with_poll_interval(config.poll_interval);
        workers.push(tokio::spawn(reconciler.run(shutdown.subscribe())));
    }
    info!("🚀️ Engine started with {} deposit reconcilers", market.monitored.len());
    Ok(EngineHandle { api, shutdown, workers })
}

fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_status_changed(|ev: OrderStatusChangedEvent| {
        Box::pin(async move {
            info!("📢️ Order {} moved from {} to {}", ev.order.order_id, ev.old_status, ev.new_status());
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}
