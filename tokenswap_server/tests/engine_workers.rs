use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokenswap_engine::{
    db_types::{LedgerTransfer, Order, OrderId, OrderStatusType},
    market::{MarketConfig, MonitoredToken},
    order_objects::OrderRequest,
    reconciler::{LedgerClient, LedgerError},
    traits::OrderStore,
    OrderFlowApi,
    SqliteDatabase,
};
use tokenswap_server::{
    config::ServerConfig,
    server::{open_database, start_engine},
};

const USDT_TARGET: &str = "0x00000000000000000000000000000000000000aa";
const XEL_TARGET: &str = "xet:target00000000000000000000000000000000000000000000000000000";
const MAKER_USDT_WALLET: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
const SCALE: u64 = 1_000_000;

/// Incoming transfers per target address
#[derive(Clone, Default)]
struct MockLedger {
    transfers: Arc<Mutex<HashMap<String, Vec<LedgerTransfer>>>>,
}

impl MockLedger {
    fn deposit(&self, target: &str, sender: &str, amount_units: u128, txid: &str) {
        let mut transfers = self.transfers.lock().unwrap();
        transfers.entry(target.to_string()).or_default().push(LedgerTransfer::new(sender, amount_units, txid));
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn list_recent_incoming_transfers(&self, target: &str) -> Result<Vec<LedgerTransfer>, LedgerError> {
        Ok(self.transfers.lock().unwrap().get(target).cloned().unwrap_or_default())
    }
}

fn test_config(order_timeout: Duration) -> ServerConfig {
    let _ = env_logger::try_init();
    let path = std::env::temp_dir().join(format!(
        "tsw_server_test_{}_{}.db",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let market = MarketConfig::default()
        .with_order_timeout(order_timeout)
        .with_monitored_token(MonitoredToken::new("USDT", USDT_TARGET).with_scale(SCALE))
        .with_monitored_token(MonitoredToken::new("XEL", XEL_TARGET).with_scale(SCALE));
    ServerConfig {
        database_url: format!("sqlite://{}", path.display()),
        max_connections: 5,
        poll_interval: Duration::from_millis(50),
        sweep_interval: Duration::from_millis(200),
        market,
        ..Default::default()
    }
}

fn buy_request() -> OrderRequest {
    OrderRequest {
        order_type: "buy".into(),
        pair: "XEL/USDT".into(),
        amount: "25.00".into(),
        price: "1.50".into(),
        fee_payer: "split".into(),
        chain: "polygon".into(),
        network: "testnet".into(),
        visibility: "public".into(),
        referral: None,
    }
}

async fn wait_for_status(api: &OrderFlowApi<SqliteDatabase>, order_id: &OrderId, status: OrderStatusType) -> Order {
    for _ in 0..100 {
        let order = api.fetch_order(order_id).await.unwrap().unwrap();
        if order.status == status {
            return order;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Order {order_id} never reached {status}");
}

#[tokio::test]
async fn reconcilers_pick_up_deposits() {
    let config = test_config(Duration::from_secs(120));
    let db = open_database(&config).await.unwrap();
    let ledger = MockLedger::default();
    let engine = start_engine(config, db, ledger.clone()).await.unwrap();

    let order = engine.api().create_order("alice", buy_request(), MAKER_USDT_WALLET).await.unwrap();
    assert_eq!(order.status, OrderStatusType::WaitingDeposit);
    // Same sender, wrong ledger
    ledger.deposit(XEL_TARGET, MAKER_USDT_WALLET, 25 * u128::from(SCALE), "tx-wrong-ledger");
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stored = engine.api().fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::WaitingDeposit);

    ledger.deposit(USDT_TARGET, MAKER_USDT_WALLET, 25 * u128::from(SCALE), "tx-maker");
    let active = wait_for_status(engine.api(), &order.order_id, OrderStatusType::Active).await;
    assert_eq!(active.previous_status, Some(OrderStatusType::WaitingDeposit));
    engine.stop().await;
}

#[tokio::test]
async fn deadlines_survive_a_restart() {
    let config = test_config(Duration::from_secs(1));
    let db = open_database(&config).await.unwrap();
    let engine = start_engine(config.clone(), db, MockLedger::default()).await.unwrap();
    let order = engine.api().create_order("alice", buy_request(), MAKER_USDT_WALLET).await.unwrap();
    engine.stop().await;

    // The timeout task was stopped before it fired
    let db = open_database(&config).await.unwrap();
    let engine = start_engine(config, db, MockLedger::default()).await.unwrap();
    let cancelled = wait_for_status(engine.api(), &order.order_id, OrderStatusType::TimeoutCancelled).await;
    assert_eq!(cancelled.previous_status, Some(OrderStatusType::WaitingDeposit));
    engine.stop().await;
}

#[tokio::test]
async fn engine_stops_right_after_starting() {
    let config = test_config(Duration::from_secs(120));
    let db = open_database(&config).await.unwrap();
    let engine = start_engine(config, db, MockLedger::default()).await.unwrap();
    // None of the workers has been polled yet
    tokio::time::timeout(Duration::from_secs(5), engine.stop()).await.expect("engine did not stop");
}

#[tokio::test]
async fn engine_stops_with_pending_orders() {
    let config = test_config(Duration::from_secs(120));
    let db = open_database(&config).await.unwrap();
    let engine = start_engine(config.clone(), db, MockLedger::default()).await.unwrap();
    let order = engine.api().create_order("alice", buy_request(), MAKER_USDT_WALLET).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), engine.stop()).await.expect("engine did not stop");

    let db = open_database(&config).await.unwrap();
    let stored = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::WaitingDeposit);
    assert_eq!(db.fetch_deadlines(None).await.unwrap().len(), 1);
    db.close().await;
}
