use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokenswap_engine::{
    db_types::LedgerTransfer,
    events::EventProducers,
    market::{MarketConfig, MonitoredToken},
    order_objects::OrderRequest,
    reconciler::{DepositReconciler, LedgerClient, LedgerError},
    OrderFlowApi,
    SqliteDatabase,
};

use super::prepare_env::{prepare_test_env, random_db_path};

pub const USDT_TARGET: &str = "0x00000000000000000000000000000000000000aa";
pub const XEL_TARGET: &str = "xet:target00000000000000000000000000000000000000000000000000000";

pub const MAKER_USDT_WALLET: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
pub const OTHER_USDT_WALLET: &str = "0x8617E340B3D01FA5F11F306F4090FD50E238070D";
pub const TAKER_XEL_WALLET: &str = "xet:taker000000000000000000000000000000000000000000000000000000";
pub const MAKER_XEL_WALLET: &str = "xet:maker000000000000000000000000000000000000000000000000000000";

pub const SCALE: u64 = 10_000_000;

/// Ledger units for an amount given in hundredths of a token.
pub fn units(hundredths: u128) -> u128 {
    hundredths * u128::from(SCALE) / 100
}

pub fn order_request(order_type: &str, amount: &str) -> OrderRequest {
    OrderRequest {
        order_type: order_type.into(),
        pair: "XEL/USDT".into(),
        amount: amount.into(),
        price: "1.50".into(),
        fee_payer: "split".into(),
        chain: "polygon".into(),
        network: "testnet".into(),
        visibility: "public".into(),
        referral: None,
    }
}

pub fn test_market(order_timeout: Duration) -> MarketConfig {
    MarketConfig::default()
        .with_order_timeout(order_timeout)
        .with_monitored_token(MonitoredToken::new("USDT", USDT_TARGET).with_scale(SCALE))
        .with_monitored_token(MonitoredToken::new("XEL", XEL_TARGET).with_scale(SCALE))
}

pub async fn setup_api(order_timeout: Duration) -> OrderFlowApi<SqliteDatabase> {
    setup_api_with_producers(order_timeout, EventProducers::default()).await
}

pub async fn setup_api_with_producers(
    order_timeout: Duration,
    producers: EventProducers,
) -> OrderFlowApi<SqliteDatabase> {
    let db = prepare_test_env(&random_db_path()).await;
    OrderFlowApi::new(db, Arc::new(test_market(order_timeout)), producers)
}

pub fn reconciler(
    api: &OrderFlowApi<SqliteDatabase>,
    token: &str,
    ledger: &MockLedger,
) -> DepositReconciler<SqliteDatabase, MockLedger> {
    let monitored = api.market().monitored_token(token).cloned().expect("token is not monitored");
    DepositReconciler::new(api.state_machine().clone(), ledger.clone(), monitored)
        .with_poll_interval(Duration::from_millis(20))
}

/// An in-memory ledger. Every poll returns every transfer deposited so far.
#[derive(Clone, Default)]
pub struct MockLedger {
    transfers: Arc<Mutex<Vec<LedgerTransfer>>>,
    offline: Arc<AtomicBool>,
}

impl MockLedger {
    pub fn deposit(&self, sender: &str, amount_units: u128, txid: &str) {
        self.transfers.lock().unwrap().push(LedgerTransfer::new(sender, amount_units, txid));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn list_recent_incoming_transfers(&self, _target: &str) -> Result<Vec<LedgerTransfer>, LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger is offline".into()));
        }
        Ok(self.transfers.lock().unwrap().clone())
    }
}
