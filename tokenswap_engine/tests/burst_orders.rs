use std::{collections::HashSet, sync::Arc, time::Duration};

use futures_util::future::join_all;
use log::*;
use support::{fixtures::*, prepare_env::tear_down};
use tokenswap_engine::{db_types::OrderStatusType, order_objects::OrderQueryFilter};

mod support;

const NUM_ORDERS: usize = 20;

fn maker_wallet(i: usize) -> String {
    format!("0x{i:040x}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn burst_orders() {
    let api = Arc::new(setup_api(Duration::from_secs(120)).await);
    info!("🚀️ Injecting {NUM_ORDERS} orders");
    let jobs = (0..NUM_ORDERS).map(|i| {
        let api = Arc::clone(&api);
        tokio::spawn(async move {
            let amount = format!("{}.25", 10 + i);
            api.create_order(&format!("user{}", i % 5), order_request("buy", &amount), &maker_wallet(i)).await
        })
    });
    let orders = join_all(jobs).await.into_iter().map(|r| r.unwrap().unwrap()).collect::<Vec<_>>();
    let ids = orders.iter().map(|o| o.order_id.clone()).collect::<HashSet<_>>();
    assert_eq!(ids.len(), NUM_ORDERS);
    assert_eq!(api.timeout_supervisor().pending(), NUM_ORDERS);

    // join_all keeps the input order, so orders[i] was made from maker_wallet(i)
    let usdt = MockLedger::default();
    for (i, order) in orders.iter().enumerate() {
        let hundredths = u128::try_from(order.amount.hundredths()).unwrap();
        usdt.deposit(&maker_wallet(i), units(hundredths), &format!("tx-{i}"));
    }
    let summary = reconciler(&api, "USDT", &usdt).reconcile_once().await.unwrap();
    assert_eq!(summary.seen, NUM_ORDERS);
    assert_eq!(summary.advanced, NUM_ORDERS);
    let active = api.search_orders(OrderQueryFilter::default().with_status(OrderStatusType::Active)).await.unwrap();
    assert_eq!(active.len(), NUM_ORDERS);
    info!("🚀️ test complete");
    tear_down(api.db().clone()).await;
}

