use std::time::Duration;

use chrono::Utc;
use support::{fixtures::*, prepare_env::tear_down};
use tokenswap_engine::{
    db_types::{OrderDeadline, OrderStatusType},
    db::deadlines::upsert_deadline,
    events::EventProducers,
    state_machine::OrderStateMachine,
    timeout_supervisor::{SweepSummary, TimeoutSupervisor},
    traits::OrderStore,
    OrderFlowApi,
};
use tokio::sync::broadcast;

mod support;

const SHORT: Duration = Duration::from_millis(200);

async fn wait_for_status(
    api: &OrderFlowApi<tokenswap_engine::SqliteDatabase>,
    order_id: &tokenswap_engine::db_types::OrderId,
    status: OrderStatusType,
) -> bool {
    for _ in 0..50 {
        let order = api.fetch_order(order_id).await.unwrap().unwrap();
        if order.status == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn unpaid_orders_time_out() {
    let api = setup_api(SHORT).await;
    let order = api.create_order("user1", order_request("buy", "25.00"), MAKER_USDT_WALLET).await.unwrap();
    assert_eq!(api.timeout_supervisor().pending(), 1);
    assert!(wait_for_status(&api, &order.order_id, OrderStatusType::TimeoutCancelled).await);
    for _ in 0..20 {
        if api.timeout_supervisor().pending() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(api.timeout_supervisor().pending(), 0);
    assert!(api.db().fetch_deadlines(None).await.unwrap().is_empty());
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn taken_orders_time_out_without_the_taker_deposit() {
    let api = setup_api(SHORT).await;
    let usdt = MockLedger::default();
    let order = api.create_order("user1", order_request("buy", "25.00"), MAKER_USDT_WALLET).await.unwrap();
    usdt.deposit(MAKER_USDT_WALLET, units(2500), "tx-maker");
    reconciler(&api, "USDT", &usdt).reconcile_once().await.unwrap();
    api.take_order("user2", &order.order_id, TAKER_XEL_WALLET).await.unwrap();

    assert!(wait_for_status(&api, &order.order_id, OrderStatusType::TimeoutCancelled).await);
    let stored = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.previous_status, Some(OrderStatusType::TakeInProgress));
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn active_orders_do_not_time_out() {
    let api = setup_api(SHORT).await;
    let usdt = MockLedger::default();
    let order = api.create_order("user1", order_request("buy", "25.00"), MAKER_USDT_WALLET).await.unwrap();
    usdt.deposit(MAKER_USDT_WALLET, units(2500), "tx-maker");
    reconciler(&api, "USDT", &usdt).reconcile_once().await.unwrap();

    tokio::time::sleep(SHORT * 3).await;
    let stored = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Active);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn deadlines_survive_a_restart() {
    let api = setup_api(Duration::from_secs(120)).await;
    let order = api.create_order("user1", order_request("buy", "25.00"), MAKER_USDT_WALLET).await.unwrap();
    let deadlines = api.db().fetch_deadlines(None).await.unwrap();
    assert_eq!(deadlines.len(), 1);
    assert_eq!(deadlines[0].order_id, order.order_id);
    assert_eq!(deadlines[0].status, OrderStatusType::WaitingDeposit);
    // Simulate a process that went down before the deadline and came back after it
    api.timeout_supervisor().shutdown();
    let db = api.db().clone();
    let overdue = OrderDeadline::new(order.order_id.clone(), OrderStatusType::WaitingDeposit, Utc::now());
    let mut conn = db.pool().acquire().await.unwrap();
    upsert_deadline(&overdue, &mut conn).await.unwrap();
    drop(conn);

    let restarted = TimeoutSupervisor::new(OrderStateMachine::new(db.clone(), EventProducers::default()), 100);
    assert_eq!(restarted.restore().await.unwrap(), 1);
    assert!(wait_for_status(&api, &order.order_id, OrderStatusType::TimeoutCancelled).await);
    tear_down(db).await;
}

#[tokio::test]
async fn sweep_fires_overdue_deadlines() {
    let api = setup_api(Duration::from_secs(120)).await;
    let usdt = MockLedger::default();
    let unpaid = api.create_order("user1", order_request("buy", "25.00"), MAKER_USDT_WALLET).await.unwrap();
    let paid = api.create_order("user2", order_request("buy", "30.00"), OTHER_USDT_WALLET).await.unwrap();
    usdt.deposit(OTHER_USDT_WALLET, units(3000), "tx-paid");
    reconciler(&api, "USDT", &usdt).reconcile_once().await.unwrap();

    let supervisor = api.timeout_supervisor();
    // Nothing is due yet
    assert_eq!(supervisor.sweep().await.unwrap(), SweepSummary::default());
    let due = api.db().fetch_deadlines(Some(Utc::now() + chrono::Duration::seconds(300))).await.unwrap();
    assert_eq!(due.len(), 1, "the paid order's deadline was discarded when it became active");
    assert_eq!(due[0].order_id, unpaid.order_id);

    // Both deadlines become overdue
    let mut conn = api.db().pool().acquire().await.unwrap();
    for order_id in [&unpaid.order_id, &paid.order_id] {
        let fires_at = Utc::now() - chrono::Duration::seconds(1);
        let overdue = OrderDeadline::new(order_id.clone(), OrderStatusType::WaitingDeposit, fires_at);
        upsert_deadline(&overdue, &mut conn).await.unwrap();
    }
    drop(conn);
    let summary = supervisor.sweep().await.unwrap();
    assert_eq!(summary, SweepSummary { cancelled: 1, superseded: 1, failed: 0 });
    assert_eq!(api.fetch_order(&unpaid.order_id).await.unwrap().unwrap().status, OrderStatusType::TimeoutCancelled);
    assert_eq!(api.fetch_order(&paid.order_id).await.unwrap().unwrap().status, OrderStatusType::Active);
    assert!(api.db().fetch_deadlines(None).await.unwrap().is_empty());
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn capped_deadlines_are_left_to_the_sweeper() {
    let api = setup_api(Duration::from_secs(120)).await;
    let supervisor = TimeoutSupervisor::new(api.state_machine().clone(), 1);
    let a = api.create_order("user1", order_request("buy", "25.00"), MAKER_USDT_WALLET).await.unwrap();
    let b = api.create_order("user1", order_request("buy", "25.00"), OTHER_USDT_WALLET).await.unwrap();
    let later = Utc::now() + chrono::Duration::seconds(60);
    assert!(supervisor.arm(OrderDeadline::new(a.order_id.clone(), OrderStatusType::WaitingDeposit, later)));
    assert!(!supervisor.arm(OrderDeadline::new(b.order_id.clone(), OrderStatusType::WaitingDeposit, later)));
    assert_eq!(supervisor.pending(), 1);
    supervisor.shutdown();
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn shutdown_stops_armed_deadlines_and_the_sweeper() {
    let api = setup_api(Duration::from_secs(120)).await;
    let (shutdown, _) = broadcast::channel(4);
    let supervisor = TimeoutSupervisor::new(api.state_machine().clone(), 10)
        .with_shutdown(shutdown.clone())
        .with_sweep_interval(Duration::from_millis(20));
    let order = api.create_order("user1", order_request("buy", "25.00"), MAKER_USDT_WALLET).await.unwrap();
    let soon = Utc::now() + chrono::Duration::milliseconds(300);
    assert!(supervisor.arm(OrderDeadline::new(order.order_id.clone(), OrderStatusType::WaitingDeposit, soon)));
    let sweeper = tokio::spawn(supervisor.clone().run_sweeper(supervisor.subscribe_shutdown()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), sweeper).await.expect("sweeper did not stop").unwrap();
    // Give the armed task time to exit
    for _ in 0..20 {
        if supervisor.pending() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(supervisor.pending(), 0);
    tokio::time::sleep(Duration::from_millis(400)).await;
    // The order is still waiting. Its deadline remains in the store for the next start-up
    let stored = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::WaitingDeposit);
    assert_eq!(api.db().fetch_deadlines(None).await.unwrap().len(), 1);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn sweeper_sees_a_shutdown_sent_before_it_first_runs() {
    let api = setup_api(Duration::from_secs(120)).await;
    let (shutdown, _) = broadcast::channel(4);
    let supervisor = TimeoutSupervisor::new(api.state_machine().clone(), 10).with_shutdown(shutdown.clone());
    let receiver = supervisor.subscribe_shutdown();
    // Sent before the sweeper task has been polled even once
    shutdown.send(()).unwrap();
    let sweeper = tokio::spawn(supervisor.clone().run_sweeper(receiver));
    tokio::time::timeout(Duration::from_secs(2), sweeper).await.expect("sweeper did not stop").unwrap();
    tear_down(api.db().clone()).await;
}
