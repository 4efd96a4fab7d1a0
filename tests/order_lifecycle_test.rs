mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use stockroom_api::entities::order::OrderStatus;
use stockroom_api::entities::stock_record;
use stockroom_api::entities::stock_transaction::{StockTransactionReason, TransactionType};
use stockroom_api::errors::ServiceError;
use stockroom_api::queries::ledger_queries::LedgerByReferenceQuery;
use stockroom_api::queries::stock_queries::GetStockRecordQuery;
use stockroom_api::queries::Query;
use stockroom_api::services::orders::{NewOrder, NewOrderLine};
use uuid::Uuid;

fn order_of(record: &stock_record::Model, quantity: i32) -> NewOrder {
    NewOrder {
        order_number: format!("SO-{}", Uuid::new_v4().simple()),
        customer_id: Uuid::new_v4(),
        lines: vec![NewOrderLine {
            stock_record_id: record.id,
            sku: record.sku.clone(),
            quantity,
            unit_price: record.final_price,
        }],
    }
}

async fn fetch(app: &TestApp, id: Uuid) -> stock_record::Model {
    GetStockRecordQuery {
        stock_record_id: id,
    }
    .execute(&app.state.db)
    .await
    .unwrap()
}

#[tokio::test]
async fn happy_path_commits_stock_at_shipper_assignment() {
    let app = TestApp::new().await;
    let record = app.seed_stock("SHO-BLK-42", 10, dec!(100)).await;

    let order = app
        .state
        .orders
        .create_order(order_of(&record, 3))
        .await
        .unwrap();
    assert_eq!(order.status(), Some(OrderStatus::Pending));
    assert_eq!(order.total_amount, dec!(600));

    let held = fetch(&app, record.id).await;
    assert_eq!(held.quantity, 10);
    assert_eq!(held.reserved_quantity, 3);

    app.state.orders.confirm(order.id).await.unwrap();
    // No physical deduction yet.
    assert_eq!(fetch(&app, record.id).await.quantity, 10);

    app.state
        .orders
        .assign_to_shipper(order.id, None)
        .await
        .unwrap();
    let committed = fetch(&app, record.id).await;
    assert_eq!(committed.quantity, 7);
    assert_eq!(committed.reserved_quantity, 0);

    let ledger = LedgerByReferenceQuery {
        reference_id: order.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].tx_type(), Some(TransactionType::Out));
    assert_eq!(ledger[0].reason(), Some(StockTransactionReason::Sale));
    assert_eq!(ledger[0].quantity_change, -3);
    assert_eq!(ledger[0].quantity_after, 7);

    app.state
        .orders
        .mark_out_for_delivery(order.id)
        .await
        .unwrap();
    app.state.orders.mark_delivered(order.id).await.unwrap();
    let done = app.state.orders.complete(order.id).await.unwrap();
    assert_eq!(done.status(), Some(OrderStatus::Completed));
}

#[tokio::test]
async fn delivery_failure_returns_items_to_saleable_stock() {
    let app = TestApp::new().await;
    let record = app.seed_stock("SHO-BRN-43", 10, dec!(100)).await;

    let order = app
        .state
        .orders
        .create_order(order_of(&record, 4))
        .await
        .unwrap();
    app.state.orders.confirm(order.id).await.unwrap();
    app.state
        .orders
        .assign_to_shipper(order.id, None)
        .await
        .unwrap();
    app.state
        .orders
        .mark_out_for_delivery(order.id)
        .await
        .unwrap();
    assert_eq!(fetch(&app, record.id).await.quantity, 6);

    app.state
        .orders
        .mark_delivery_failed(order.id, None)
        .await
        .unwrap();
    let restocked = fetch(&app, record.id).await;
    assert_eq!(restocked.quantity, 10);
    assert_eq!(restocked.reserved_quantity, 0);

    let ledger = LedgerByReferenceQuery {
        reference_id: order.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    let reasons: Vec<_> = ledger.iter().filter_map(|t| t.reason()).collect();
    assert!(reasons.contains(&StockTransactionReason::Sale));
    assert!(reasons.contains(&StockTransactionReason::DeliveryFailed));

    let back = app
        .state
        .orders
        .mark_returning_to_warehouse(order.id)
        .await
        .unwrap();
    assert_eq!(back.status(), Some(OrderStatus::ReturningToWarehouse));
}

#[tokio::test]
async fn cancellation_before_commit_releases_the_hold() {
    let app = TestApp::new().await;
    let record = app.seed_stock("SHO-WHT-41", 10, dec!(100)).await;

    let order = app
        .state
        .orders
        .create_order(order_of(&record, 5))
        .await
        .unwrap();
    assert_eq!(fetch(&app, record.id).await.reserved_quantity, 5);

    app.state.orders.cancel(order.id, None).await.unwrap();
    let after = fetch(&app, record.id).await;
    assert_eq!(after.quantity, 10);
    assert_eq!(after.reserved_quantity, 0);

    // Releases are not quantity-affecting, so the order left no ledger trace.
    let ledger = LedgerByReferenceQuery {
        reference_id: order.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn cancellation_after_commit_restocks() {
    let app = TestApp::new().await;
    let record = app.seed_stock("SHO-GRN-44", 10, dec!(100)).await;

    let order = app
        .state
        .orders
        .create_order(order_of(&record, 5))
        .await
        .unwrap();
    app.state.orders.confirm(order.id).await.unwrap();
    app.state
        .orders
        .assign_to_shipper(order.id, None)
        .await
        .unwrap();
    assert_eq!(fetch(&app, record.id).await.quantity, 5);

    app.state.orders.cancel(order.id, None).await.unwrap();
    let after = fetch(&app, record.id).await;
    assert_eq!(after.quantity, 10);
    assert_eq!(after.reserved_quantity, 0);

    let ledger = LedgerByReferenceQuery {
        reference_id: order.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    let reasons: Vec<_> = ledger.iter().filter_map(|t| t.reason()).collect();
    assert!(reasons.contains(&StockTransactionReason::Cancelled));
}

#[tokio::test]
async fn multi_line_order_rolls_back_reserved_lines_on_failure() {
    let app = TestApp::new().await;
    let plenty = app.seed_stock("BAG-BLK-OS", 10, dec!(100)).await;
    let scarce = app.seed_stock("BAG-RED-OS", 2, dec!(100)).await;

    let err = app
        .state
        .orders
        .create_order(NewOrder {
            order_number: "SO-MIXED-1".to_string(),
            customer_id: Uuid::new_v4(),
            lines: vec![
                NewOrderLine {
                    stock_record_id: plenty.id,
                    sku: plenty.sku.clone(),
                    quantity: 4,
                    unit_price: plenty.final_price,
                },
                NewOrderLine {
                    stock_record_id: scarce.id,
                    sku: scarce.sku.clone(),
                    quantity: 5,
                    unit_price: scarce.final_price,
                },
            ],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock { .. }), "{err}");

    // The successfully reserved first line was compensated.
    assert_eq!(fetch(&app, plenty.id).await.reserved_quantity, 0);
    assert_eq!(fetch(&app, scarce.id).await.reserved_quantity, 0);
}

#[tokio::test]
async fn transitions_cannot_skip_states() {
    let app = TestApp::new().await;
    let record = app.seed_stock("SHO-BLU-40", 10, dec!(100)).await;
    let order = app
        .state
        .orders
        .create_order(order_of(&record, 1))
        .await
        .unwrap();

    let err = app
        .state
        .orders
        .assign_to_shipper(order.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::IllegalStateTransition(_)), "{err}");
    // The failed attempt must not have touched the stock.
    assert_eq!(fetch(&app, record.id).await.quantity, 10);
    assert_eq!(fetch(&app, record.id).await.reserved_quantity, 1);

    app.state.orders.confirm(order.id).await.unwrap();
    let err = app.state.orders.confirm(order.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::IllegalStateTransition(_)), "{err}");
}

#[tokio::test]
async fn cancel_request_is_gated_by_staff_decision() {
    let app = TestApp::new().await;
    let record = app.seed_stock("SHO-PNK-39", 10, dec!(100)).await;
    let order = app
        .state
        .orders
        .create_order(order_of(&record, 2))
        .await
        .unwrap();

    app.state.orders.request_cancel(order.id).await.unwrap();
    // A second request while one is pending is rejected.
    let err = app.state.orders.request_cancel(order.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::IllegalStateTransition(_)), "{err}");

    let cancelled = app
        .state
        .orders
        .approve_cancel(order.id, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status(), Some(OrderStatus::Cancelled));
    assert_eq!(fetch(&app, record.id).await.reserved_quantity, 0);
}

#[tokio::test]
async fn rejected_cancel_request_leaves_fulfillment_running() {
    let app = TestApp::new().await;
    let record = app.seed_stock("SHO-YLW-38", 10, dec!(100)).await;
    let order = app
        .state
        .orders
        .create_order(order_of(&record, 2))
        .await
        .unwrap();

    app.state.orders.request_cancel(order.id).await.unwrap();
    app.state.orders.reject_cancel(order.id).await.unwrap();

    // Fulfillment continues exactly where it was.
    let confirmed = app.state.orders.confirm(order.id).await.unwrap();
    assert_eq!(confirmed.status(), Some(OrderStatus::Confirmed));
    assert_eq!(fetch(&app, record.id).await.reserved_quantity, 2);
}
