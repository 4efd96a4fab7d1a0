mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use stockroom_api::entities::return_request::{RefundMethod, ReturnStatus};
use stockroom_api::entities::stock_transaction::{StockTransactionReason, TransactionType};
use stockroom_api::errors::ServiceError;
use stockroom_api::queries::ledger_queries::LedgerByReferenceQuery;
use stockroom_api::queries::stock_queries::GetStockRecordQuery;
use stockroom_api::queries::Query;
use stockroom_api::services::costing::ReceiveStock;
use stockroom_api::services::orders::{NewOrder, NewOrderLine};
use stockroom_api::services::returns::ReturnLine;
use uuid::Uuid;

/// Drives an order for `quantity` units all the way to delivered.
async fn delivered_order(
    app: &TestApp,
    record: &stockroom_api::entities::stock_record::Model,
    quantity: i32,
) -> Uuid {
    let order = app
        .state
        .orders
        .create_order(NewOrder {
            order_number: format!("SO-{}", Uuid::new_v4().simple()),
            customer_id: Uuid::new_v4(),
            lines: vec![NewOrderLine {
                stock_record_id: record.id,
                sku: record.sku.clone(),
                quantity,
                unit_price: record.final_price,
            }],
        })
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
    app.state.orders.mark_delivered(order.id).await.unwrap();
    order.id
}

#[tokio::test]
async fn full_return_round_trip_restores_stock_and_records_refund() {
    let app = TestApp::new().await;
    let record = app.seed_stock("JKT-BLK-M", 10, dec!(100)).await;
    let order_id = delivered_order(&app, &record, 2).await;

    let staff = Uuid::new_v4();
    let ret = app
        .state
        .returns
        .create(
            order_id,
            Some("wrong size".to_string()),
            &[ReturnLine {
                stock_record_id: record.id,
                quantity: 2,
            }],
        )
        .await
        .unwrap();
    assert_eq!(ret.status(), Some(ReturnStatus::Pending));

    app.state.returns.approve(ret.id).await.unwrap();
    app.state.returns.mark_shipping(ret.id).await.unwrap();
    app.state
        .returns
        .mark_received(ret.id, Some(staff))
        .await
        .unwrap();

    let after = GetStockRecordQuery {
        stock_record_id: record.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(after.quantity, 10);

    // Paired ledger trail: an out/sale against the order, an in/return
    // against the return request.
    let sale_rows = LedgerByReferenceQuery {
        reference_id: order_id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(sale_rows.len(), 1);
    assert_eq!(sale_rows[0].tx_type(), Some(TransactionType::Out));
    assert_eq!(sale_rows[0].quantity_change, -2);

    let return_rows = LedgerByReferenceQuery {
        reference_id: ret.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(return_rows.len(), 1);
    assert_eq!(return_rows[0].reason(), Some(StockTransactionReason::Return));
    assert_eq!(return_rows[0].quantity_change, 2);
    assert_eq!(return_rows[0].performed_by, Some(staff));

    app.state
        .returns
        .record_refund(ret.id, RefundMethod::BankTransfer)
        .await
        .unwrap();
    app.state
        .returns
        .confirm_refund(ret.id, staff)
        .await
        .unwrap();
    let done = app.state.returns.complete(ret.id).await.unwrap();
    assert_eq!(done.status(), Some(ReturnStatus::Completed));

    let stored = stockroom_api::entities::return_request::Entity::find_by_id(ret.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.refund_confirmed);
    assert_eq!(stored.refund_confirmed_by, Some(staff));
    assert_eq!(stored.refund_method(), Some(RefundMethod::BankTransfer));
}

#[tokio::test]
async fn returns_require_a_delivered_order() {
    let app = TestApp::new().await;
    let record = app.seed_stock("JKT-GRN-L", 10, dec!(100)).await;
    let order = app
        .state
        .orders
        .create_order(NewOrder {
            order_number: "SO-EARLY-1".to_string(),
            customer_id: Uuid::new_v4(),
            lines: vec![NewOrderLine {
                stock_record_id: record.id,
                sku: record.sku.clone(),
                quantity: 1,
                unit_price: record.final_price,
            }],
        })
        .await
        .unwrap();

    let err = app
        .state
        .returns
        .create(
            order.id,
            None,
            &[ReturnLine {
                stock_record_id: record.id,
                quantity: 1,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::IllegalStateTransition(_)), "{err}");
}

#[tokio::test]
async fn rejected_return_has_no_stock_effect() {
    let app = TestApp::new().await;
    let record = app.seed_stock("JKT-NVY-S", 10, dec!(100)).await;
    let order_id = delivered_order(&app, &record, 3).await;

    let ret = app
        .state
        .returns
        .create(
            order_id,
            None,
            &[ReturnLine {
                stock_record_id: record.id,
                quantity: 3,
            }],
        )
        .await
        .unwrap();
    let rejected = app.state.returns.reject(ret.id).await.unwrap();
    assert_eq!(rejected.status(), Some(ReturnStatus::Rejected));

    let after = GetStockRecordQuery {
        stock_record_id: record.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(after.quantity, 7);

    // Terminal: nothing further is accepted.
    let err = app.state.returns.approve(ret.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::IllegalStateTransition(_)), "{err}");
}

#[tokio::test]
async fn cancel_detour_resumes_the_interrupted_state() {
    let app = TestApp::new().await;
    let record = app.seed_stock("JKT-RED-M", 10, dec!(100)).await;
    let order_id = delivered_order(&app, &record, 1).await;

    let ret = app
        .state
        .returns
        .create(
            order_id,
            None,
            &[ReturnLine {
                stock_record_id: record.id,
                quantity: 1,
            }],
        )
        .await
        .unwrap();
    app.state.returns.approve(ret.id).await.unwrap();
    app.state.returns.mark_shipping(ret.id).await.unwrap();

    let parked = app.state.returns.request_cancel(ret.id).await.unwrap();
    assert_eq!(parked.status(), Some(ReturnStatus::CancelPending));
    assert_eq!(parked.prior_status(), Some(ReturnStatus::Shipping));

    let resumed = app.state.returns.reject_cancel(ret.id).await.unwrap();
    assert_eq!(resumed.status(), Some(ReturnStatus::Shipping));
    assert_eq!(resumed.prior_status, None);

    // Withdraw again, approved this time: terminal, no stock credited.
    app.state.returns.request_cancel(ret.id).await.unwrap();
    let canceled = app.state.returns.approve_cancel(ret.id).await.unwrap();
    assert_eq!(canceled.status(), Some(ReturnStatus::Canceled));

    let after = GetStockRecordQuery {
        stock_record_id: record.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(after.quantity, 9);
}

#[tokio::test]
async fn refund_confirmation_requires_a_recorded_refund() {
    let app = TestApp::new().await;
    let record = app.seed_stock("JKT-GRY-XL", 10, dec!(100)).await;
    let order_id = delivered_order(&app, &record, 1).await;

    let ret = app
        .state
        .returns
        .create(
            order_id,
            None,
            &[ReturnLine {
                stock_record_id: record.id,
                quantity: 1,
            }],
        )
        .await
        .unwrap();
    app.state.returns.approve(ret.id).await.unwrap();
    app.state.returns.mark_shipping(ret.id).await.unwrap();
    app.state.returns.mark_received(ret.id, None).await.unwrap();

    let err = app
        .state
        .returns
        .confirm_refund(ret.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::IllegalStateTransition(_)), "{err}");
}

#[tokio::test]
async fn weighted_average_blends_sequential_receipts() {
    let app = TestApp::new().await;
    let record = app.seed_stock("JKT-BRN-M", 10, dec!(100)).await;
    assert_eq!(record.average_cost_price, dec!(100));

    let updated = app
        .state
        .costing
        .receive_stock(
            record.id,
            ReceiveStock {
                quantity: 5,
                unit_cost: dec!(130),
                target_profit_percent: dec!(50),
                percent_discount: dec!(0),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(updated.quantity, 15);
    assert_eq!(updated.average_cost_price, dec!(110));
    assert_eq!(updated.cost_price, dec!(130));
    // Selling price is derived from the blended average.
    assert_eq!(updated.selling_price, dec!(220));

    let history = stockroom_api::queries::ledger_queries::LedgerHistoryQuery {
        stock_record_id: Some(record.id),
        ..Default::default()
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(history.len(), 2);
    // Newest first: the second lot moved the average from 100 to 110.
    assert_eq!(history[0].average_cost_before, dec!(100));
    assert_eq!(history[0].average_cost_after, dec!(110));
    assert_eq!(history[0].target_profit_percent, Some(dec!(50)));
}
