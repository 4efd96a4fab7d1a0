mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::ConnectionTrait;
use stockroom_api::entities::stock_transaction::StockTransactionReason;
use stockroom_api::errors::ServiceError;
use stockroom_api::queries::ledger_queries::{resolve_gap, LedgerBalanceQuery, UnresolvedGapsQuery};
use stockroom_api::queries::stock_queries::GetStockRecordQuery;
use stockroom_api::queries::Query;

/// The stock record update is authoritative; a ledger outage must not block
/// it, and the missing entry must surface as a queryable gap.
#[tokio::test]
async fn ledger_outage_never_blocks_the_stock_update() {
    let app = TestApp::new().await;
    let record = app.seed_stock("TEE-BLK-M", 10, dec!(100)).await;

    // Take the ledger table away so the next append fails.
    app.state
        .db
        .execute_unprepared("ALTER TABLE stock_transactions RENAME TO stock_transactions_offline")
        .await
        .unwrap();

    app.state
        .reservations
        .adjust(record.id, -2, StockTransactionReason::Damage, None)
        .await
        .unwrap();

    let after = GetStockRecordQuery {
        stock_record_id: record.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(after.quantity, 8, "stock change must stick");

    let gaps = UnresolvedGapsQuery {
        limit: 10,
        offset: 0,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert_eq!(gaps.len(), 1);
    let gap = &gaps[0];
    assert_eq!(gap.stock_record_id, record.id);
    assert_eq!(gap.quantity_change, -2);
    assert_eq!(gap.reason, "damage");
    assert!(!gap.resolved);

    // Bring the ledger back; later appends succeed, the lost entry stays lost.
    app.state
        .db
        .execute_unprepared("ALTER TABLE stock_transactions_offline RENAME TO stock_transactions")
        .await
        .unwrap();
    app.state
        .reservations
        .adjust(record.id, -1, StockTransactionReason::Lost, None)
        .await
        .unwrap();
    let balance = LedgerBalanceQuery {
        stock_record_id: record.id,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    // Seed wrote +10 and the recount -1; the damaged units never reached the
    // ledger, which is exactly what the gap row accounts for.
    assert_eq!(balance, 9);

    resolve_gap(&app.state.db, gap.id).await.unwrap();
    let open = UnresolvedGapsQuery {
        limit: 10,
        offset: 0,
    }
    .execute(&app.state.db)
    .await
    .unwrap();
    assert!(open.is_empty());

    // Resolving twice is a no-op reported as not found.
    let err = resolve_gap(&app.state.db, gap.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)), "{err}");
}
