use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;
use uuid::Uuid;

use stockroom_api::config::AppConfig;
use stockroom_api::entities::stock_record;
use stockroom_api::services::costing::{ReceiveStock, StockIdentity};
use stockroom_api::{db, events, AppState};

/// Harness backed by a file-based SQLite database in a temp directory.
///
/// A single pooled connection keeps SQLite's locking out of the picture while
/// still exercising the conditional-update guards under task concurrency.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = db_dir.path().join("stockroom_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test",
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        let (event_sender, receiver) = events::event_channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(receiver));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        Self {
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Seeds a stock record through the costing engine (the same path
    /// production stock-in takes) and returns it.
    pub async fn seed_stock(
        &self,
        sku: &str,
        quantity: i32,
        unit_cost: Decimal,
    ) -> stock_record::Model {
        self.state
            .costing
            .receive_for(
                StockIdentity {
                    sku: sku.to_string(),
                    product_id: Uuid::new_v4(),
                    variant: "default".to_string(),
                    size: "M".to_string(),
                    low_stock_threshold: 5,
                },
                ReceiveStock {
                    quantity,
                    unit_cost,
                    target_profit_percent: dec!(50),
                    percent_discount: dec!(0),
                },
                None,
            )
            .await
            .expect("failed to seed stock")
    }
}
