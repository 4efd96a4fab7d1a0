use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::entities::{ledger_gap, stock_transaction};
use crate::entities::stock_transaction::{StockTransactionReason, TransactionType};
use crate::events::{Event, EventSender};

lazy_static! {
    static ref LEDGER_ENTRIES_TOTAL: IntCounter = IntCounter::new(
        "stock_ledger_entries_total",
        "Total number of stock ledger entries written"
    )
    .expect("metric can be created");
    static ref LEDGER_GAPS_TOTAL: IntCounter = IntCounter::new(
        "stock_ledger_gaps_total",
        "Total number of ledger writes that failed after a successful stock mutation"
    )
    .expect("metric can be created");
}

/// What the ledger entry references (the order or return that caused it).
#[derive(Debug, Clone, Copy)]
pub struct LedgerReference {
    pub id: Uuid,
    pub kind: &'static str,
}

impl LedgerReference {
    pub fn order(id: Uuid) -> Self {
        Self { id, kind: "order" }
    }

    pub fn return_request(id: Uuid) -> Self {
        Self {
            id,
            kind: "return_request",
        }
    }
}

/// Pricing-derivation snapshot attached to stock-in entries only.
#[derive(Debug, Clone, Copy)]
pub struct PricingFields {
    pub target_profit_percent: Decimal,
    pub percent_discount: Decimal,
    pub calculated_price: Decimal,
    pub calculated_price_final: Decimal,
    pub profit_per_item: Decimal,
    pub margin: Decimal,
    pub markup: Decimal,
}

/// One quantity-affecting event, ready to be appended.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub stock_record_id: Uuid,
    pub tx_type: TransactionType,
    pub quantity_before: i32,
    pub quantity_change: i32,
    pub quantity_after: i32,
    pub cost_price: Decimal,
    pub average_cost_before: Decimal,
    pub average_cost_after: Decimal,
    pub total_cost: Decimal,
    pub pricing: Option<PricingFields>,
    pub reason: StockTransactionReason,
    pub reference: Option<LedgerReference>,
    pub performed_by: Option<Uuid>,
}

/// Append-only writer for [`stock_transaction`] rows.
///
/// Writes happen after the authoritative stock record update has succeeded.
/// A failed write is a reconciliation gap, not a failure of the operation:
/// it is logged, counted, recorded in `ledger_gaps`, and never propagated.
#[derive(Clone)]
pub struct LedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl LedgerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Appends a ledger entry, swallowing (but recording) any failure.
    ///
    /// Returns the transaction id when the write succeeded.
    pub async fn append_best_effort(&self, entry: LedgerEntry) -> Option<Uuid> {
        debug_assert_eq!(
            entry.quantity_after,
            entry.quantity_before + entry.quantity_change
        );

        let id = Uuid::new_v4();
        let model = stock_transaction::ActiveModel {
            id: Set(id),
            stock_record_id: Set(entry.stock_record_id),
            tx_type: Set(entry.tx_type.as_str().to_string()),
            quantity_before: Set(entry.quantity_before),
            quantity_change: Set(entry.quantity_change),
            quantity_after: Set(entry.quantity_after),
            cost_price: Set(entry.cost_price),
            average_cost_before: Set(entry.average_cost_before),
            average_cost_after: Set(entry.average_cost_after),
            total_cost: Set(entry.total_cost),
            target_profit_percent: Set(entry.pricing.map(|p| p.target_profit_percent)),
            percent_discount: Set(entry.pricing.map(|p| p.percent_discount)),
            calculated_price: Set(entry.pricing.map(|p| p.calculated_price)),
            calculated_price_final: Set(entry.pricing.map(|p| p.calculated_price_final)),
            profit_per_item: Set(entry.pricing.map(|p| p.profit_per_item)),
            margin: Set(entry.pricing.map(|p| p.margin)),
            markup: Set(entry.pricing.map(|p| p.markup)),
            reason: Set(entry.reason.as_str().to_string()),
            reference_id: Set(entry.reference.map(|r| r.id)),
            reference_type: Set(entry.reference.map(|r| r.kind.to_string())),
            performed_by: Set(entry.performed_by),
            ..Default::default()
        };

        match model.insert(&*self.db).await {
            Ok(_) => {
                LEDGER_ENTRIES_TOTAL.inc();
                Some(id)
            }
            Err(e) => {
                self.record_gap(&entry, e.to_string()).await;
                None
            }
        }
    }

    /// Records a reconciliation gap. The stock change stays applied.
    async fn record_gap(&self, entry: &LedgerEntry, detail: String) {
        LEDGER_GAPS_TOTAL.inc();
        error!(
            stock_record_id = %entry.stock_record_id,
            tx_type = entry.tx_type.as_str(),
            quantity_change = entry.quantity_change,
            detail = %detail,
            "ledger write failed after stock mutation; recording gap"
        );

        let gap = ledger_gap::ActiveModel {
            stock_record_id: Set(entry.stock_record_id),
            tx_type: Set(entry.tx_type.as_str().to_string()),
            quantity_change: Set(entry.quantity_change),
            reason: Set(entry.reason.as_str().to_string()),
            detail: Set(detail.clone()),
            resolved: Set(false),
            ..Default::default()
        };
        if let Err(e) = gap.insert(&*self.db).await {
            // Worst case: the gap survives only in logs and metrics.
            error!(
                stock_record_id = %entry.stock_record_id,
                error = %e,
                "failed to persist ledger gap record"
            );
        }

        let _ = self
            .event_sender
            .send(Event::LedgerGapDetected {
                stock_record_id: entry.stock_record_id,
                detail,
            })
            .await;
    }
}
