use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::stock_record::{self, Column, Entity as StockRecords};
use crate::entities::stock_transaction::StockTransactionReason;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::ledger::{LedgerEntry, LedgerReference, LedgerService};

lazy_static! {
    static ref STOCK_RESERVATIONS_TOTAL: IntCounter = IntCounter::new(
        "stock_reservations_total",
        "Total number of successful stock reservations"
    )
    .expect("metric can be created");
    static ref STOCK_RESERVATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stock_reservation_failures_total",
            "Reservation attempts rejected, by cause"
        ),
        &["cause"]
    )
    .expect("metric can be created");
    static ref STOCK_COMMITS_TOTAL: IntCounter = IntCounter::new(
        "stock_commits_total",
        "Total number of reservations converted into physical deductions"
    )
    .expect("metric can be created");
    static ref STOCK_RELEASES_TOTAL: IntCounter = IntCounter::new(
        "stock_releases_total",
        "Total number of reservation releases"
    )
    .expect("metric can be created");
}

/// One order line to reserve: the record and how many units.
#[derive(Debug, Clone, Copy)]
pub struct LineReservation {
    pub stock_record_id: Uuid,
    pub quantity: i32,
}

/// Sole mutator of `quantity` and `reserved_quantity` outside of stock
/// receipt.
///
/// Every mutation is a single conditional `UPDATE` whose `WHERE` clause
/// carries the availability guard; `rows_affected` decides success. There is
/// no read-modify-write anywhere in this service, so concurrent callers can
/// never double-promise the same units.
#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    ledger: LedgerService,
}

impl ReservationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        let ledger = LedgerService::new(db.clone(), event_sender.clone());
        Self {
            db,
            event_sender,
            ledger,
        }
    }

    async fn load_record(&self, id: Uuid) -> Result<stock_record::Model, ServiceError> {
        StockRecords::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::StockRecordNotFound(id))
    }

    /// Soft-holds `quantity` units against the record.
    ///
    /// Succeeds only if `quantity - reserved_quantity >= requested` held at
    /// the instant of the update. On-hand stock is untouched and no ledger
    /// entry is written.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        stock_record_id: Uuid,
        quantity: i32,
        reference_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "reserve quantity must be positive".to_string(),
            ));
        }

        let result = StockRecords::update_many()
            .col_expr(
                Column::ReservedQuantity,
                Expr::col(Column::ReservedQuantity).add(quantity),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(stock_record_id))
            .filter(
                Expr::expr(Expr::col(Column::Quantity).sub(Expr::col(Column::ReservedQuantity)))
                    .gte(quantity),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Guard failed: distinguish a missing record from a real shortage.
            let record = self.load_record(stock_record_id).await.map_err(|e| {
                STOCK_RESERVATION_FAILURES
                    .with_label_values(&["record_not_found"])
                    .inc();
                e
            })?;
            STOCK_RESERVATION_FAILURES
                .with_label_values(&["insufficient_stock"])
                .inc();
            return Err(ServiceError::InsufficientStock {
                stock_record_id,
                requested: quantity,
                available: record.available(),
            });
        }

        STOCK_RESERVATIONS_TOTAL.inc();
        let _ = self
            .event_sender
            .send(Event::StockReserved {
                stock_record_id,
                quantity,
                reference_id,
            })
            .await;
        Ok(())
    }

    /// Reserves a whole order's lines, all or nothing.
    ///
    /// On any line failure, lines already reserved are released before the
    /// error is returned.
    #[instrument(skip(self, lines))]
    pub async fn reserve_lines(
        &self,
        lines: &[LineReservation],
        reference_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        for (idx, line) in lines.iter().enumerate() {
            if let Err(err) = self
                .reserve(line.stock_record_id, line.quantity, reference_id)
                .await
            {
                for done in &lines[..idx] {
                    if let Err(release_err) = self
                        .release(done.stock_record_id, done.quantity, reference_id)
                        .await
                    {
                        warn!(
                            stock_record_id = %done.stock_record_id,
                            quantity = done.quantity,
                            error = %release_err,
                            "failed to roll back reservation after partial multi-line failure"
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Gives back a soft hold without touching on-hand stock.
    ///
    /// Releasing more than is currently reserved clamps the hold to zero
    /// rather than failing; over-release is a caller accounting bug, not a
    /// stock shortage.
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        stock_record_id: Uuid,
        quantity: i32,
        reference_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "release quantity must be positive".to_string(),
            ));
        }

        let result = StockRecords::update_many()
            .col_expr(
                Column::ReservedQuantity,
                Expr::col(Column::ReservedQuantity).sub(quantity),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(stock_record_id))
            .filter(Column::ReservedQuantity.gte(quantity))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let record = self.load_record(stock_record_id).await?;
            warn!(
                %stock_record_id,
                requested = quantity,
                reserved = record.reserved_quantity,
                "release exceeds reserved quantity; clamping hold to zero"
            );
            StockRecords::update_many()
                .col_expr(Column::ReservedQuantity, Expr::value(0))
                .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(Column::Id.eq(stock_record_id))
                .filter(Column::ReservedQuantity.lt(quantity))
                .exec(&*self.db)
                .await?;
        }

        STOCK_RELEASES_TOTAL.inc();
        let _ = self
            .event_sender
            .send(Event::StockReleased {
                stock_record_id,
                quantity,
                reference_id,
            })
            .await;
        Ok(())
    }

    /// Converts a soft hold into a physical deduction.
    ///
    /// Both `quantity` and `reserved_quantity` drop together; committing
    /// units that were never reserved is an illegal transition, not a
    /// shortage.
    #[instrument(skip(self))]
    pub async fn commit(
        &self,
        stock_record_id: Uuid,
        quantity: i32,
        reference: Option<LedgerReference>,
        performed_by: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "commit quantity must be positive".to_string(),
            ));
        }

        let result = StockRecords::update_many()
            .col_expr(
                Column::Quantity,
                Expr::col(Column::Quantity).sub(quantity),
            )
            .col_expr(
                Column::ReservedQuantity,
                Expr::col(Column::ReservedQuantity).sub(quantity),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(stock_record_id))
            .filter(Column::ReservedQuantity.gte(quantity))
            .filter(Column::Quantity.gte(quantity))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let record = self.load_record(stock_record_id).await?;
            if record.reserved_quantity < quantity {
                return Err(ServiceError::IllegalStateTransition(format!(
                    "cannot commit {quantity} units of {stock_record_id}: only {} reserved",
                    record.reserved_quantity
                )));
            }
            return Err(ServiceError::InsufficientStock {
                stock_record_id,
                requested: quantity,
                available: record.available(),
            });
        }

        STOCK_COMMITS_TOTAL.inc();
        let record = self.load_record(stock_record_id).await?;
        let average = record.average_cost_price;
        self.ledger
            .append_best_effort(LedgerEntry {
                stock_record_id,
                tx_type: StockTransactionReason::Sale.tx_type(),
                quantity_before: record.quantity + quantity,
                quantity_change: -quantity,
                quantity_after: record.quantity,
                cost_price: average,
                average_cost_before: average,
                average_cost_after: average,
                total_cost: average * Decimal::from(quantity),
                pricing: None,
                reason: StockTransactionReason::Sale,
                reference,
                performed_by,
            })
            .await;

        let _ = self
            .event_sender
            .send(Event::StockCommitted {
                stock_record_id,
                quantity,
                reference_id: reference.map(|r| r.id),
            })
            .await;
        Ok(())
    }

    /// Credits units back to on-hand stock at the current average cost.
    ///
    /// Used for returns, failed deliveries, and post-commit cancellations.
    /// The reservation hold is not touched; whatever hold backed these units
    /// was already consumed or released.
    #[instrument(skip(self))]
    pub async fn restock(
        &self,
        stock_record_id: Uuid,
        quantity: i32,
        reason: StockTransactionReason,
        reference: Option<LedgerReference>,
        performed_by: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "restock quantity must be positive".to_string(),
            ));
        }
        if !reason.credits_stock() {
            return Err(ServiceError::ValidationError(format!(
                "reason {} does not credit stock",
                reason.as_str()
            )));
        }

        let result = StockRecords::update_many()
            .col_expr(
                Column::Quantity,
                Expr::col(Column::Quantity).add(quantity),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(stock_record_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::StockRecordNotFound(stock_record_id));
        }

        let record = self.load_record(stock_record_id).await?;
        let average = record.average_cost_price;
        self.ledger
            .append_best_effort(LedgerEntry {
                stock_record_id,
                tx_type: reason.tx_type(),
                quantity_before: record.quantity - quantity,
                quantity_change: quantity,
                quantity_after: record.quantity,
                cost_price: average,
                average_cost_before: average,
                average_cost_after: average,
                total_cost: average * Decimal::from(quantity),
                pricing: None,
                reason,
                reference,
                performed_by,
            })
            .await;

        let _ = self
            .event_sender
            .send(Event::StockRestocked {
                stock_record_id,
                quantity,
                reason: reason.as_str().to_string(),
                reference_id: reference.map(|r| r.id),
            })
            .await;
        Ok(())
    }

    /// Manual correction for damage, loss, or physical recounts.
    ///
    /// The guard keeps on-hand stock from going negative or dropping below
    /// the outstanding reservation hold.
    #[instrument(skip(self))]
    pub async fn adjust(
        &self,
        stock_record_id: Uuid,
        delta: i32,
        reason: StockTransactionReason,
        performed_by: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if delta == 0 {
            return Err(ServiceError::ValidationError(
                "adjustment delta must be non-zero".to_string(),
            ));
        }
        if !reason.is_adjustment() {
            return Err(ServiceError::ValidationError(format!(
                "reason {} is not an adjustment reason",
                reason.as_str()
            )));
        }

        let result = StockRecords::update_many()
            .col_expr(Column::Quantity, Expr::col(Column::Quantity).add(delta))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(stock_record_id))
            .filter(Expr::expr(Expr::col(Column::Quantity).add(delta)).gte(0))
            .filter(
                Expr::expr(Expr::col(Column::Quantity).add(delta))
                    .gte(Expr::col(Column::ReservedQuantity)),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let record = self.load_record(stock_record_id).await?;
            return Err(ServiceError::InsufficientStock {
                stock_record_id,
                requested: delta.abs(),
                available: record.available(),
            });
        }

        let record = self.load_record(stock_record_id).await?;
        let average = record.average_cost_price;
        self.ledger
            .append_best_effort(LedgerEntry {
                stock_record_id,
                tx_type: reason.tx_type(),
                quantity_before: record.quantity - delta,
                quantity_change: delta,
                quantity_after: record.quantity,
                cost_price: average,
                average_cost_before: average,
                average_cost_after: average,
                total_cost: average * Decimal::from(delta.abs()),
                pricing: None,
                reason,
                reference: None,
                performed_by,
            })
            .await;

        let _ = self
            .event_sender
            .send(Event::StockAdjusted {
                stock_record_id,
                delta,
                reason: reason.as_str().to_string(),
            })
            .await;
        Ok(())
    }
}
