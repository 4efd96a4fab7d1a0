use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::stock_record::{self, Column, Entity as StockRecords};
use crate::entities::stock_transaction::StockTransactionReason;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::ledger::{LedgerEntry, LedgerService, PricingFields};

/// Version-guard retries before giving up on a contended record.
const MAX_RECEIVE_RETRIES: u32 = 5;

lazy_static! {
    static ref STOCK_RECEIPTS_TOTAL: IntCounter = IntCounter::new(
        "stock_receipts_total",
        "Total number of stock-in receipts processed"
    )
    .expect("metric can be created");
    static ref STOCK_RECEIPT_RETRIES_TOTAL: IntCounter = IntCounter::new(
        "stock_receipt_retries_total",
        "Version-guard retries while applying stock receipts"
    )
    .expect("metric can be created");
}

/// Inputs for one stock-in lot.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveStock {
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub target_profit_percent: Decimal,
    pub percent_discount: Decimal,
}

/// Identity of a record to create on first receipt of a new triple.
#[derive(Debug, Clone)]
pub struct StockIdentity {
    pub sku: String,
    pub product_id: Uuid,
    pub variant: String,
    pub size: String,
    pub low_stock_threshold: i32,
}

/// Selling-price derivation from a cost basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceDerivation {
    pub calculated_price: Decimal,
    pub calculated_price_final: Decimal,
    pub profit_per_item: Decimal,
    /// Profit as a fraction of the discounted selling price.
    pub margin: Decimal,
    /// Profit as a fraction of the cost basis.
    pub markup: Decimal,
}

/// Derives selling price from a cost basis, target profit, and discount.
///
/// `calculated_price = cost / (1 - profit%)`, then the discount comes off
/// that. Both percentages must lie in `[0, 100)`; 100 would divide by zero or
/// sell at zero, so it is rejected rather than clamped.
pub fn derive_price(
    cost_basis: Decimal,
    target_profit_percent: Decimal,
    percent_discount: Decimal,
) -> Result<PriceDerivation, ServiceError> {
    let hundred = dec!(100);
    if cost_basis <= Decimal::ZERO {
        return Err(ServiceError::InvalidPricingInput(format!(
            "cost basis must be positive, got {cost_basis}"
        )));
    }
    if target_profit_percent < Decimal::ZERO || target_profit_percent >= hundred {
        return Err(ServiceError::InvalidPricingInput(format!(
            "target profit percent must be in [0, 100), got {target_profit_percent}"
        )));
    }
    if percent_discount < Decimal::ZERO || percent_discount >= hundred {
        return Err(ServiceError::InvalidPricingInput(format!(
            "percent discount must be in [0, 100), got {percent_discount}"
        )));
    }

    let calculated_price = (cost_basis / (Decimal::ONE - target_profit_percent / hundred))
        .round_dp(4);
    let calculated_price_final =
        (calculated_price * (Decimal::ONE - percent_discount / hundred)).round_dp(4);
    let profit_per_item = calculated_price_final - cost_basis;
    let margin = (profit_per_item / calculated_price_final).round_dp(4);
    let markup = (profit_per_item / cost_basis).round_dp(4);

    Ok(PriceDerivation {
        calculated_price,
        calculated_price_final,
        profit_per_item,
        margin,
        markup,
    })
}

/// Weighted-average cost after blending a new lot into the existing stock.
pub fn weighted_average(
    old_quantity: i32,
    old_average: Decimal,
    lot_quantity: i32,
    lot_cost: Decimal,
) -> Decimal {
    let total = old_quantity + lot_quantity;
    if total <= 0 {
        return lot_cost;
    }
    let blended = (Decimal::from(old_quantity.max(0)) * old_average
        + Decimal::from(lot_quantity) * lot_cost)
        / Decimal::from(total);
    blended.round_dp(4)
}

/// Applies stock receipts: weighted-average recomputation plus selling-price
/// derivation, written back under a version guard.
///
/// Unlike the reservation paths, a receipt rewrites several interdependent
/// columns from values it read, so the update filters on the `version` column
/// and retries on interleaved writers.
#[derive(Clone)]
pub struct CostingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    ledger: LedgerService,
}

impl CostingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        let ledger = LedgerService::new(db.clone(), event_sender.clone());
        Self {
            db,
            event_sender,
            ledger,
        }
    }

    /// Pure what-if price calculation. Nothing is persisted.
    pub fn preview_price(
        &self,
        unit_cost: Decimal,
        target_profit_percent: Decimal,
        percent_discount: Decimal,
    ) -> Result<PriceDerivation, ServiceError> {
        derive_price(unit_cost, target_profit_percent, percent_discount)
    }

    /// Receives a lot into an existing record.
    ///
    /// Returns the record as it stood immediately after the receipt.
    #[instrument(skip(self))]
    pub async fn receive_stock(
        &self,
        stock_record_id: Uuid,
        input: ReceiveStock,
        performed_by: Option<Uuid>,
    ) -> Result<stock_record::Model, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "receive quantity must be positive".to_string(),
            ));
        }
        if input.unit_cost <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "unit cost must be positive".to_string(),
            ));
        }

        for attempt in 0..MAX_RECEIVE_RETRIES {
            let record = StockRecords::find_by_id(stock_record_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or(ServiceError::StockRecordNotFound(stock_record_id))?;

            let average_after = weighted_average(
                record.quantity,
                record.average_cost_price,
                input.quantity,
                input.unit_cost,
            );
            let derivation = derive_price(
                average_after,
                input.target_profit_percent,
                input.percent_discount,
            )?;
            let quantity_after = record.quantity + input.quantity;

            let result = StockRecords::update_many()
                .col_expr(Column::Quantity, Expr::value(quantity_after))
                .col_expr(Column::CostPrice, Expr::value(input.unit_cost))
                .col_expr(Column::AverageCostPrice, Expr::value(average_after))
                .col_expr(
                    Column::SellingPrice,
                    Expr::value(derivation.calculated_price),
                )
                .col_expr(
                    Column::DiscountPercent,
                    Expr::value(input.percent_discount),
                )
                .col_expr(
                    Column::FinalPrice,
                    Expr::value(derivation.calculated_price_final),
                )
                .col_expr(Column::Version, Expr::value(record.version + 1))
                .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(Column::Id.eq(stock_record_id))
                .filter(Column::Version.eq(record.version))
                .filter(Column::Quantity.eq(record.quantity))
                .exec(&*self.db)
                .await?;

            if result.rows_affected == 0 {
                STOCK_RECEIPT_RETRIES_TOTAL.inc();
                warn!(
                    %stock_record_id,
                    attempt,
                    "stock receipt lost the version race; retrying"
                );
                continue;
            }

            STOCK_RECEIPTS_TOTAL.inc();
            self.ledger
                .append_best_effort(LedgerEntry {
                    stock_record_id,
                    tx_type: StockTransactionReason::Restock.tx_type(),
                    quantity_before: record.quantity,
                    quantity_change: input.quantity,
                    quantity_after,
                    cost_price: input.unit_cost,
                    average_cost_before: record.average_cost_price,
                    average_cost_after: average_after,
                    total_cost: input.unit_cost * Decimal::from(input.quantity),
                    pricing: Some(PricingFields {
                        target_profit_percent: input.target_profit_percent,
                        percent_discount: input.percent_discount,
                        calculated_price: derivation.calculated_price,
                        calculated_price_final: derivation.calculated_price_final,
                        profit_per_item: derivation.profit_per_item,
                        margin: derivation.margin,
                        markup: derivation.markup,
                    }),
                    reason: StockTransactionReason::Restock,
                    reference: None,
                    performed_by,
                })
                .await;

            let _ = self
                .event_sender
                .send(Event::StockReceived {
                    stock_record_id,
                    quantity: input.quantity,
                    new_quantity: quantity_after,
                })
                .await;

            let mut updated = record;
            updated.quantity = quantity_after;
            updated.cost_price = input.unit_cost;
            updated.average_cost_price = average_after;
            updated.selling_price = derivation.calculated_price;
            updated.discount_percent = input.percent_discount;
            updated.final_price = derivation.calculated_price_final;
            updated.version += 1;
            return Ok(updated);
        }

        Err(ServiceError::InternalError(format!(
            "stock receipt for {stock_record_id} exceeded {MAX_RECEIVE_RETRIES} version retries"
        )))
    }

    /// Receives a lot for a (product, variant, size) triple, creating the
    /// record on first receipt.
    ///
    /// Creation races on the unique `sku` index are resolved by falling back
    /// to the row the winner inserted.
    #[instrument(skip(self, identity), fields(sku = %identity.sku))]
    pub async fn receive_for(
        &self,
        identity: StockIdentity,
        input: ReceiveStock,
        performed_by: Option<Uuid>,
    ) -> Result<stock_record::Model, ServiceError> {
        if let Some(existing) = self.find_by_sku(&identity.sku).await? {
            return self.receive_stock(existing.id, input, performed_by).await;
        }

        let model = stock_record::ActiveModel {
            sku: Set(identity.sku.clone()),
            product_id: Set(identity.product_id),
            variant: Set(identity.variant),
            size: Set(identity.size),
            quantity: Set(0),
            reserved_quantity: Set(0),
            cost_price: Set(Decimal::ZERO),
            average_cost_price: Set(Decimal::ZERO),
            selling_price: Set(Decimal::ZERO),
            discount_percent: Set(Decimal::ZERO),
            final_price: Set(Decimal::ZERO),
            low_stock_threshold: Set(identity.low_stock_threshold),
            version: Set(0),
            ..Default::default()
        };

        let record_id = match model.insert(&*self.db).await {
            Ok(record) => record.id,
            Err(insert_err) => {
                // Lost the creation race; the unique sku index means exactly
                // one row exists now.
                match self.find_by_sku(&identity.sku).await? {
                    Some(existing) => existing.id,
                    None => return Err(ServiceError::DatabaseError(insert_err)),
                }
            }
        };

        self.receive_stock(record_id, input, performed_by).await
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<stock_record::Model>, ServiceError> {
        StockRecords::find()
            .filter(Column::Sku.eq(sku))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn weighted_average_blends_lots_by_quantity() {
        assert_eq!(weighted_average(10, dec!(100), 5, dec!(130)), dec!(110));
    }

    #[test]
    fn weighted_average_of_empty_stock_is_lot_cost() {
        assert_eq!(weighted_average(0, dec!(0), 5, dec!(42)), dec!(42));
    }

    #[test]
    fn price_derivation_at_fifty_percent_profit() {
        let d = derive_price(dec!(100), dec!(50), dec!(0)).unwrap();
        assert_eq!(d.calculated_price, dec!(200));
        assert_eq!(d.calculated_price_final, dec!(200));
        assert_eq!(d.profit_per_item, dec!(100));
        assert_eq!(d.margin, dec!(0.5));
        assert_eq!(d.markup, dec!(1));
    }

    #[test]
    fn discount_comes_off_the_calculated_price() {
        let d = derive_price(dec!(100), dec!(50), dec!(10)).unwrap();
        assert_eq!(d.calculated_price, dec!(200));
        assert_eq!(d.calculated_price_final, dec!(180));
        assert_eq!(d.profit_per_item, dec!(80));
    }

    #[test]
    fn hundred_percent_inputs_are_rejected() {
        assert_matches!(
            derive_price(dec!(100), dec!(100), dec!(0)),
            Err(ServiceError::InvalidPricingInput(_))
        );
        assert_matches!(
            derive_price(dec!(100), dec!(0), dec!(100)),
            Err(ServiceError::InvalidPricingInput(_))
        );
        assert_matches!(
            derive_price(dec!(100), dec!(-1), dec!(0)),
            Err(ServiceError::InvalidPricingInput(_))
        );
    }

    #[test]
    fn zero_cost_basis_is_rejected() {
        assert_matches!(
            derive_price(dec!(0), dec!(10), dec!(0)),
            Err(ServiceError::InvalidPricingInput(_))
        );
    }
}
