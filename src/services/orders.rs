use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::order::{self, CancelStatus, Column, Entity as Orders, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItems};
use crate::entities::stock_transaction::StockTransactionReason;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::ledger::LedgerReference;
use crate::services::reservations::{LineReservation, ReservationService};

lazy_static! {
    static ref ORDERS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "orders_created_total",
        "Total number of orders created with all lines reserved"
    )
    .expect("metric can be created");
    static ref ORDER_TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "order_transitions_total",
            "Order status transitions, by target status"
        ),
        &["to"]
    )
    .expect("metric can be created");
}

/// One requested line of a new order.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub stock_record_id: Uuid,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Inputs for order creation.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub customer_id: Uuid,
    pub lines: Vec<NewOrderLine>,
}

/// Drives the order lifecycle and fires the stock side effects that hang off
/// specific transitions.
///
/// Status changes are version-guarded so two workers cannot drive the same
/// order through a transition twice; the guarded status change is taken
/// before its stock side effects, and a failed side effect reverts it.
#[derive(Clone)]
pub struct OrderFulfillmentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    reservations: ReservationService,
}

impl OrderFulfillmentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        let reservations = ReservationService::new(db.clone(), event_sender.clone());
        Self {
            db,
            event_sender,
            reservations,
        }
    }

    async fn load_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Orders::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))
    }

    async fn load_items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        OrderItems::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    fn parsed_status(order: &order::Model) -> Result<OrderStatus, ServiceError> {
        order.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "order {} carries unknown status {:?}",
                order.id, order.status
            ))
        })
    }

    /// Version-guarded status change. Fails without side effects if the
    /// machine does not permit the move or another worker got there first.
    async fn transition(
        &self,
        order_id: Uuid,
        to: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = self.load_order(order_id).await?;
        let current = Self::parsed_status(&order)?;
        if !current.can_transition_to(to) {
            return Err(ServiceError::IllegalStateTransition(format!(
                "order {order_id}: {} -> {}",
                current.as_str(),
                to.as_str()
            )));
        }

        let result = Orders::update_many()
            .col_expr(Column::Status, Expr::value(to.as_str()))
            .col_expr(Column::Version, Expr::value(order.version + 1))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(order_id))
            .filter(Column::Version.eq(order.version))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::IllegalStateTransition(format!(
                "order {order_id} was modified concurrently; transition to {} not applied",
                to.as_str()
            )));
        }

        ORDER_TRANSITIONS_TOTAL.with_label_values(&[to.as_str()]).inc();
        let _ = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: current.as_str().to_string(),
                new_status: to.as_str().to_string(),
            })
            .await;

        let mut updated = order;
        updated.status = to.as_str().to_string();
        updated.version += 1;
        Ok(updated)
    }

    /// Puts a status back outside the state machine, used only to undo a
    /// claimed transition whose side effects failed.
    async fn revert_status(&self, order_id: Uuid, to: OrderStatus) -> Result<(), ServiceError> {
        Orders::update_many()
            .col_expr(Column::Status, Expr::value(to.as_str()))
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Creates an order with every line reserved, all or nothing.
    ///
    /// Reservation happens before the order rows are written; if persisting
    /// the order fails, the holds are released again.
    #[instrument(skip(self, new_order), fields(order_number = %new_order.order_number))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<order::Model, ServiceError> {
        if new_order.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "an order needs at least one line".to_string(),
            ));
        }
        for line in &new_order.lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "line for {} has non-positive quantity",
                    line.sku
                )));
            }
        }

        let order_id = Uuid::new_v4();
        let reservations: Vec<LineReservation> = new_order
            .lines
            .iter()
            .map(|l| LineReservation {
                stock_record_id: l.stock_record_id,
                quantity: l.quantity,
            })
            .collect();
        self.reservations
            .reserve_lines(&reservations, Some(order_id))
            .await?;

        let total_amount: Decimal = new_order
            .lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(new_order.order_number),
            customer_id: Set(new_order.customer_id),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            cancel_status: Set(None),
            total_amount: Set(total_amount),
            version: Set(0),
            ..Default::default()
        };

        let persisted = async {
            let order = order_model.insert(&*self.db).await?;
            for line in &new_order.lines {
                order_item::ActiveModel {
                    order_id: Set(order_id),
                    stock_record_id: Set(line.stock_record_id),
                    sku: Set(line.sku.clone()),
                    quantity: Set(line.quantity),
                    unit_price: Set(line.unit_price),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
            }
            Ok::<order::Model, sea_orm::DbErr>(order)
        }
        .await;

        let order = match persisted {
            Ok(order) => order,
            Err(err) => {
                // Give the holds back and drop any partial rows.
                let _ = OrderItems::delete_many()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .exec(&*self.db)
                    .await;
                let _ = Orders::delete_many()
                    .filter(Column::Id.eq(order_id))
                    .exec(&*self.db)
                    .await;
                for line in &reservations {
                    if let Err(release_err) = self
                        .reservations
                        .release(line.stock_record_id, line.quantity, Some(order_id))
                        .await
                    {
                        warn!(
                            %order_id,
                            stock_record_id = %line.stock_record_id,
                            error = %release_err,
                            "failed to release reservation after order persist failure"
                        );
                    }
                }
                return Err(ServiceError::DatabaseError(err));
            }
        };

        ORDERS_CREATED_TOTAL.inc();
        let _ = self.event_sender.send(Event::OrderCreated(order_id)).await;
        Ok(order)
    }

    /// `pending -> confirmed`. No stock effect; the holds were placed at
    /// creation.
    #[instrument(skip(self))]
    pub async fn confirm(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::Confirmed).await
    }

    /// `confirmed -> assigned_to_shipper`: the auto stock-out point.
    ///
    /// Commits every line's hold into a physical deduction. If any line fails
    /// (an intervening adjustment can leave reserved units unbacked), the
    /// already-committed lines are restored and the order stays `confirmed`.
    #[instrument(skip(self))]
    pub async fn assign_to_shipper(
        &self,
        order_id: Uuid,
        performed_by: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        let items = self.load_items(order_id).await?;
        let order = self
            .transition(order_id, OrderStatus::AssignedToShipper)
            .await?;

        let reference = Some(LedgerReference::order(order_id));
        for (idx, item) in items.iter().enumerate() {
            if let Err(err) = self
                .reservations
                .commit(item.stock_record_id, item.quantity, reference, performed_by)
                .await
            {
                for done in &items[..idx] {
                    if let Err(undo_err) = self
                        .undo_commit(order_id, done.stock_record_id, done.quantity, performed_by)
                        .await
                    {
                        warn!(
                            %order_id,
                            stock_record_id = %done.stock_record_id,
                            error = %undo_err,
                            "failed to restore committed line after aborted shipper assignment"
                        );
                    }
                }
                self.revert_status(order_id, OrderStatus::Confirmed).await?;
                return Err(err);
            }
        }
        Ok(order)
    }

    /// Reverses one committed line: credit the units back, then re-hold them.
    async fn undo_commit(
        &self,
        order_id: Uuid,
        stock_record_id: Uuid,
        quantity: i32,
        performed_by: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        self.reservations
            .restock(
                stock_record_id,
                quantity,
                StockTransactionReason::Cancelled,
                Some(LedgerReference::order(order_id)),
                performed_by,
            )
            .await?;
        self.reservations
            .reserve(stock_record_id, quantity, Some(order_id))
            .await
    }

    /// `assigned_to_shipper -> out_for_delivery`.
    #[instrument(skip(self))]
    pub async fn mark_out_for_delivery(
        &self,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::OutForDelivery).await
    }

    /// `out_for_delivery -> delivered`.
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::Delivered).await
    }

    /// `delivered -> completed`.
    #[instrument(skip(self))]
    pub async fn complete(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::Completed).await
    }

    /// `out_for_delivery -> delivery_failed`: items go back to saleable
    /// quantity immediately.
    #[instrument(skip(self))]
    pub async fn mark_delivery_failed(
        &self,
        order_id: Uuid,
        performed_by: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        let order = self
            .transition(order_id, OrderStatus::DeliveryFailed)
            .await?;
        let items = self.load_items(order_id).await?;
        let reference = Some(LedgerReference::order(order_id));
        for item in &items {
            if let Err(err) = self
                .reservations
                .restock(
                    item.stock_record_id,
                    item.quantity,
                    StockTransactionReason::DeliveryFailed,
                    reference,
                    performed_by,
                )
                .await
            {
                warn!(
                    %order_id,
                    stock_record_id = %item.stock_record_id,
                    error = %err,
                    "failed to restock line after delivery failure"
                );
            }
        }
        Ok(order)
    }

    /// `delivery_failed -> returning_to_warehouse`. Stock was already
    /// credited when the failure was recorded.
    #[instrument(skip(self))]
    pub async fn mark_returning_to_warehouse(
        &self,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::ReturningToWarehouse)
            .await
    }

    /// Cancels an order outright.
    ///
    /// Before commit the holds are released; after commit (shipper assigned
    /// but not yet out for delivery) the committed units are restocked.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: Uuid,
        performed_by: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        let order = self.load_order(order_id).await?;
        let current = Self::parsed_status(&order)?;
        if !current.is_cancellable() {
            return Err(ServiceError::IllegalStateTransition(format!(
                "order {order_id} in status {} cannot be cancelled",
                current.as_str()
            )));
        }

        let cancelled = self.transition(order_id, OrderStatus::Cancelled).await?;
        let items = self.load_items(order_id).await?;
        for item in &items {
            let outcome = if current.is_before_commit() {
                self.reservations
                    .release(item.stock_record_id, item.quantity, Some(order_id))
                    .await
            } else {
                self.reservations
                    .restock(
                        item.stock_record_id,
                        item.quantity,
                        StockTransactionReason::Cancelled,
                        Some(LedgerReference::order(order_id)),
                        performed_by,
                    )
                    .await
            };
            if let Err(err) = outcome {
                warn!(
                    %order_id,
                    stock_record_id = %item.stock_record_id,
                    error = %err,
                    "failed stock compensation during order cancellation"
                );
            }
        }

        let _ = self.event_sender.send(Event::OrderCancelled(order_id)).await;
        Ok(cancelled)
    }

    /// Records a customer cancellation request; the fulfillment machine is
    /// not disturbed until staff decide.
    #[instrument(skip(self))]
    pub async fn request_cancel(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let order = self.load_order(order_id).await?;
        let current = Self::parsed_status(&order)?;
        if !current.is_cancellable() {
            return Err(ServiceError::IllegalStateTransition(format!(
                "order {order_id} in status {} cannot request cancellation",
                current.as_str()
            )));
        }
        if order.cancel_status().is_some() {
            return Err(ServiceError::IllegalStateTransition(format!(
                "order {order_id} already has a cancellation decision pending or made"
            )));
        }

        let result = Orders::update_many()
            .col_expr(
                Column::CancelStatus,
                Expr::value(Some(CancelStatus::CancelPending.as_str())),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(order_id))
            .filter(Column::CancelStatus.is_null())
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::IllegalStateTransition(format!(
                "order {order_id} already has a cancellation request"
            )));
        }

        let _ = self
            .event_sender
            .send(Event::OrderCancelRequested(order_id))
            .await;
        Ok(())
    }

    /// Staff approval of a pending cancellation request. Runs the same side
    /// effects as a direct cancel.
    #[instrument(skip(self))]
    pub async fn approve_cancel(
        &self,
        order_id: Uuid,
        performed_by: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        self.decide_cancel(order_id, CancelStatus::CancelApproved)
            .await?;
        self.cancel(order_id, performed_by).await
    }

    /// Staff rejection of a pending cancellation request. Fulfillment
    /// continues where it was.
    #[instrument(skip(self))]
    pub async fn reject_cancel(&self, order_id: Uuid) -> Result<(), ServiceError> {
        self.decide_cancel(order_id, CancelStatus::CancelRejected)
            .await
    }

    async fn decide_cancel(
        &self,
        order_id: Uuid,
        decision: CancelStatus,
    ) -> Result<(), ServiceError> {
        let order = self.load_order(order_id).await?;
        match order.cancel_status() {
            Some(CancelStatus::CancelPending) => {}
            other => {
                return Err(ServiceError::IllegalStateTransition(format!(
                    "order {order_id} has no pending cancellation request (found {other:?})"
                )))
            }
        }

        let result = Orders::update_many()
            .col_expr(Column::CancelStatus, Expr::value(Some(decision.as_str())))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(order_id))
            .filter(Column::CancelStatus.eq(CancelStatus::CancelPending.as_str()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::IllegalStateTransition(format!(
                "cancellation request for order {order_id} was decided concurrently"
            )));
        }
        Ok(())
    }
}
