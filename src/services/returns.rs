use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::order::{Entity as Orders, OrderStatus};
use crate::entities::return_item::{self, Entity as ReturnItems};
use crate::entities::return_request::{
    self, Column, Entity as ReturnRequests, RefundMethod, ReturnStatus,
};
use crate::entities::stock_transaction::StockTransactionReason;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::ledger::LedgerReference;
use crate::services::reservations::ReservationService;

lazy_static! {
    static ref RETURNS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "returns_created_total",
        "Total number of return requests opened"
    )
    .expect("metric can be created");
    static ref RETURN_TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "return_transitions_total",
            "Return request status transitions, by target status"
        ),
        &["to"]
    )
    .expect("metric can be created");
}

/// One returned line: which record gets re-credited once goods arrive back.
#[derive(Debug, Clone, Copy)]
pub struct ReturnLine {
    pub stock_record_id: Uuid,
    pub quantity: i32,
}

/// Drives the post-delivery return lifecycle.
///
/// The only stock side effect is at `received`, when the warehouse confirms
/// the goods physically came back. Refund execution is external; this service
/// records the chosen method and the human confirmation.
#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    reservations: ReservationService,
}

impl ReturnService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        let reservations = ReservationService::new(db.clone(), event_sender.clone());
        Self {
            db,
            event_sender,
            reservations,
        }
    }

    async fn load(&self, return_id: Uuid) -> Result<return_request::Model, ServiceError> {
        ReturnRequests::find_by_id(return_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("return request {return_id}")))
    }

    fn parsed_status(ret: &return_request::Model) -> Result<ReturnStatus, ServiceError> {
        ret.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "return request {} carries unknown status {:?}",
                ret.id, ret.status
            ))
        })
    }

    /// Version-guarded status change with optional column side-writes.
    ///
    /// `set_prior` of `Some(x)` rewrites `prior_status` to `x` (including
    /// clearing it); `None` leaves the column alone.
    async fn apply(
        &self,
        ret: &return_request::Model,
        to: ReturnStatus,
        set_prior: Option<Option<String>>,
        set_refund_method: Option<RefundMethod>,
    ) -> Result<return_request::Model, ServiceError> {
        let current = Self::parsed_status(ret)?;
        if !current.can_transition_to(to) {
            return Err(ServiceError::IllegalStateTransition(format!(
                "return request {}: {} -> {}",
                ret.id,
                current.as_str(),
                to.as_str()
            )));
        }

        let mut update = ReturnRequests::update_many()
            .col_expr(Column::Status, Expr::value(to.as_str()))
            .col_expr(Column::Version, Expr::value(ret.version + 1))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(prior) = set_prior.clone() {
            update = update.col_expr(Column::PriorStatus, Expr::value(prior));
        }
        if let Some(method) = set_refund_method {
            update = update.col_expr(Column::RefundMethod, Expr::value(Some(method.as_str())));
        }

        let result = update
            .filter(Column::Id.eq(ret.id))
            .filter(Column::Version.eq(ret.version))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::IllegalStateTransition(format!(
                "return request {} was modified concurrently; transition to {} not applied",
                ret.id,
                to.as_str()
            )));
        }

        RETURN_TRANSITIONS_TOTAL.with_label_values(&[to.as_str()]).inc();
        let _ = self
            .event_sender
            .send(Event::ReturnStatusChanged {
                return_id: ret.id,
                old_status: current.as_str().to_string(),
                new_status: to.as_str().to_string(),
            })
            .await;

        let mut updated = ret.clone();
        updated.status = to.as_str().to_string();
        updated.version += 1;
        if let Some(prior) = set_prior {
            updated.prior_status = prior;
        }
        if let Some(method) = set_refund_method {
            updated.refund_method = Some(method.as_str().to_string());
        }
        Ok(updated)
    }

    /// Opens a return request for a delivered order.
    #[instrument(skip(self, lines))]
    pub async fn create(
        &self,
        order_id: Uuid,
        reason: Option<String>,
        lines: &[ReturnLine],
    ) -> Result<return_request::Model, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "a return request needs at least one line".to_string(),
            ));
        }
        for line in lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "return line quantity must be positive".to_string(),
                ));
            }
        }

        let order = Orders::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;
        match order.status() {
            Some(OrderStatus::Delivered) | Some(OrderStatus::Completed) => {}
            _ => {
                return Err(ServiceError::IllegalStateTransition(format!(
                    "order {order_id} in status {} is not eligible for return",
                    order.status
                )))
            }
        }

        let ret = return_request::ActiveModel {
            order_id: Set(order_id),
            status: Set(ReturnStatus::Pending.as_str().to_string()),
            prior_status: Set(None),
            reason: Set(reason),
            refund_method: Set(None),
            refund_confirmed: Set(false),
            refund_confirmed_by: Set(None),
            version: Set(0),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        for line in lines {
            return_item::ActiveModel {
                return_request_id: Set(ret.id),
                stock_record_id: Set(line.stock_record_id),
                quantity: Set(line.quantity),
                ..Default::default()
            }
            .insert(&*self.db)
            .await?;
        }

        RETURNS_CREATED_TOTAL.inc();
        let _ = self
            .event_sender
            .send(Event::ReturnRequested {
                return_id: ret.id,
                order_id,
            })
            .await;
        Ok(ret)
    }

    /// `pending -> approved`.
    #[instrument(skip(self))]
    pub async fn approve(&self, return_id: Uuid) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        self.apply(&ret, ReturnStatus::Approved, None, None).await
    }

    /// `pending -> rejected`. Terminal, no stock effect.
    #[instrument(skip(self))]
    pub async fn reject(&self, return_id: Uuid) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        self.apply(&ret, ReturnStatus::Rejected, None, None).await
    }

    /// `approved -> shipping`: customer handed the goods to the carrier.
    #[instrument(skip(self))]
    pub async fn mark_shipping(
        &self,
        return_id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        self.apply(&ret, ReturnStatus::Shipping, None, None).await
    }

    /// `shipping -> received`: warehouse confirms physical receipt, and every
    /// returned line is credited back to saleable stock.
    #[instrument(skip(self))]
    pub async fn mark_received(
        &self,
        return_id: Uuid,
        performed_by: Option<Uuid>,
    ) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        let updated = self.apply(&ret, ReturnStatus::Received, None, None).await?;

        let items = ReturnItems::find()
            .filter(return_item::Column::ReturnRequestId.eq(return_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let reference = Some(LedgerReference::return_request(return_id));
        for item in &items {
            if let Err(err) = self
                .reservations
                .restock(
                    item.stock_record_id,
                    item.quantity,
                    StockTransactionReason::Return,
                    reference,
                    performed_by,
                )
                .await
            {
                warn!(
                    %return_id,
                    stock_record_id = %item.stock_record_id,
                    error = %err,
                    "failed to restock returned line"
                );
            }
        }
        Ok(updated)
    }

    /// `received -> refunded`, recording how the refund will be paid out.
    #[instrument(skip(self))]
    pub async fn record_refund(
        &self,
        return_id: Uuid,
        method: RefundMethod,
    ) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        self.apply(&ret, ReturnStatus::Refunded, None, Some(method))
            .await
    }

    /// Human confirmation that the refund transfer went through.
    #[instrument(skip(self))]
    pub async fn confirm_refund(
        &self,
        return_id: Uuid,
        confirmed_by: Uuid,
    ) -> Result<(), ServiceError> {
        let ret = self.load(return_id).await?;
        if Self::parsed_status(&ret)? != ReturnStatus::Refunded {
            return Err(ServiceError::IllegalStateTransition(format!(
                "return request {return_id} in status {} has no refund to confirm",
                ret.status
            )));
        }
        let method = ret.refund_method().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "return request {return_id} is refunded but has no refund method"
            ))
        })?;

        let result = ReturnRequests::update_many()
            .col_expr(Column::RefundConfirmed, Expr::value(true))
            .col_expr(Column::RefundConfirmedBy, Expr::value(Some(confirmed_by)))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(return_id))
            .filter(Column::Status.eq(ReturnStatus::Refunded.as_str()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::IllegalStateTransition(format!(
                "return request {return_id} left the refunded state before confirmation"
            )));
        }

        let _ = self
            .event_sender
            .send(Event::ReturnRefundRecorded {
                return_id,
                method: method.as_str().to_string(),
                confirmed_at: Utc::now(),
            })
            .await;
        Ok(())
    }

    /// `received|refunded -> completed`.
    #[instrument(skip(self))]
    pub async fn complete(&self, return_id: Uuid) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        self.apply(&ret, ReturnStatus::Completed, None, None).await
    }

    /// Customer withdraws the return; parked in `cancel_pending` until staff
    /// decide. The interrupted state is kept for resumption.
    #[instrument(skip(self))]
    pub async fn request_cancel(
        &self,
        return_id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        let prior = ret.status.clone();
        self.apply(&ret, ReturnStatus::CancelPending, Some(Some(prior)), None)
            .await
    }

    /// Staff approval of the withdrawal. Terminal, no stock effect.
    #[instrument(skip(self))]
    pub async fn approve_cancel(
        &self,
        return_id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        self.apply(&ret, ReturnStatus::Canceled, Some(None), None)
            .await
    }

    /// Staff rejection of the withdrawal: the request resumes where it was.
    #[instrument(skip(self))]
    pub async fn reject_cancel(
        &self,
        return_id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let ret = self.load(return_id).await?;
        let resume = ret.prior_status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "return request {return_id} is cancel_pending without a prior status"
            ))
        })?;
        self.apply(&ret, resume, Some(None), None).await
    }
}
