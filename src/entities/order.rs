use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fulfillment lifecycle of an order.
///
/// Stock side effects hang off specific transitions (see the orders service):
/// reservations are placed at creation, committed at shipper assignment, and
/// restocked on delivery failure or post-commit cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    AssignedToShipper,
    OutForDelivery,
    Delivered,
    DeliveryFailed,
    ReturningToWarehouse,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::AssignedToShipper => "assigned_to_shipper",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::DeliveryFailed => "delivery_failed",
            OrderStatus::ReturningToWarehouse => "returning_to_warehouse",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "assigned_to_shipper" => Some(OrderStatus::AssignedToShipper),
            "out_for_delivery" => Some(OrderStatus::OutForDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "delivery_failed" => Some(OrderStatus::DeliveryFailed),
            "returning_to_warehouse" => Some(OrderStatus::ReturningToWarehouse),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Validates a status transition.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, AssignedToShipper)
                | (Confirmed, Cancelled)
                | (AssignedToShipper, OutForDelivery)
                | (AssignedToShipper, Cancelled)
                | (OutForDelivery, Delivered)
                | (OutForDelivery, DeliveryFailed)
                | (Delivered, Completed)
                | (DeliveryFailed, ReturningToWarehouse)
        )
    }

    /// True until stock has been physically committed.
    pub fn is_before_commit(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Cancellation (direct or approved request) is only allowed this early.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::AssignedToShipper
        )
    }
}

/// User-initiated cancellation request, gated by staff approval.
/// Kept separate from [`OrderStatus`] so a pending request does not disturb
/// the fulfillment machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelStatus {
    CancelPending,
    CancelApproved,
    CancelRejected,
}

impl CancelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelStatus::CancelPending => "cancel_pending",
            CancelStatus::CancelApproved => "cancel_approved",
            CancelStatus::CancelRejected => "cancel_rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cancel_pending" => Some(CancelStatus::CancelPending),
            "cancel_approved" => Some(CancelStatus::CancelApproved),
            "cancel_rejected" => Some(CancelStatus::CancelRejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: String,
    pub cancel_status: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::from_str(&self.status)
    }

    pub fn cancel_status(&self) -> Option<CancelStatus> {
        self.cancel_status.as_deref().and_then(CancelStatus::from_str)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}
