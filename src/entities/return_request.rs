use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a post-delivery return request.
///
/// The cancel detour is entered from `pending`, `approved`, or `shipping`;
/// a rejected cancel resumes the state stored in `prior_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Shipping,
    Received,
    Refunded,
    Completed,
    CancelPending,
    Canceled,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "pending",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Rejected => "rejected",
            ReturnStatus::Shipping => "shipping",
            ReturnStatus::Received => "received",
            ReturnStatus::Refunded => "refunded",
            ReturnStatus::Completed => "completed",
            ReturnStatus::CancelPending => "cancel_pending",
            ReturnStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReturnStatus::Pending),
            "approved" => Some(ReturnStatus::Approved),
            "rejected" => Some(ReturnStatus::Rejected),
            "shipping" => Some(ReturnStatus::Shipping),
            "received" => Some(ReturnStatus::Received),
            "refunded" => Some(ReturnStatus::Refunded),
            "completed" => Some(ReturnStatus::Completed),
            "cancel_pending" => Some(ReturnStatus::CancelPending),
            "canceled" => Some(ReturnStatus::Canceled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, to: ReturnStatus) -> bool {
        use ReturnStatus::*;
        match (self, to) {
            (Pending, Approved) | (Pending, Rejected) => true,
            (Approved, Shipping) => true,
            (Shipping, Received) => true,
            (Received, Refunded) | (Received, Completed) => true,
            (Refunded, Completed) => true,
            // Customer-initiated withdrawal, gated by staff approval.
            (Pending, CancelPending) | (Approved, CancelPending) | (Shipping, CancelPending) => {
                true
            }
            (CancelPending, Canceled) => true,
            // Resuming after a rejected cancel is handled via prior_status.
            (CancelPending, Pending) | (CancelPending, Approved) | (CancelPending, Shipping) => {
                true
            }
            _ => false,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReturnStatus::Rejected | ReturnStatus::Completed | ReturnStatus::Canceled
        )
    }
}

/// How the refund is paid out. Execution is external; the core only records
/// the choice and the human confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundMethod {
    Cash,
    BankTransfer,
}

impl RefundMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundMethod::Cash => "cash",
            RefundMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(RefundMethod::Cash),
            "bank_transfer" => Some(RefundMethod::BankTransfer),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "return_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    /// State to resume when a cancel request is rejected.
    pub prior_status: Option<String>,
    pub reason: Option<String>,
    pub refund_method: Option<String>,
    pub refund_confirmed: bool,
    pub refund_confirmed_by: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> Option<ReturnStatus> {
        ReturnStatus::from_str(&self.status)
    }

    pub fn prior_status(&self) -> Option<ReturnStatus> {
        self.prior_status.as_deref().and_then(ReturnStatus::from_str)
    }

    pub fn refund_method(&self) -> Option<RefundMethod> {
        self.refund_method.as_deref().and_then(RefundMethod::from_str)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::return_item::Entity")]
    ReturnItems,
}

impl Related<super::return_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnItems.def()
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
