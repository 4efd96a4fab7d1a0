use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per (product, variant, size) triple.
///
/// `quantity` is physically on hand; `reserved_quantity` is soft-held for
/// in-flight orders. Both are mutated only through conditional updates in the
/// reservation and costing services, never through read-then-write. Records
/// are never deleted; a decommissioned SKU is zeroed out.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub sku: String,
    pub product_id: Uuid,
    pub variant: String,
    pub size: String,
    pub quantity: i32,
    pub reserved_quantity: i32,
    /// Unit cost of the most recently received lot.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cost_price: Decimal,
    /// Weighted average across all lots ever received.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub average_cost_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub selling_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_percent: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub final_price: Decimal,
    pub low_stock_threshold: i32,
    /// Optimistic-lock counter for composite updates (weighted-average
    /// recomputation cannot be expressed as a blind increment).
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Units that can still be promised to new orders.
    pub fn available(&self) -> i32 {
        (self.quantity - self.reserved_quantity).max(0)
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.available() <= 0
    }

    pub fn is_low_stock(&self) -> bool {
        let available = self.available();
        available > 0 && available <= self.low_stock_threshold
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_transaction::Entity")]
    StockTransactions,
}

impl Related<super::stock_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockTransactions.def()
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
