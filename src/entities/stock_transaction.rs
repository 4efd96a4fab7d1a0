use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    In,
    Out,
    Adjust,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::In => "in",
            TransactionType::Out => "out",
            TransactionType::Adjust => "adjust",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(TransactionType::In),
            "out" => Some(TransactionType::Out),
            "adjust" => Some(TransactionType::Adjust),
            _ => None,
        }
    }
}

/// Business reason behind a quantity change.
///
/// Each reason maps to exactly one [`TransactionType`] and a quantity sign via
/// the dispatch methods below; call sites never branch on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockTransactionReason {
    Restock,
    Manual,
    Sale,
    Return,
    DeliveryFailed,
    Cancelled,
    Damage,
    Lost,
    Adjustment,
    Other,
}

impl StockTransactionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockTransactionReason::Restock => "restock",
            StockTransactionReason::Manual => "manual",
            StockTransactionReason::Sale => "sale",
            StockTransactionReason::Return => "return",
            StockTransactionReason::DeliveryFailed => "delivery_failed",
            StockTransactionReason::Cancelled => "cancelled",
            StockTransactionReason::Damage => "damage",
            StockTransactionReason::Lost => "lost",
            StockTransactionReason::Adjustment => "adjustment",
            StockTransactionReason::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "restock" => Some(StockTransactionReason::Restock),
            "manual" => Some(StockTransactionReason::Manual),
            "sale" => Some(StockTransactionReason::Sale),
            "return" => Some(StockTransactionReason::Return),
            "delivery_failed" => Some(StockTransactionReason::DeliveryFailed),
            "cancelled" => Some(StockTransactionReason::Cancelled),
            "damage" => Some(StockTransactionReason::Damage),
            "lost" => Some(StockTransactionReason::Lost),
            "adjustment" => Some(StockTransactionReason::Adjustment),
            "other" => Some(StockTransactionReason::Other),
            _ => None,
        }
    }

    /// Ledger direction this reason produces.
    pub fn tx_type(&self) -> TransactionType {
        match self {
            StockTransactionReason::Restock
            | StockTransactionReason::Manual
            | StockTransactionReason::Return
            | StockTransactionReason::DeliveryFailed
            | StockTransactionReason::Cancelled => TransactionType::In,
            StockTransactionReason::Sale => TransactionType::Out,
            StockTransactionReason::Damage
            | StockTransactionReason::Lost
            | StockTransactionReason::Adjustment
            | StockTransactionReason::Other => TransactionType::Adjust,
        }
    }

    /// Whether the reason is a valid input to `restock` (quantity credit).
    pub fn credits_stock(&self) -> bool {
        self.tx_type() == TransactionType::In
    }

    /// Whether the reason is a valid input to `adjust` (signed correction).
    pub fn is_adjustment(&self) -> bool {
        self.tx_type() == TransactionType::Adjust
    }
}

/// Append-only ledger row. Never updated or deleted once written.
///
/// Invariant: `quantity_after = quantity_before + quantity_change`, and
/// `quantity_after` equals the stock record's `quantity` at commit time.
/// Pricing-derivation fields are populated only for `in` rows written by the
/// costing engine.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_record_id: Uuid,
    pub tx_type: String,
    pub quantity_before: i32,
    pub quantity_change: i32,
    pub quantity_after: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cost_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub average_cost_before: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub average_cost_after: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub target_profit_percent: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub percent_discount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub calculated_price: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub calculated_price_final: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub profit_per_item: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub margin: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub markup: Option<Decimal>,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    /// Null for system-triggered writes.
    pub performed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn tx_type(&self) -> Option<TransactionType> {
        TransactionType::from_str(&self.tx_type)
    }

    pub fn reason(&self) -> Option<StockTransactionReason> {
        StockTransactionReason::from_str(&self.reason)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_record::Entity",
        from = "Column::StockRecordId",
        to = "super::stock_record::Column::Id"
    )]
    StockRecord,
}

impl Related<super::stock_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockRecord.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }
        Ok(active_model)
    }
}
