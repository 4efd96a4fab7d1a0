use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::ledger_gap::{self, Entity as LedgerGaps};
use crate::entities::stock_transaction::{
    Column, Entity as StockTransactions, Model as StockTransactionModel, StockTransactionReason,
    TransactionType,
};
use crate::errors::ServiceError;
use crate::queries::Query;

/// Filtered page of ledger history, newest first.
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerHistoryQuery {
    pub stock_record_id: Option<Uuid>,
    pub tx_type: Option<TransactionType>,
    pub reason: Option<StockTransactionReason>,
    pub performed_by: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: u64,
    pub offset: u64,
}

impl Default for LedgerHistoryQuery {
    fn default() -> Self {
        Self {
            stock_record_id: None,
            tx_type: None,
            reason: None,
            performed_by: None,
            from: None,
            to: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[async_trait]
impl Query for LedgerHistoryQuery {
    type Result = Vec<StockTransactionModel>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let mut query = StockTransactions::find();
        if let Some(id) = self.stock_record_id {
            query = query.filter(Column::StockRecordId.eq(id));
        }
        if let Some(tx_type) = self.tx_type {
            query = query.filter(Column::TxType.eq(tx_type.as_str()));
        }
        if let Some(reason) = self.reason {
            query = query.filter(Column::Reason.eq(reason.as_str()));
        }
        if let Some(actor) = self.performed_by {
            query = query.filter(Column::PerformedBy.eq(actor));
        }
        if let Some(from) = self.from {
            query = query.filter(Column::CreatedAt.gte(from));
        }
        if let Some(to) = self.to {
            query = query.filter(Column::CreatedAt.lt(to));
        }

        query
            .order_by_desc(Column::CreatedAt)
            .limit(self.limit)
            .offset(self.offset)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Every ledger entry caused by one order or return request.
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerByReferenceQuery {
    pub reference_id: Uuid,
}

#[async_trait]
impl Query for LedgerByReferenceQuery {
    type Result = Vec<StockTransactionModel>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        StockTransactions::find()
            .filter(Column::ReferenceId.eq(self.reference_id))
            .order_by_asc(Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[derive(Debug, FromQueryResult)]
struct BalanceRow {
    balance: Option<i64>,
}

/// Net quantity change across a record's whole ledger. Matches the record's
/// current quantity unless a reconciliation gap exists.
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerBalanceQuery {
    pub stock_record_id: Uuid,
}

#[async_trait]
impl Query for LedgerBalanceQuery {
    type Result = i64;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let row = StockTransactions::find()
            .select_only()
            .column_as(Expr::col(Column::QuantityChange).sum(), "balance")
            .filter(Column::StockRecordId.eq(self.stock_record_id))
            .into_model::<BalanceRow>()
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(row.and_then(|r| r.balance).unwrap_or(0))
    }
}

/// Unresolved reconciliation gaps, oldest first, for operator remediation.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnresolvedGapsQuery {
    pub limit: u64,
    pub offset: u64,
}

#[async_trait]
impl Query for UnresolvedGapsQuery {
    type Result = Vec<ledger_gap::Model>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        LedgerGaps::find()
            .filter(ledger_gap::Column::Resolved.eq(false))
            .order_by_asc(ledger_gap::Column::CreatedAt)
            .limit(self.limit)
            .offset(self.offset)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Marks a reconciliation gap as handled by an operator.
pub async fn resolve_gap(db: &DatabaseConnection, gap_id: Uuid) -> Result<(), ServiceError> {
    let result = LedgerGaps::update_many()
        .col_expr(ledger_gap::Column::Resolved, Expr::value(true))
        .filter(ledger_gap::Column::Id.eq(gap_id))
        .filter(ledger_gap::Column::Resolved.eq(false))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(format!(
            "unresolved ledger gap {gap_id}"
        )));
    }
    Ok(())
}
