use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::stock_record::{Column, Entity as StockRecords, Model as StockRecordModel};
use crate::errors::ServiceError;
use crate::queries::Query;

#[derive(Debug, Serialize, Deserialize)]
pub struct GetStockRecordQuery {
    pub stock_record_id: Uuid,
}

#[async_trait]
impl Query for GetStockRecordQuery {
    type Result = StockRecordModel;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        StockRecords::find_by_id(self.stock_record_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::StockRecordNotFound(self.stock_record_id))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetStockRecordBySkuQuery {
    pub sku: String,
}

#[async_trait]
impl Query for GetStockRecordBySkuQuery {
    type Result = StockRecordModel;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        StockRecords::find()
            .filter(Column::Sku.eq(self.sku.as_str()))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("stock record for sku {}", self.sku)))
    }
}

/// All variant/size rows of one product.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListStockByProductQuery {
    pub product_id: Uuid,
}

#[async_trait]
impl Query for ListStockByProductQuery {
    type Result = Vec<StockRecordModel>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        StockRecords::find()
            .filter(Column::ProductId.eq(self.product_id))
            .order_by_asc(Column::Sku)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Records whose available quantity has dropped to the threshold but not to
/// zero. Ordered with the most depleted first.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListLowStockQuery {
    pub limit: u64,
    pub offset: u64,
}

#[async_trait]
impl Query for ListLowStockQuery {
    type Result = Vec<StockRecordModel>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let available =
            || Expr::expr(Expr::col(Column::Quantity).sub(Expr::col(Column::ReservedQuantity)));
        StockRecords::find()
            .filter(available().lte(Expr::col(Column::LowStockThreshold)))
            .filter(available().gt(0))
            .order_by_asc(Column::Quantity)
            .limit(self.limit)
            .offset(self.offset)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Records with nothing left to promise.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListOutOfStockQuery {
    pub limit: u64,
    pub offset: u64,
}

#[async_trait]
impl Query for ListOutOfStockQuery {
    type Result = Vec<StockRecordModel>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        StockRecords::find()
            .filter(
                Expr::expr(Expr::col(Column::Quantity).sub(Expr::col(Column::ReservedQuantity)))
                    .lte(0),
            )
            .order_by_asc(Column::Sku)
            .limit(self.limit)
            .offset(self.offset)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}
