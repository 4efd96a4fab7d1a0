use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_stock_records_table::Migration),
            Box::new(m20240301_000002_create_stock_transactions_table::Migration),
            Box::new(m20240301_000003_create_orders_table::Migration),
            Box::new(m20240301_000004_create_order_items_table::Migration),
            Box::new(m20240301_000005_create_return_tables::Migration),
            Box::new(m20240301_000006_create_ledger_gaps_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_stock_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_stock_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockRecords::Sku).string().not_null())
                        .col(ColumnDef::new(StockRecords::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockRecords::Variant).string().not_null())
                        .col(ColumnDef::new(StockRecords::Size).string().not_null())
                        .col(
                            ColumnDef::new(StockRecords::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::ReservedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::CostPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::AverageCostPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::SellingPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::DiscountPercent)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::FinalPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::LowStockThreshold)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_records_sku")
                        .table(StockRecords::Table)
                        .col(StockRecords::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // One record per (product, variant, size) triple.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_records_product_variant_size")
                        .table(StockRecords::Table)
                        .col(StockRecords::ProductId)
                        .col(StockRecords::Variant)
                        .col(StockRecords::Size)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockRecords {
        Table,
        Id,
        Sku,
        ProductId,
        Variant,
        Size,
        Quantity,
        ReservedQuantity,
        CostPrice,
        AverageCostPrice,
        SellingPrice,
        DiscountPercent,
        FinalPrice,
        LowStockThreshold,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_stock_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_stock_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::StockRecordId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransactions::TxType).string().not_null())
                        .col(
                            ColumnDef::new(StockTransactions::QuantityBefore)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::QuantityChange)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::QuantityAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::CostPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::AverageCostBefore)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::AverageCostAfter)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::TotalCost)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransactions::TargetProfitPercent).decimal())
                        .col(ColumnDef::new(StockTransactions::PercentDiscount).decimal())
                        .col(ColumnDef::new(StockTransactions::CalculatedPrice).decimal())
                        .col(
                            ColumnDef::new(StockTransactions::CalculatedPriceFinal)
                                .decimal(),
                        )
                        .col(ColumnDef::new(StockTransactions::ProfitPerItem).decimal())
                        .col(ColumnDef::new(StockTransactions::Margin).decimal())
                        .col(ColumnDef::new(StockTransactions::Markup).decimal())
                        .col(ColumnDef::new(StockTransactions::Reason).string().not_null())
                        .col(ColumnDef::new(StockTransactions::ReferenceId).uuid())
                        .col(ColumnDef::new(StockTransactions::ReferenceType).string())
                        .col(ColumnDef::new(StockTransactions::PerformedBy).uuid())
                        .col(
                            ColumnDef::new(StockTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_record_created")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::StockRecordId)
                        .col(StockTransactions::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_type_created")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::TxType)
                        .col(StockTransactions::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_reference")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::ReferenceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_performer_created")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::PerformedBy)
                        .col(StockTransactions::CreatedAt)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockTransactions {
        Table,
        Id,
        StockRecordId,
        TxType,
        QuantityBefore,
        QuantityChange,
        QuantityAfter,
        CostPrice,
        AverageCostBefore,
        AverageCostAfter,
        TotalCost,
        TargetProfitPercent,
        PercentDiscount,
        CalculatedPrice,
        CalculatedPriceFinal,
        ProfitPerItem,
        Margin,
        Markup,
        Reason,
        ReferenceId,
        ReferenceType,
        PerformedBy,
        CreatedAt,
    }
}

mod m20240301_000003_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::CancelStatus).string())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Status,
        CancelStatus,
        TotalAmount,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_order_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::StockRecordId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Sku).string().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderItems {
        Table,
        Id,
        OrderId,
        StockRecordId,
        Sku,
        Quantity,
        UnitPrice,
        CreatedAt,
    }
}

mod m20240301_000005_create_return_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_return_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReturnRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnRequests::OrderId).uuid().not_null())
                        .col(ColumnDef::new(ReturnRequests::Status).string().not_null())
                        .col(ColumnDef::new(ReturnRequests::PriorStatus).string())
                        .col(ColumnDef::new(ReturnRequests::Reason).string())
                        .col(ColumnDef::new(ReturnRequests::RefundMethod).string())
                        .col(
                            ColumnDef::new(ReturnRequests::RefundConfirmed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(ReturnRequests::RefundConfirmedBy).uuid())
                        .col(
                            ColumnDef::new(ReturnRequests::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ReturnRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_requests_order_id")
                        .table(ReturnRequests::Table)
                        .col(ReturnRequests::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ReturnItems::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(ReturnItems::ReturnRequestId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnItems::StockRecordId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(ReturnItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_items_return_request_id")
                        .table(ReturnItems::Table)
                        .col(ReturnItems::ReturnRequestId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReturnItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReturnRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ReturnRequests {
        Table,
        Id,
        OrderId,
        Status,
        PriorStatus,
        Reason,
        RefundMethod,
        RefundConfirmed,
        RefundConfirmedBy,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ReturnItems {
        Table,
        Id,
        ReturnRequestId,
        StockRecordId,
        Quantity,
        CreatedAt,
    }
}

mod m20240301_000006_create_ledger_gaps_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_ledger_gaps_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LedgerGaps::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(LedgerGaps::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(LedgerGaps::StockRecordId).uuid().not_null())
                        .col(ColumnDef::new(LedgerGaps::TxType).string().not_null())
                        .col(
                            ColumnDef::new(LedgerGaps::QuantityChange)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerGaps::Reason).string().not_null())
                        .col(ColumnDef::new(LedgerGaps::Detail).string().not_null())
                        .col(
                            ColumnDef::new(LedgerGaps::Resolved)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(LedgerGaps::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_gaps_resolved")
                        .table(LedgerGaps::Table)
                        .col(LedgerGaps::Resolved)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LedgerGaps::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum LedgerGaps {
        Table,
        Id,
        StockRecordId,
        TxType,
        QuantityChange,
        Reason,
        Detail,
        Resolved,
        CreatedAt,
    }
}
