use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_orders_table::Migration),
            Box::new(m20240101_000002_create_pending_checkouts_table::Migration),
            Box::new(m20240101_000003_create_reconciliation_errors_table::Migration),
            Box::new(m20240101_000004_create_order_counters_table::Migration),
        ]
    }
}

mod m20240101_000001_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_orders_table"
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
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::Remarks).string().null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(Orders::ProviderRef).string().null())
                        .col(ColumnDef::new(Orders::Items).json().not_null())
                        .col(ColumnDef::new(Orders::TotalCents).big_integer().null())
                        .col(ColumnDef::new(Orders::SellerNote).string().null())
                        .col(ColumnDef::new(Orders::BuyerEmail).string().null())
                        .col(ColumnDef::new(Orders::BuyerName).string().null())
                        .col(ColumnDef::new(Orders::BuyerPhone).string().null())
                        .col(ColumnDef::new(Orders::BuyerAddress).string().null())
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

            // Allocation retries once when an insert hits this index.
            manager
                .create_index(
                    Index::create()
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
                        .name("idx_orders_provider_ref")
                        .table(Orders::Table)
                        .col(Orders::ProviderRef)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        Status,
        Remarks,
        PaymentMethod,
        ProviderRef,
        Items,
        TotalCents,
        SellerNote,
        BuyerEmail,
        BuyerName,
        BuyerPhone,
        BuyerAddress,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_pending_checkouts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_pending_checkouts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PendingCheckouts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PendingCheckouts::ProviderRef)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PendingCheckouts::Items).json().not_null())
                        .col(
                            ColumnDef::new(PendingCheckouts::TotalCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PendingCheckouts::SellerNote).string().null())
                        .col(ColumnDef::new(PendingCheckouts::Buyer).json().null())
                        .col(
                            ColumnDef::new(PendingCheckouts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PendingCheckouts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PendingCheckouts {
        Table,
        ProviderRef,
        Items,
        TotalCents,
        SellerNote,
        Buyer,
        CreatedAt,
    }
}

mod m20240101_000003_create_reconciliation_errors_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_reconciliation_errors_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReconciliationErrors::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReconciliationErrors::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReconciliationErrors::ProviderRef)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ReconciliationErrors::Message)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReconciliationErrors::AmountCents)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ReconciliationErrors::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReconciliationErrors::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReconciliationErrors {
        Table,
        Id,
        ProviderRef,
        Message,
        AmountCents,
        CreatedAt,
    }
}

mod m20240101_000004_create_order_counters_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_order_counters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderCounters::Year)
                                .integer()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderCounters::LastSequence)
                                .integer()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderCounters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderCounters {
        Table,
        Year,
        LastSequence,
    }
}
