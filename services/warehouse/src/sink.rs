//! Sink - persists the star schema, replacing whatever was there
//!
//! A load is one transaction: truncate all five tables, insert the
//! dimensions, then the facts, commit. An error anywhere drops the
//! transaction, which rolls it back, so the previous snapshot survives.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::Config;
use crate::dimensions::{DimensionSet, SurrogateKey};
use crate::error::{EtlError, Result};
use crate::facts::{check_unique_transactions, FactRow};

/// Star schema DDL. FactSales references every dimension.
const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS DateDim (
    DateKey INT PRIMARY KEY,
    FullDate DATE NOT NULL UNIQUE,
    Year INT NOT NULL,
    Quarter INT NOT NULL,
    Month INT NOT NULL,
    DayOfWeek VARCHAR(20) NOT NULL,
    WeekOfYear INT NOT NULL
);

CREATE TABLE IF NOT EXISTS ProductDim (
    ProductKey INT PRIMARY KEY,
    ProductCategory VARCHAR(50),
    ProductName VARCHAR(100),
    UNIQUE (ProductCategory, ProductName)
);

CREATE TABLE IF NOT EXISTS RegionDim (
    RegionKey INT PRIMARY KEY,
    Region VARCHAR(50) UNIQUE
);

CREATE TABLE IF NOT EXISTS PaymentDim (
    PaymentKey INT PRIMARY KEY,
    PaymentMethod VARCHAR(50) UNIQUE
);

CREATE TABLE IF NOT EXISTS FactSales (
    TransactionID BIGINT PRIMARY KEY,
    DateKey INT REFERENCES DateDim(DateKey),
    ProductKey INT REFERENCES ProductDim(ProductKey),
    RegionKey INT REFERENCES RegionDim(RegionKey),
    PaymentKey INT REFERENCES PaymentDim(PaymentKey),
    UnitsSold INT,
    UnitPrice NUMERIC(12,2),
    TotalRevenue NUMERIC(12,2)
);
"#;

/// Rows written per table by one load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounts {
    pub date_rows: usize,
    pub product_rows: usize,
    pub region_rows: usize,
    pub payment_rows: usize,
    pub fact_rows: usize,
}

/// DateDim row as read back from the store
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredDateRow {
    #[sqlx(rename = "datekey")]
    pub date_key: SurrogateKey,
    #[sqlx(rename = "fulldate")]
    pub full_date: NaiveDate,
    pub year: i32,
    pub quarter: i32,
    pub month: i32,
    #[sqlx(rename = "dayofweek")]
    pub day_of_week: String,
    #[sqlx(rename = "weekofyear")]
    pub week_of_year: i32,
}

/// Handle on the target store. Acquired with `connect`, released with `close`.
pub struct Warehouse {
    pool: PgPool,
}

impl Warehouse {
    pub async fn connect(config: &Config) -> Result<Self> {
        let db_url = config
            .db_url
            .as_deref()
            .ok_or_else(|| EtlError::persist("store", "DB_URL env var missing"))?;
        if config.max_connections == 0 {
            return Err(EtlError::persist("store", "pool needs at least one connection"));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(db_url)
            .await
            .map_err(|e| EtlError::persist("store", format!("failed to connect: {}", e)))?;

        tracing::info!(max_connections = config.max_connections, "connected to store");
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Create the five tables if absent
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_DDL)
            .execute(&self.pool)
            .await
            .map_err(|e| EtlError::persist("schema", e))?;
        Ok(())
    }

    /// Replace the stored snapshot with `dims` and `facts`
    pub async fn replace(&self, dims: &DimensionSet, facts: &[FactRow]) -> Result<LoadCounts> {
        check_unique_transactions(facts)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::persist("store", e))?;

        sqlx::query("TRUNCATE TABLE FactSales, DateDim, ProductDim, RegionDim, PaymentDim")
            .execute(&mut *tx)
            .await
            .map_err(|e| EtlError::persist("truncate", e))?;

        // Dimensions first so the fact foreign keys resolve
        let counts = LoadCounts {
            date_rows: insert_dates(&mut tx, dims).await?,
            product_rows: insert_products(&mut tx, dims).await?,
            region_rows: insert_named(&mut tx, "RegionDim", "RegionKey", "Region", dims.region.rows())
                .await?,
            payment_rows: insert_named(
                &mut tx,
                "PaymentDim",
                "PaymentKey",
                "PaymentMethod",
                dims.payment.rows(),
            )
            .await?,
            fact_rows: insert_facts(&mut tx, facts).await?,
        };

        tx.commit()
            .await
            .map_err(|e| EtlError::persist("commit", e))?;

        tracing::info!(
            dates = counts.date_rows,
            products = counts.product_rows,
            regions = counts.region_rows,
            payments = counts.payment_rows,
            facts = counts.fact_rows,
            "snapshot replaced"
        );
        Ok(counts)
    }

    pub async fn load_date_dimension(&self) -> Result<Vec<StoredDateRow>> {
        sqlx::query_as::<_, StoredDateRow>(
            "SELECT DateKey, FullDate, Year, Quarter, Month, DayOfWeek, WeekOfYear FROM DateDim ORDER BY DateKey",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EtlError::persist("DateDim", e))
    }

    /// Every table's rows rendered as text, in key order.
    /// Two loads of the same input produce equal snapshots.
    pub async fn snapshot(&self) -> Result<Vec<(String, Vec<String>)>> {
        const QUERIES: &[(&str, &str)] = &[
            ("DateDim", "SELECT concat_ws('|', DateKey, FullDate, Year, Quarter, Month, DayOfWeek, WeekOfYear) FROM DateDim ORDER BY DateKey"),
            ("ProductDim", "SELECT concat_ws('|', ProductKey, ProductCategory, ProductName) FROM ProductDim ORDER BY ProductKey"),
            ("RegionDim", "SELECT concat_ws('|', RegionKey, Region) FROM RegionDim ORDER BY RegionKey"),
            ("PaymentDim", "SELECT concat_ws('|', PaymentKey, PaymentMethod) FROM PaymentDim ORDER BY PaymentKey"),
            ("FactSales", "SELECT concat_ws('|', TransactionID, coalesce(DateKey::text, 'NULL'), coalesce(ProductKey::text, 'NULL'), coalesce(RegionKey::text, 'NULL'), coalesce(PaymentKey::text, 'NULL'), UnitsSold, UnitPrice, TotalRevenue) FROM FactSales ORDER BY TransactionID"),
        ];

        let mut tables = Vec::with_capacity(QUERIES.len());
        for (table, query) in QUERIES {
            let rows: Vec<(String,)> = sqlx::query_as(query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| EtlError::persist(*table, e))?;
            tables.push((table.to_string(), rows.into_iter().map(|(r,)| r).collect()));
        }
        Ok(tables)
    }
}

async fn insert_dates(tx: &mut Transaction<'_, Postgres>, dims: &DimensionSet) -> Result<usize> {
    let mut count = 0;
    for row in dims.date_rows() {
        let a = row.attributes;
        sqlx::query(
            r#"
            INSERT INTO DateDim (DateKey, FullDate, Year, Quarter, Month, DayOfWeek, WeekOfYear)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.date_key)
        .bind(row.full_date)
        .bind(a.year)
        .bind(a.quarter)
        .bind(a.month)
        .bind(a.day_of_week)
        .bind(a.week_of_year)
        .execute(&mut **tx)
        .await
        .map_err(|e| EtlError::persist(format!("DateDim (FullDate {})", row.full_date), e))?;
        count += 1;
    }
    Ok(count)
}

async fn insert_products(tx: &mut Transaction<'_, Postgres>, dims: &DimensionSet) -> Result<usize> {
    for (key, product) in dims.product.rows() {
        sqlx::query(
            "INSERT INTO ProductDim (ProductKey, ProductCategory, ProductName) VALUES ($1, $2, $3)",
        )
        .bind(*key)
        .bind(&product.category)
        .bind(&product.name)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            EtlError::persist(format!("ProductDim ({:?}, {:?})", product.category, product.name), e)
        })?;
    }
    Ok(dims.product.len())
}

/// Insert a single-attribute dimension (RegionDim, PaymentDim)
async fn insert_named(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    key_column: &str,
    value_column: &str,
    rows: &[(SurrogateKey, String)],
) -> Result<usize> {
    let statement = format!(
        "INSERT INTO {} ({}, {}) VALUES ($1, $2)",
        table, key_column, value_column
    );
    for (key, value) in rows {
        sqlx::query(&statement)
            .bind(*key)
            .bind(value)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::persist(format!("{} ({:?})", table, value), e))?;
    }
    Ok(rows.len())
}

async fn insert_facts(tx: &mut Transaction<'_, Postgres>, facts: &[FactRow]) -> Result<usize> {
    for fact in facts {
        sqlx::query(
            r#"
            INSERT INTO FactSales (TransactionID, DateKey, ProductKey, RegionKey, PaymentKey, UnitsSold, UnitPrice, TotalRevenue)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(fact.transaction_id)
        .bind(fact.date_key)
        .bind(fact.product_key)
        .bind(fact.region_key)
        .bind(fact.payment_key)
        .bind(fact.units_sold)
        .bind(fact.unit_price)
        .bind(fact.total_revenue)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            EtlError::persist(format!("FactSales (TransactionID {})", fact.transaction_id), e)
        })?;
    }
    Ok(facts.len())
}
