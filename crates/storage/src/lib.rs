use anyhow::{Context, Result};
use async_trait::async_trait;
use listing::{LookupCategory, LookupSource};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{BrandId, CategoryId, CustomerId, WarehouseId};

mod files;
mod filter;
mod products;
mod quotations;
mod sale_payments;
mod suppliers;

pub use files::LocalFileStore;
pub use products::{product_rules, NewProduct, Product};
pub use quotations::{NewQuotation, Quotation};
pub use sale_payments::{NewSalePayment, Sale, SalePayment};
pub use suppliers::{NewPurchase, SupplierTotals};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCustomer {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .with_regexp();
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_category(&self, code: Option<&str>, name: &str) -> Result<CategoryId> {
        let rec = sqlx::query(
            "INSERT INTO categories (code, name) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET name=excluded.name
             RETURNING id",
        )
        .bind(code)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(CategoryId(rec.get::<i64, _>(0)))
    }

    pub async fn category_exists(&self, category_id: CategoryId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM categories WHERE id = ?")
            .bind(category_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn create_brand(&self, name: &str) -> Result<BrandId> {
        let rec = sqlx::query(
            "INSERT INTO brands (name) VALUES (?)
             ON CONFLICT(name) DO UPDATE SET name=excluded.name
             RETURNING id",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(BrandId(rec.get::<i64, _>(0)))
    }

    pub async fn create_warehouse(&self, name: &str, city: Option<&str>) -> Result<WarehouseId> {
        let rec = sqlx::query(
            "INSERT INTO warehouses (name, city) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET name=excluded.name
             RETURNING id",
        )
        .bind(name)
        .bind(city)
        .fetch_one(&self.pool)
        .await?;
        Ok(WarehouseId(rec.get::<i64, _>(0)))
    }

    pub async fn create_customer(
        &self,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<CustomerId> {
        let rec =
            sqlx::query("INSERT INTO customers (name, email, phone) VALUES (?, ?, ?) RETURNING id")
                .bind(name)
                .bind(email)
                .bind(phone)
                .fetch_one(&self.pool)
                .await?;
        Ok(CustomerId(rec.get::<i64, _>(0)))
    }

    pub async fn find_customer(&self, customer_id: CustomerId) -> Result<Option<StoredCustomer>> {
        let row = sqlx::query("SELECT id, name, email, phone FROM customers WHERE id = ?")
            .bind(customer_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StoredCustomer {
            customer_id: CustomerId(r.get::<i64, _>(0)),
            name: r.get::<String, _>(1),
            email: r.get::<Option<String>, _>(2),
            phone: r.get::<Option<String>, _>(3),
        }))
    }
}

#[async_trait]
impl LookupSource for Storage {
    async fn lookup(&self, category: LookupCategory) -> Result<BTreeMap<i64, String>> {
        let sql = match category {
            LookupCategory::Categories => "SELECT id, name FROM categories",
            LookupCategory::Brands => "SELECT id, name FROM brands",
            LookupCategory::Warehouses => "SELECT id, name FROM warehouses",
            LookupCategory::Customers => "SELECT id, name FROM customers",
        };
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to load {} lookup", category.as_str()))?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<i64, _>(0), r.get::<String, _>(1)))
            .collect())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
