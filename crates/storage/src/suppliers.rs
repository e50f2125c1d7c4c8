use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::Row;

use shared::domain::{ProductId, PurchaseId, PurchaseStatus, SupplierId};

use crate::Storage;

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub supplier_id: SupplierId,
    pub reference: String,
    pub date: NaiveDate,
    pub status: PurchaseStatus,
    pub total_amount: i64,
    pub paid_amount: i64,
    /// `(product, quantity, unit cost in cents)`
    pub lines: Vec<(ProductId, i64, i64)>,
}

/// Raw sums behind the supplier details screen. Amounts are cents except
/// `completed_product_costs`, which sums the product `cost` column.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierTotals {
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub purchases_total: i64,
    pub purchases_paid: i64,
    pub purchases_due: i64,
    pub returns_total: i64,
    pub completed_purchases: i64,
    pub completed_returns: i64,
    pub completed_product_costs: f64,
}

impl Storage {
    pub async fn create_supplier(&self, name: &str, email: Option<&str>) -> Result<SupplierId> {
        let rec = sqlx::query("INSERT INTO suppliers (name, email) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(SupplierId(rec.get::<i64, _>(0)))
    }

    pub async fn insert_purchase(&self, purchase: &NewPurchase) -> Result<PurchaseId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO purchases
                (supplier_id, reference, date, status, total_amount, paid_amount, due_amount)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(purchase.supplier_id.0)
        .bind(&purchase.reference)
        .bind(purchase.date)
        .bind(purchase.status.as_str())
        .bind(purchase.total_amount)
        .bind(purchase.paid_amount)
        .bind(purchase.total_amount - purchase.paid_amount)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert purchase '{}'", purchase.reference))?;
        let purchase_id = rec.get::<i64, _>(0);

        for (product_id, quantity, unit_cost) in &purchase.lines {
            sqlx::query(
                "INSERT INTO purchase_details (purchase_id, product_id, quantity, unit_cost)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(purchase_id)
            .bind(product_id.0)
            .bind(quantity)
            .bind(unit_cost)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(PurchaseId(purchase_id))
    }

    pub async fn insert_purchase_return(
        &self,
        supplier_id: SupplierId,
        reference: &str,
        date: NaiveDate,
        status: PurchaseStatus,
        total_amount: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO purchase_returns (supplier_id, reference, date, status, total_amount)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(supplier_id.0)
        .bind(reference)
        .bind(date)
        .bind(status.as_str())
        .bind(total_amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns `None` when the supplier does not exist.
    pub async fn supplier_totals(&self, supplier_id: SupplierId) -> Result<Option<SupplierTotals>> {
        let Some(name_row) = sqlx::query("SELECT name FROM suppliers WHERE id = ?")
            .bind(supplier_id.0)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let purchases = sqlx::query(
            "SELECT COALESCE(SUM(total_amount), 0),
                    COALESCE(SUM(paid_amount), 0),
                    COALESCE(SUM(due_amount), 0),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN total_amount ELSE 0 END), 0)
             FROM purchases WHERE supplier_id = ?",
        )
        .bind(supplier_id.0)
        .fetch_one(&self.pool)
        .await
        .context("failed to sum purchases")?;

        let returns = sqlx::query(
            "SELECT COALESCE(SUM(total_amount), 0),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN total_amount ELSE 0 END), 0)
             FROM purchase_returns WHERE supplier_id = ?",
        )
        .bind(supplier_id.0)
        .fetch_one(&self.pool)
        .await
        .context("failed to sum purchase returns")?;

        let completed_product_costs: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(p.cost), 0.0)
             FROM purchase_details d
             INNER JOIN purchases pu ON pu.id = d.purchase_id
             INNER JOIN products p ON p.id = d.product_id
             WHERE pu.supplier_id = ? AND pu.status = 'completed'",
        )
        .bind(supplier_id.0)
        .fetch_one(&self.pool)
        .await
        .context("failed to sum product costs")?;

        Ok(Some(SupplierTotals {
            supplier_id,
            supplier_name: name_row.get::<String, _>(0),
            purchases_total: purchases.get::<i64, _>(0),
            purchases_paid: purchases.get::<i64, _>(1),
            purchases_due: purchases.get::<i64, _>(2),
            completed_purchases: purchases.get::<i64, _>(3),
            returns_total: returns.get::<i64, _>(0),
            completed_returns: returns.get::<i64, _>(1),
            completed_product_costs,
        }))
    }
}
