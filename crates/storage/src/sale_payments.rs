use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use listing::{DeleteOutcome, Grants, ListEntity, ListQuery, PageRequest, PagedResult, Repository};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};

use shared::domain::{CustomerId, SaleId, SalePaymentId};

use crate::{
    filter::{delete_all_or_nothing, TableSpec},
    Storage,
};

/// One payment against a sale. Lists are always scoped to a single sale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalePayment {
    pub id: SalePaymentId,
    pub sale_id: SaleId,
    pub reference: String,
    /// In cents.
    pub amount: i64,
    pub date: NaiveDate,
    pub payment_method: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSalePayment {
    pub sale_id: SaleId,
    pub reference: String,
    pub amount: i64,
    pub date: NaiveDate,
    pub payment_method: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sale {
    pub id: SaleId,
    pub reference: String,
    pub date: NaiveDate,
    pub customer_id: Option<CustomerId>,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub due_amount: i64,
}

pub(crate) const SALE_PAYMENT_TABLE: TableSpec = TableSpec {
    select: "id, sale_id, reference, amount, date, payment_method, note",
    from: "sale_payments",
    id_column: "sale_payments.id",
    columns: &[
        ("id", "sale_payments.id"),
        ("date", "sale_payments.date"),
        ("reference", "sale_payments.reference"),
        ("amount", "sale_payments.amount"),
        ("payment_method", "sale_payments.payment_method"),
        ("note", "sale_payments.note"),
    ],
    searchable: <SalePayment as ListEntity>::SEARCHABLE,
    scope_column: Some("sale_payments.sale_id"),
};

fn sale_payment_from_row(r: &SqliteRow) -> SalePayment {
    SalePayment {
        id: SalePaymentId(r.get::<i64, _>(0)),
        sale_id: SaleId(r.get::<i64, _>(1)),
        reference: r.get::<String, _>(2),
        amount: r.get::<i64, _>(3),
        date: r.get::<NaiveDate, _>(4),
        payment_method: r.get::<String, _>(5),
        note: r.get::<Option<String>, _>(6),
    }
}

impl ListEntity for SalePayment {
    type Id = SalePaymentId;

    const NAME: &'static str = "sale_payments";
    const LABEL: &'static str = "Payment";
    const ORDERABLE: &'static [&'static str] =
        &["id", "date", "reference", "amount", "payment_method"];
    const SEARCHABLE: &'static [&'static str] = &["reference", "payment_method", "note"];
    const GRANTS: Grants = Grants {
        access: "access_sale_payments",
        show: "access_sale_payments",
        edit: "edit_sale_payments",
        delete: "delete_sale_payments",
        import: "import_sale_payments",
        export: "export_sale_payments",
    };
    const DEFAULT_PAGE_SIZE: u32 = 10;

    fn id(&self) -> SalePaymentId {
        self.id
    }
}

impl Storage {
    pub async fn create_sale(
        &self,
        reference: &str,
        date: NaiveDate,
        customer_id: Option<CustomerId>,
        total_amount: i64,
    ) -> Result<SaleId> {
        let rec = sqlx::query(
            "INSERT INTO sales (reference, date, customer_id, total_amount, due_amount)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(reference)
        .bind(date)
        .bind(customer_id.map(|c| c.0))
        .bind(total_amount)
        .bind(total_amount)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert sale '{reference}'"))?;
        Ok(SaleId(rec.get::<i64, _>(0)))
    }

    pub async fn find_sale(&self, sale_id: SaleId) -> Result<Option<Sale>> {
        let row = sqlx::query(
            "SELECT id, reference, date, customer_id, total_amount, paid_amount, due_amount
             FROM sales WHERE id = ?",
        )
        .bind(sale_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Sale {
            id: SaleId(r.get::<i64, _>(0)),
            reference: r.get::<String, _>(1),
            date: r.get::<NaiveDate, _>(2),
            customer_id: r.get::<Option<i64>, _>(3).map(CustomerId),
            total_amount: r.get::<i64, _>(4),
            paid_amount: r.get::<i64, _>(5),
            due_amount: r.get::<i64, _>(6),
        }))
    }

    /// Records a payment and moves the amount from due to paid on the sale.
    pub async fn insert_sale_payment(&self, payment: &NewSalePayment) -> Result<SalePaymentId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO sale_payments (sale_id, reference, amount, date, payment_method, note)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(payment.sale_id.0)
        .bind(&payment.reference)
        .bind(payment.amount)
        .bind(payment.date)
        .bind(&payment.payment_method)
        .bind(&payment.note)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert payment for sale {}", payment.sale_id))?;

        sqlx::query(
            "UPDATE sales
             SET paid_amount = paid_amount + ?, due_amount = due_amount - ?
             WHERE id = ?",
        )
        .bind(payment.amount)
        .bind(payment.amount)
        .bind(payment.sale_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(SalePaymentId(rec.get::<i64, _>(0)))
    }
}

#[async_trait]
impl Repository<SalePayment> for Storage {
    async fn find_by_id(&self, id: SalePaymentId) -> Result<Option<SalePayment>> {
        let row = sqlx::query(
            "SELECT id, sale_id, reference, amount, date, payment_method, note
             FROM sale_payments WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(sale_payment_from_row))
    }

    async fn delete_by_ids(
        &self,
        ids: &[SalePaymentId],
    ) -> Result<DeleteOutcome<SalePaymentId>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        Ok(delete_all_or_nothing(&self.pool, "sale_payments", &raw)
            .await?
            .map_ids(SalePaymentId))
    }

    async fn query_page(
        &self,
        query: &ListQuery,
        page: PageRequest,
    ) -> Result<PagedResult<SalePayment>> {
        SALE_PAYMENT_TABLE
            .page(&self.pool, query, page, sale_payment_from_row)
            .await
    }

    async fn query_all(&self, query: &ListQuery) -> Result<Vec<SalePayment>> {
        SALE_PAYMENT_TABLE
            .all(&self.pool, query, sale_payment_from_row)
            .await
    }
}
