use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use listing::{
    DeleteOutcome, Grants, ListEntity, ListQuery, LookupCategory, PageRequest, PagedResult,
    Repository,
};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};

use shared::domain::{CustomerId, QuotationId, QuotationStatus};

use crate::{
    filter::{delete_all_or_nothing, TableSpec},
    Storage,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub reference: String,
    pub date: NaiveDate,
    pub customer_id: CustomerId,
    pub customer_name: Option<String>,
    /// In cents.
    pub total_amount: i64,
    pub status: QuotationStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewQuotation {
    pub reference: String,
    pub date: NaiveDate,
    pub customer_id: CustomerId,
    pub total_amount: i64,
    pub status: QuotationStatus,
    pub note: Option<String>,
}

pub(crate) const QUOTATION_TABLE: TableSpec = TableSpec {
    select: "quotations.id, quotations.reference, quotations.date, quotations.customer_id,
             customers.name, quotations.total_amount, quotations.status, quotations.note",
    from: "quotations LEFT JOIN customers ON customers.id = quotations.customer_id",
    id_column: "quotations.id",
    columns: &[
        ("id", "quotations.id"),
        ("date", "quotations.date"),
        ("reference", "quotations.reference"),
        ("total_amount", "quotations.total_amount"),
        ("status", "quotations.status"),
        ("customer", "customers.name"),
    ],
    searchable: <Quotation as ListEntity>::SEARCHABLE,
    scope_column: None,
};

fn quotation_from_row(r: &SqliteRow) -> Quotation {
    Quotation {
        id: QuotationId(r.get::<i64, _>(0)),
        reference: r.get::<String, _>(1),
        date: r.get::<NaiveDate, _>(2),
        customer_id: CustomerId(r.get::<i64, _>(3)),
        customer_name: r.get::<Option<String>, _>(4),
        total_amount: r.get::<i64, _>(5),
        status: QuotationStatus::parse(&r.get::<String, _>(6)),
        note: r.get::<Option<String>, _>(7),
    }
}

impl ListEntity for Quotation {
    type Id = QuotationId;

    const NAME: &'static str = "quotations";
    const LABEL: &'static str = "Quotation";
    const ORDERABLE: &'static [&'static str] =
        &["id", "date", "reference", "total_amount", "status"];
    const SEARCHABLE: &'static [&'static str] = &["reference", "status", "customer"];
    const GRANTS: Grants = Grants {
        access: "access_quotations",
        show: "access_quotations",
        edit: "edit_quotations",
        delete: "quotation_delete",
        import: "import_quotations",
        export: "export_quotations",
    };
    const DEFAULT_PAGE_SIZE: u32 = 100;
    const LOOKUPS: &'static [LookupCategory] = &[LookupCategory::Customers];

    fn id(&self) -> QuotationId {
        self.id
    }
}

impl Storage {
    pub async fn insert_quotation(&self, quotation: &NewQuotation) -> Result<QuotationId> {
        let rec = sqlx::query(
            "INSERT INTO quotations (reference, date, customer_id, total_amount, status, note)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&quotation.reference)
        .bind(quotation.date)
        .bind(quotation.customer_id.0)
        .bind(quotation.total_amount)
        .bind(quotation.status.as_str())
        .bind(&quotation.note)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert quotation '{}'", quotation.reference))?;
        Ok(QuotationId(rec.get::<i64, _>(0)))
    }

    pub async fn find_quotation(&self, quotation_id: QuotationId) -> Result<Option<Quotation>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE quotations.id = ?",
            QUOTATION_TABLE.select, QUOTATION_TABLE.from
        );
        let row = sqlx::query(&sql)
            .bind(quotation_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(quotation_from_row))
    }
}

#[async_trait]
impl Repository<Quotation> for Storage {
    async fn find_by_id(&self, id: QuotationId) -> Result<Option<Quotation>> {
        self.find_quotation(id).await
    }

    async fn delete_by_ids(&self, ids: &[QuotationId]) -> Result<DeleteOutcome<QuotationId>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        Ok(delete_all_or_nothing(&self.pool, "quotations", &raw)
            .await?
            .map_ids(QuotationId))
    }

    async fn query_page(
        &self,
        query: &ListQuery,
        page: PageRequest,
    ) -> Result<PagedResult<Quotation>> {
        QUOTATION_TABLE
            .page(&self.pool, query, page, quotation_from_row)
            .await
    }

    async fn query_all(&self, query: &ListQuery) -> Result<Vec<Quotation>> {
        QUOTATION_TABLE.all(&self.pool, query, quotation_from_row).await
    }
}
