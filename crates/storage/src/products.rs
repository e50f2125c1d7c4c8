use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listing::{
    validation::{integer, number, text},
    DeleteOutcome, EditableEntity, EditableRepository, Exportable, Grants, ListEntity, ListQuery,
    LookupCategory, PageRequest, PagedResult, Repository, Rule, RuleSet, ValidationErrors,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::{sqlite::SqliteRow, Row};

use shared::domain::{BrandId, CategoryId, ProductId};

use crate::{
    filter::{delete_all_or_nothing, TableSpec},
    Storage,
};

const PRICE_CEILING: f64 = 2_147_483_647.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub category_name: Option<String>,
    pub brand_id: Option<BrandId>,
    pub brand_name: Option<String>,
    pub name: String,
    pub code: String,
    pub barcode_symbology: String,
    pub unit: String,
    pub quantity: i64,
    pub cost: f64,
    pub price: f64,
    pub stock_alert: i64,
    pub order_tax: Option<i64>,
    pub tax_type: Option<i64>,
    pub note: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated product fields, without identity or timestamps. Used by the
/// edit form, the CSV importer and the seed command.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub category_id: CategoryId,
    pub brand_id: Option<BrandId>,
    pub name: String,
    pub code: String,
    pub barcode_symbology: String,
    pub unit: String,
    pub quantity: i64,
    pub cost: f64,
    pub price: f64,
    pub stock_alert: i64,
    pub order_tax: Option<i64>,
    pub tax_type: Option<i64>,
    pub note: Option<String>,
}

pub fn product_rules() -> RuleSet {
    RuleSet::new()
        .field("name", &[Rule::Required, Rule::String, Rule::Max(255.0)])
        .field("code", &[Rule::Required, Rule::String, Rule::Max(255.0)])
        .field(
            "barcode_symbology",
            &[Rule::Required, Rule::String, Rule::Max(255.0)],
        )
        .field("unit", &[Rule::Required, Rule::String, Rule::Max(255.0)])
        .field("quantity", &[Rule::Required, Rule::Integer, Rule::Min(1.0)])
        .field(
            "cost",
            &[Rule::Required, Rule::Numeric, Rule::Min(0.0), Rule::Max(PRICE_CEILING)],
        )
        .field(
            "price",
            &[Rule::Required, Rule::Numeric, Rule::Min(0.0), Rule::Max(PRICE_CEILING)],
        )
        .field("stock_alert", &[Rule::Required, Rule::Integer, Rule::Min(0.0)])
        .field(
            "order_tax",
            &[Rule::Nullable, Rule::Integer, Rule::Min(0.0), Rule::Max(100.0)],
        )
        .field("tax_type", &[Rule::Nullable, Rule::Integer])
        .field("note", &[Rule::Nullable, Rule::String, Rule::Max(1000.0)])
        .field("category_id", &[Rule::Required, Rule::Integer])
        .field("brand_id", &[Rule::Nullable, Rule::Integer])
}

fn required<T: Default>(value: Option<T>, field: &str, errors: &mut ValidationErrors) -> T {
    value.unwrap_or_else(|| {
        errors.add(field, format!("The {} field is required.", field.replace('_', " ")));
        T::default()
    })
}

impl NewProduct {
    /// Validates `fields` against [`product_rules`] and extracts the typed values.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, ValidationErrors> {
        product_rules().validate(fields)?;

        let mut errors = ValidationErrors::new();
        let draft = Self {
            category_id: CategoryId(required(integer(fields, "category_id"), "category_id", &mut errors)),
            brand_id: integer(fields, "brand_id").map(BrandId),
            name: required(text(fields, "name"), "name", &mut errors),
            code: required(text(fields, "code"), "code", &mut errors),
            barcode_symbology: required(
                text(fields, "barcode_symbology"),
                "barcode_symbology",
                &mut errors,
            ),
            unit: required(text(fields, "unit"), "unit", &mut errors),
            quantity: required(integer(fields, "quantity"), "quantity", &mut errors),
            cost: required(number(fields, "cost"), "cost", &mut errors),
            price: required(number(fields, "price"), "price", &mut errors),
            stock_alert: required(integer(fields, "stock_alert"), "stock_alert", &mut errors),
            order_tax: integer(fields, "order_tax"),
            tax_type: integer(fields, "tax_type"),
            note: text(fields, "note"),
        };
        if errors.is_empty() {
            Ok(draft)
        } else {
            Err(errors)
        }
    }
}

pub(crate) const PRODUCT_TABLE: TableSpec = TableSpec {
    select: "products.id, products.category_id, categories.name, products.brand_id, brands.name,
             products.name, products.code, products.barcode_symbology, products.unit,
             products.quantity, products.cost, products.price, products.stock_alert,
             products.order_tax, products.tax_type, products.note, products.image,
             products.created_at, products.updated_at",
    from: "products
           LEFT JOIN categories ON categories.id = products.category_id
           LEFT JOIN brands ON brands.id = products.brand_id",
    id_column: "products.id",
    columns: &[
        ("id", "products.id"),
        ("name", "products.name"),
        ("code", "products.code"),
        ("unit", "products.unit"),
        ("quantity", "products.quantity"),
        ("cost", "products.cost"),
        ("price", "products.price"),
        ("stock_alert", "products.stock_alert"),
        ("created_at", "products.created_at"),
        ("category", "categories.name"),
        ("brand", "brands.name"),
    ],
    searchable: <Product as ListEntity>::SEARCHABLE,
    scope_column: None,
};

fn product_from_row(r: &SqliteRow) -> Product {
    Product {
        id: ProductId(r.get::<i64, _>(0)),
        category_id: CategoryId(r.get::<i64, _>(1)),
        category_name: r.get::<Option<String>, _>(2),
        brand_id: r.get::<Option<i64>, _>(3).map(BrandId),
        brand_name: r.get::<Option<String>, _>(4),
        name: r.get::<String, _>(5),
        code: r.get::<String, _>(6),
        barcode_symbology: r.get::<String, _>(7),
        unit: r.get::<String, _>(8),
        quantity: r.get::<i64, _>(9),
        cost: r.get::<f64, _>(10),
        price: r.get::<f64, _>(11),
        stock_alert: r.get::<i64, _>(12),
        order_tax: r.get::<Option<i64>, _>(13),
        tax_type: r.get::<Option<i64>, _>(14),
        note: r.get::<Option<String>, _>(15),
        image: r.get::<Option<String>, _>(16),
        created_at: r.get::<DateTime<Utc>, _>(17),
        updated_at: r.get::<DateTime<Utc>, _>(18),
    }
}

impl ListEntity for Product {
    type Id = ProductId;

    const NAME: &'static str = "products";
    const LABEL: &'static str = "Product";
    const ORDERABLE: &'static [&'static str] = &[
        "id",
        "name",
        "code",
        "quantity",
        "cost",
        "price",
        "stock_alert",
        "created_at",
    ];
    const SEARCHABLE: &'static [&'static str] = &["name", "code", "unit", "category", "brand"];
    const GRANTS: Grants = Grants {
        access: "access_products",
        show: "show_products",
        edit: "edit_products",
        delete: "delete_products",
        import: "import_products",
        export: "export_products",
    };
    const DEFAULT_PAGE_SIZE: u32 = 100;
    const LOOKUPS: &'static [LookupCategory] = &[
        LookupCategory::Categories,
        LookupCategory::Brands,
        LookupCategory::Warehouses,
    ];

    fn id(&self) -> ProductId {
        self.id
    }
}

impl EditableEntity for Product {
    const UPLOAD_FOLDER: &'static str = "products";

    fn rules() -> RuleSet {
        product_rules()
    }

    fn form_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(self.name));
        fields.insert("code".into(), json!(self.code));
        fields.insert("barcode_symbology".into(), json!(self.barcode_symbology));
        fields.insert("unit".into(), json!(self.unit));
        fields.insert("quantity".into(), json!(self.quantity));
        fields.insert("cost".into(), json!(self.cost));
        fields.insert("price".into(), json!(self.price));
        fields.insert("stock_alert".into(), json!(self.stock_alert));
        fields.insert("order_tax".into(), json!(self.order_tax));
        fields.insert("tax_type".into(), json!(self.tax_type));
        fields.insert("note".into(), json!(self.note));
        fields.insert("category_id".into(), json!(self.category_id.0));
        fields.insert("brand_id".into(), json!(self.brand_id.map(|b| b.0)));
        fields
    }

    fn apply_fields(&mut self, fields: &Map<String, Value>) -> Result<(), ValidationErrors> {
        let draft = NewProduct::from_fields(fields)?;
        if draft.category_id != self.category_id {
            self.category_name = None;
        }
        if draft.brand_id != self.brand_id {
            self.brand_name = None;
        }
        self.category_id = draft.category_id;
        self.brand_id = draft.brand_id;
        self.name = draft.name;
        self.code = draft.code;
        self.barcode_symbology = draft.barcode_symbology;
        self.unit = draft.unit;
        self.quantity = draft.quantity;
        self.cost = draft.cost;
        self.price = draft.price;
        self.stock_alert = draft.stock_alert;
        self.order_tax = draft.order_tax;
        self.tax_type = draft.tax_type;
        self.note = draft.note;
        Ok(())
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn set_image(&mut self, file_name: String) {
        self.image = Some(file_name);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Exportable for Product {
    const EXPORT_HEADERS: &'static [&'static str] = &[
        "id",
        "code",
        "name",
        "category",
        "brand",
        "unit",
        "quantity",
        "cost",
        "price",
        "stock_alert",
    ];

    fn export_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.code.clone(),
            self.name.clone(),
            self.category_name.clone().unwrap_or_default(),
            self.brand_name.clone().unwrap_or_default(),
            self.unit.clone(),
            self.quantity.to_string(),
            format!("{:.2}", self.cost),
            format!("{:.2}", self.price),
            self.stock_alert.to_string(),
        ]
    }
}

impl Storage {
    pub async fn insert_product(&self, product: &NewProduct) -> Result<ProductId> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO products (
                category_id, brand_id, name, code, barcode_symbology, unit, quantity,
                cost, price, stock_alert, order_tax, tax_type, note, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(product.category_id.0)
        .bind(product.brand_id.map(|b| b.0))
        .bind(&product.name)
        .bind(&product.code)
        .bind(&product.barcode_symbology)
        .bind(&product.unit)
        .bind(product.quantity)
        .bind(product.cost)
        .bind(product.price)
        .bind(product.stock_alert)
        .bind(product.order_tax)
        .bind(product.tax_type)
        .bind(&product.note)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert product '{}'", product.code))?;
        Ok(ProductId(rec.get::<i64, _>(0)))
    }

    pub async fn find_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE products.id = ?",
            PRODUCT_TABLE.select, PRODUCT_TABLE.from
        );
        let row = sqlx::query(&sql)
            .bind(product_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(product_from_row))
    }
}

#[async_trait]
impl Repository<Product> for Storage {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        self.find_product(id).await
    }

    async fn delete_by_ids(&self, ids: &[ProductId]) -> Result<DeleteOutcome<ProductId>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        Ok(delete_all_or_nothing(&self.pool, "products", &raw)
            .await?
            .map_ids(ProductId))
    }

    async fn query_page(
        &self,
        query: &ListQuery,
        page: PageRequest,
    ) -> Result<PagedResult<Product>> {
        PRODUCT_TABLE
            .page(&self.pool, query, page, product_from_row)
            .await
    }

    async fn query_all(&self, query: &ListQuery) -> Result<Vec<Product>> {
        PRODUCT_TABLE.all(&self.pool, query, product_from_row).await
    }
}

#[async_trait]
impl EditableRepository<Product> for Storage {
    async fn save(&self, product: &Product) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE products SET
                category_id = ?, brand_id = ?, name = ?, code = ?, barcode_symbology = ?,
                unit = ?, quantity = ?, cost = ?, price = ?, stock_alert = ?, order_tax = ?,
                tax_type = ?, note = ?, image = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(product.category_id.0)
        .bind(product.brand_id.map(|b| b.0))
        .bind(&product.name)
        .bind(&product.code)
        .bind(&product.barcode_symbology)
        .bind(&product.unit)
        .bind(product.quantity)
        .bind(product.cost)
        .bind(product.price)
        .bind(product.stock_alert)
        .bind(product.order_tax)
        .bind(product.tax_type)
        .bind(&product.note)
        .bind(&product.image)
        .bind(product.updated_at)
        .bind(product.id.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update product {}", product.id))?
        .rows_affected();

        anyhow::ensure!(updated == 1, "product {} no longer exists", product.id);
        Ok(())
    }
}
