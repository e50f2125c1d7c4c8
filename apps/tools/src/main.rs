use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use listing::{Actor, ExportFormat, StaticPolicy};
use server_api::{export_products, import_products, ApiContext, TableFormatter};
use shared::{
    domain::{PurchaseStatus, QuotationStatus},
    error::ApiError,
};
use storage::{
    LocalFileStore, NewProduct, NewPurchase, NewQuotation, NewSalePayment, Storage,
};
use tracing::info;

const OPERATOR_ROLE: &str = "operator";

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/backoffice.db")]
    database_url: String,
    #[arg(long, default_value = "./data/uploads")]
    upload_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fills an empty database with demo reference data and documents.
    Seed,
    /// Imports products from a CSV file with a header row.
    ImportProducts { path: PathBuf },
    /// Writes the products matching `query` (e.g. `search=cola&sortBy=name`).
    ExportProducts {
        #[arg(long, default_value = "csv")]
        format: String,
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Seed => seed(&storage).await?,
        Command::ImportProducts { path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let ctx = operator_context(storage, cli.upload_dir);
            let response = import_products(&ctx, operator(), &bytes)
                .await
                .map_err(api_failure)?;
            println!("imported {} products", response.data.imported);
            for failure in response.data.failed {
                println!("row {}: {}", failure.row, failure.errors.join("; "));
            }
        }
        Command::ExportProducts { format, query, out } => {
            let format = ExportFormat::parse(&format)
                .ok_or_else(|| anyhow!("unsupported export format '{format}'"))?;
            let ctx = operator_context(storage, cli.upload_dir);
            let artifact = export_products(&ctx, operator(), Some(&query), format)
                .await
                .map_err(api_failure)?;
            let out = out.unwrap_or_else(|| PathBuf::from(&artifact.file_name));
            tokio::fs::write(&out, &artifact.bytes)
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {} ({} bytes)", out.display(), artifact.bytes.len());
        }
    }

    Ok(())
}

fn operator() -> Actor {
    Actor::new("cli", [OPERATOR_ROLE])
}

fn operator_context(storage: Storage, upload_dir: PathBuf) -> ApiContext {
    ApiContext {
        storage,
        files: Arc::new(LocalFileStore::new(upload_dir)),
        policy: Arc::new(StaticPolicy::new().grant(OPERATOR_ROLE, ["*"])),
        formatter: Arc::new(TableFormatter),
        pagination_options: listing::controller::DEFAULT_PAGINATION_OPTIONS.to_vec(),
    }
}

fn api_failure(err: ApiError) -> anyhow::Error {
    anyhow!("{:?}: {}", err.code, err.message)
}

fn date(month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, month, day).ok_or_else(|| anyhow!("invalid date"))
}

async fn seed(storage: &Storage) -> Result<()> {
    let drinks = storage.create_category(Some("DRK"), "Drinks").await?;
    let snacks = storage.create_category(Some("SNK"), "Snacks").await?;
    let house = storage.create_brand("House").await?;
    storage.create_warehouse("Main", Some("Lisbon")).await?;

    let mut products = Vec::new();
    for (category_id, name, code, cost, price) in [
        (drinks, "Cola 330ml", "DRK-001", 0.45, 1.2),
        (drinks, "Sparkling water", "DRK-002", 0.2, 0.8),
        (snacks, "Salted crisps", "SNK-001", 0.6, 1.5),
    ] {
        let id = storage
            .insert_product(&NewProduct {
                category_id,
                brand_id: Some(house),
                name: name.into(),
                code: code.into(),
                barcode_symbology: "C128".into(),
                unit: "pc".into(),
                quantity: 50,
                cost,
                price,
                stock_alert: 10,
                order_tax: None,
                tax_type: None,
                note: None,
            })
            .await
            .with_context(|| format!("failed to seed product {code}"))?;
        products.push(id);
    }

    let walk_in = storage
        .create_customer("Walk-in customer", None, None)
        .await?;
    storage
        .insert_quotation(&NewQuotation {
            reference: "QT-0001".into(),
            date: date(5, 2)?,
            customer_id: walk_in,
            total_amount: 4_500,
            status: QuotationStatus::Pending,
            note: None,
        })
        .await?;

    let sale = storage
        .create_sale("SL-0001", date(5, 3)?, Some(walk_in), 3_000)
        .await?;
    storage
        .insert_sale_payment(&NewSalePayment {
            sale_id: sale,
            reference: "INV/SL-0001-1".into(),
            amount: 1_000,
            date: date(5, 3)?,
            payment_method: "cash".into(),
            note: None,
        })
        .await?;

    let supplier = storage
        .create_supplier("Acme Wholesale", Some("orders@acme.test"))
        .await?;
    storage
        .insert_purchase(&NewPurchase {
            supplier_id: supplier,
            reference: "PR-0001".into(),
            date: date(4, 28)?,
            status: PurchaseStatus::Completed,
            total_amount: 12_500,
            paid_amount: 10_000,
            lines: products.iter().map(|id| (*id, 10, 40)).collect(),
        })
        .await?;

    info!(products = products.len(), "demo data seeded");
    Ok(())
}
