use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use listing::{RowImporter, RowOutcome, RowStatus};
use serde_json::{Map, Value};
use storage::{NewProduct, Storage};
use tracing::debug;

const DEFAULT_SYMBOLOGY: &str = "C128";

/// Imports products from a CSV file whose header row names the product
/// form fields (`name`, `code`, `unit`, `quantity`, `cost`, `price`,
/// `stock_alert`, `category_id`, ...).
///
/// Rows are validated and inserted one by one; a bad row never stops the
/// rest of the file.
#[derive(Clone)]
pub struct ProductCsvImporter {
    storage: Storage,
}

impl ProductCsvImporter {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn import_row(&self, fields: Map<String, Value>) -> RowStatus {
        let product = match NewProduct::from_fields(&fields) {
            Ok(product) => product,
            Err(errors) => {
                return RowStatus::Rejected(errors.into_inner().into_values().flatten().collect())
            }
        };

        match self.storage.category_exists(product.category_id).await {
            Ok(true) => {}
            Ok(false) => {
                return RowStatus::Rejected(vec![
                    "The selected category id is invalid.".to_string()
                ])
            }
            Err(err) => return RowStatus::Rejected(vec![format!("{err:#}")]),
        }

        match self.storage.insert_product(&product).await {
            Ok(_) => RowStatus::Imported,
            Err(err) => RowStatus::Rejected(vec![format!("{err:#}")]),
        }
    }
}

fn header_key(raw: &str) -> String {
    raw.trim_matches('\u{feff}')
        .trim()
        .to_ascii_lowercase()
        .replace(' ', "_")
}

#[async_trait]
impl RowImporter for ProductCsvImporter {
    async fn parse_and_persist(&self, bytes: &[u8]) -> Result<Vec<RowOutcome>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()
            .context("read csv headers")?
            .iter()
            .map(header_key)
            .collect();

        let mut outcomes = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let row = index + 1;
            let status = match record {
                Ok(record) => {
                    let mut fields = Map::new();
                    for (key, value) in headers.iter().zip(record.iter()) {
                        fields.insert(key.clone(), Value::String(value.to_string()));
                    }
                    if !fields.contains_key("barcode_symbology") {
                        fields.insert(
                            "barcode_symbology".into(),
                            Value::String(DEFAULT_SYMBOLOGY.into()),
                        );
                    }
                    self.import_row(fields).await
                }
                Err(err) => RowStatus::Rejected(vec![err.to_string()]),
            };
            debug!(row, ?status, "product row processed");
            outcomes.push(RowOutcome { row, status });
        }
        Ok(outcomes)
    }
}
