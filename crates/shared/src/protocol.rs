use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{CustomerId, SupplierId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUpload {
    pub filename: String,
    pub content_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditProductRequest {
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRowFailure {
    pub row: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResponse {
    pub imported: usize,
    pub failed: Vec<ImportRowFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub customer_id: CustomerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Totals shown on the supplier details screen, in major currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierLedger {
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub total_purchases: f64,
    pub total_purchase_returns: f64,
    pub total_due: f64,
    pub total_payments: f64,
    pub debit: f64,
}
