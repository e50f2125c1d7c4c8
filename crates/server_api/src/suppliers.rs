use listing::Actor;
use shared::{
    domain::SupplierId,
    error::{ApiError, ErrorCode},
    protocol::SupplierLedger,
};
use storage::SupplierTotals;

use crate::{api_error, internal, ApiContext};

pub const SHOW_SUPPLIERS_GRANT: &str = "show_suppliers";

fn major_units(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Converts stored cent sums into the ledger shown on the details screen.
///
/// Debit is completed purchases minus completed returns, less the summed
/// product cost of the completed purchase lines.
pub fn ledger_from_totals(totals: SupplierTotals) -> SupplierLedger {
    let debit = major_units(totals.completed_purchases - totals.completed_returns)
        - totals.completed_product_costs;
    SupplierLedger {
        supplier_id: totals.supplier_id,
        supplier_name: totals.supplier_name,
        total_purchases: major_units(totals.purchases_total),
        total_purchase_returns: major_units(totals.returns_total),
        total_due: major_units(totals.purchases_due),
        total_payments: major_units(totals.purchases_paid),
        debit,
    }
}

pub async fn supplier_details(
    ctx: &ApiContext,
    actor: Actor,
    supplier_id: SupplierId,
) -> Result<SupplierLedger, ApiError> {
    ctx.authorizer(actor)
        .require(SHOW_SUPPLIERS_GRANT)
        .map_err(api_error)?;
    let totals = ctx
        .storage
        .supplier_totals(supplier_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(ErrorCode::NotFound, format!("supplier {supplier_id} not found"))
        })?;
    Ok(ledger_from_totals(totals))
}
