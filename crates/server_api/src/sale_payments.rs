use std::sync::Arc;

use listing::{Actor, NotificationLog};
use shared::{
    domain::SaleId,
    error::{ApiError, ErrorCode},
};
use storage::SalePayment;

use crate::{api_error, controller, index_page, internal, ApiContext, IndexPage};

/// Grant for opening the payments modal of a sale.
pub const SHOW_PAYMENTS_GRANT: &str = "access_sales";

/// Payments of one sale. Opening the modal needs the sales grant, listing
/// the rows needs the payments grant.
pub async fn list_sale_payments(
    ctx: &ApiContext,
    actor: Actor,
    sale_id: SaleId,
    raw_query: Option<&str>,
) -> Result<IndexPage<SalePayment>, ApiError> {
    let authz = ctx.authorizer(actor.clone());
    authz.require(SHOW_PAYMENTS_GRANT).map_err(api_error)?;
    ctx.storage
        .find_sale(sale_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("sale {sale_id} not found")))?;

    let notices = Arc::new(NotificationLog::new());
    let screen = controller::<SalePayment>(ctx, actor, raw_query, &notices).with_scope(sale_id.0);
    let page = screen.fetch_page().await.map_err(api_error)?;
    Ok(index_page(&screen, page))
}
