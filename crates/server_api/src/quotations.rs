use std::sync::Arc;

use listing::{Actor, NotificationLog};
use shared::{
    domain::QuotationId,
    error::{ApiError, ErrorCode},
    protocol::{BulkDeleteResponse, CustomerSummary},
};
use storage::Quotation;

use crate::{api_error, controller, index_page, internal, ActionResponse, ApiContext, IndexPage};

pub async fn list_quotations(
    ctx: &ApiContext,
    actor: Actor,
    raw_query: Option<&str>,
) -> Result<IndexPage<Quotation>, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Quotation>(ctx, actor, raw_query, &notices);
    screen.mount(&ctx.storage).await.map_err(api_error)?;
    let page = screen.fetch_page().await.map_err(api_error)?;
    Ok(index_page(&screen, page))
}

/// Customer card shown when a quotation row is opened.
pub async fn show_quotation_customer(
    ctx: &ApiContext,
    actor: Actor,
    quotation_id: QuotationId,
) -> Result<CustomerSummary, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Quotation>(ctx, actor, None, &notices);
    let quotation = screen.open_view(quotation_id).await.map_err(api_error)?;

    let customer = ctx
        .storage
        .find_customer(quotation.customer_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "customer not found"))?;
    Ok(CustomerSummary {
        customer_id: customer.customer_id,
        name: customer.name,
        email: customer.email,
        phone: customer.phone,
    })
}

pub async fn delete_quotation(
    ctx: &ApiContext,
    actor: Actor,
    quotation_id: QuotationId,
) -> Result<ActionResponse<()>, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Quotation>(ctx, actor, None, &notices);
    screen.delete(quotation_id).await.map_err(api_error)?;
    Ok(ActionResponse {
        data: (),
        notifications: notices.drain(),
    })
}

pub async fn bulk_delete_quotations(
    ctx: &ApiContext,
    actor: Actor,
    ids: &[i64],
) -> Result<ActionResponse<BulkDeleteResponse>, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Quotation>(ctx, actor, None, &notices);
    screen
        .selection_mut()
        .select_all(ids.iter().copied().map(QuotationId));
    let report = screen.delete_selected().await.map_err(api_error)?;
    Ok(ActionResponse {
        data: BulkDeleteResponse {
            deleted: report.deleted,
        },
        notifications: notices.drain(),
    })
}
