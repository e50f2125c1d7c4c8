use std::sync::Arc;

use listing::{
    Actor, AuthorizationOracle, Authorizer, FileStore, Formatter, ListEntity, ListQueryController,
    ListQueryState, ListingError, LookupCache, Notification, NotificationLog, PagedResult,
    Repository,
};
use serde::Serialize;
use shared::error::{ApiError, ErrorCode};
use storage::Storage;

mod format;
mod import;
mod products;
mod quotations;
mod sale_payments;
mod suppliers;

pub use format::TableFormatter;
pub use import::ProductCsvImporter;
pub use products::{
    bulk_delete_products, delete_product, edit_product, export_products, import_products,
    list_products, show_product,
};
pub use quotations::{
    bulk_delete_quotations, delete_quotation, list_quotations, show_quotation_customer,
};
pub use sale_payments::list_sale_payments;
pub use suppliers::{ledger_from_totals, supplier_details};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub files: Arc<dyn FileStore>,
    pub policy: Arc<dyn AuthorizationOracle>,
    pub formatter: Arc<dyn Formatter>,
    pub pagination_options: Vec<u32>,
}

impl ApiContext {
    pub fn authorizer(&self, actor: Actor) -> Authorizer {
        Authorizer::new(self.policy.clone(), actor)
    }
}

/// One page of an index screen plus everything needed to render its controls.
#[derive(Debug, Serialize)]
pub struct IndexPage<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub last_page: u32,
    pub state: ListQueryState,
    /// Non-default state, suitable for the address bar.
    pub query_string: String,
    pub pagination_options: Vec<u32>,
    #[serde(skip_serializing_if = "LookupCache::is_empty")]
    pub lookups: LookupCache,
}

/// Result of a mutating action with the notifications it raised.
#[derive(Debug, Serialize)]
pub struct ActionResponse<T> {
    pub data: T,
    pub notifications: Vec<Notification>,
}

/// Builds the controller for one request, restoring list state from the
/// raw query string.
pub(crate) fn controller<E>(
    ctx: &ApiContext,
    actor: Actor,
    raw_query: Option<&str>,
    notices: &Arc<NotificationLog>,
) -> ListQueryController<E, Storage>
where
    E: ListEntity,
    Storage: Repository<E>,
{
    let state = ListQueryState::from_query_string(
        raw_query.unwrap_or_default(),
        E::ORDERABLE,
        E::DEFAULT_PAGE_SIZE,
    );
    ListQueryController::new(ctx.storage.clone(), ctx.authorizer(actor))
        .with_state(state)
        .with_pagination_options(ctx.pagination_options.clone())
        .with_notifier(notices.clone())
        .with_file_store(ctx.files.clone())
}

pub(crate) fn index_page<E>(
    controller: &ListQueryController<E, Storage>,
    page: PagedResult<E>,
) -> IndexPage<E>
where
    E: ListEntity,
    Storage: Repository<E>,
{
    IndexPage {
        last_page: page.last_page(),
        total: page.total,
        page: page.page,
        page_size: page.page_size,
        items: page.items,
        state: controller.state().clone(),
        query_string: controller.state().to_query_string(E::DEFAULT_PAGE_SIZE),
        pagination_options: controller.pagination_options().to_vec(),
        lookups: controller.lookups().clone(),
    }
}

pub fn api_error(err: ListingError) -> ApiError {
    let message = err.to_string();
    match err {
        ListingError::Forbidden { .. } => ApiError::new(ErrorCode::Forbidden, message),
        ListingError::NotFound { .. } | ListingError::BulkDeleteRejected { .. } => {
            ApiError::new(ErrorCode::NotFound, message)
        }
        ListingError::ValidationFailed(errors) => {
            ApiError::validation("The given data was invalid.", errors.into_inner())
        }
        ListingError::InvalidSortField { .. }
        | ListingError::InvalidPageSize
        | ListingError::EmptyImportFile
        | ListingError::NoActiveEdit => ApiError::new(ErrorCode::Validation, message),
        ListingError::PersistenceFailed { .. } => ApiError::new(ErrorCode::Internal, message),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
