use std::{collections::BTreeMap, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use listing::{Actor, Artifact, ExportFormat, NotificationLog, UploadedFile};
use shared::{
    domain::ProductId,
    error::ApiError,
    protocol::{BulkDeleteResponse, EditProductRequest, ImportResponse, ImportRowFailure},
};
use storage::Product;
use tracing::info;

use crate::{
    api_error, controller, index_page, ActionResponse, ApiContext, IndexPage, ProductCsvImporter,
};

pub async fn list_products(
    ctx: &ApiContext,
    actor: Actor,
    raw_query: Option<&str>,
) -> Result<IndexPage<Product>, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Product>(ctx, actor, raw_query, &notices);
    screen.mount(&ctx.storage).await.map_err(api_error)?;
    let page = screen.fetch_page().await.map_err(api_error)?;
    Ok(index_page(&screen, page))
}

pub async fn show_product(
    ctx: &ApiContext,
    actor: Actor,
    product_id: ProductId,
) -> Result<Product, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Product>(ctx, actor, None, &notices);
    screen.open_view(product_id).await.map_err(api_error)
}

pub async fn edit_product(
    ctx: &ApiContext,
    actor: Actor,
    product_id: ProductId,
    request: EditProductRequest,
) -> Result<ActionResponse<Product>, ApiError> {
    let image = match request.image {
        Some(upload) => {
            let bytes = STANDARD.decode(upload.content_b64.as_bytes()).map_err(|_| {
                ApiError::validation(
                    "The given data was invalid.",
                    BTreeMap::from([(
                        "image".to_string(),
                        vec!["The image must be base64 encoded.".to_string()],
                    )]),
                )
            })?;
            Some(UploadedFile::new(upload.filename, bytes))
        }
        None => None,
    };

    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Product>(ctx, actor, None, &notices);
    screen.open_edit(product_id).await.map_err(api_error)?;
    let product = screen
        .submit_edit(&request.fields, image)
        .await
        .map_err(api_error)?;
    Ok(ActionResponse {
        data: product,
        notifications: notices.drain(),
    })
}

pub async fn delete_product(
    ctx: &ApiContext,
    actor: Actor,
    product_id: ProductId,
) -> Result<ActionResponse<()>, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Product>(ctx, actor, None, &notices);
    screen.delete(product_id).await.map_err(api_error)?;
    Ok(ActionResponse {
        data: (),
        notifications: notices.drain(),
    })
}

pub async fn bulk_delete_products(
    ctx: &ApiContext,
    actor: Actor,
    ids: &[i64],
) -> Result<ActionResponse<BulkDeleteResponse>, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Product>(ctx, actor, None, &notices);
    screen
        .selection_mut()
        .select_all(ids.iter().copied().map(ProductId));
    let report = screen.delete_selected().await.map_err(api_error)?;
    Ok(ActionResponse {
        data: BulkDeleteResponse {
            deleted: report.deleted,
        },
        notifications: notices.drain(),
    })
}

pub async fn import_products(
    ctx: &ApiContext,
    actor: Actor,
    bytes: &[u8],
) -> Result<ActionResponse<ImportResponse>, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let mut screen = controller::<Product>(ctx, actor, None, &notices);
    screen.open_import().map_err(api_error)?;

    let importer = ProductCsvImporter::new(ctx.storage.clone());
    let report = screen
        .import_from(bytes, &importer)
        .await
        .map_err(api_error)?;
    Ok(ActionResponse {
        data: ImportResponse {
            imported: report.imported,
            failed: report
                .failed
                .into_iter()
                .map(|failure| ImportRowFailure {
                    row: failure.row,
                    errors: failure.errors,
                })
                .collect(),
        },
        notifications: notices.drain(),
    })
}

/// Exports every product matching the list state in `raw_query`.
pub async fn export_products(
    ctx: &ApiContext,
    actor: Actor,
    raw_query: Option<&str>,
    format: ExportFormat,
) -> Result<Artifact, ApiError> {
    let notices = Arc::new(NotificationLog::new());
    let screen = controller::<Product>(ctx, actor, raw_query, &notices);
    let artifact = screen
        .export_all(format, ctx.formatter.as_ref())
        .await
        .map_err(api_error)?;
    info!(file = %artifact.file_name, size = artifact.bytes.len(), "product export ready");
    Ok(artifact)
}
