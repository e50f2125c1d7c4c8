use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use listing::{Actor, ExportFormat};
use serde::Deserialize;
use server_api::{
    bulk_delete_products, bulk_delete_quotations, delete_product, delete_quotation, edit_product,
    export_products, import_products, list_products, list_quotations, list_sale_payments,
    show_product, show_quotation_customer, supplier_details, ApiContext, TableFormatter,
};
use shared::{
    domain::{ProductId, QuotationId, SaleId, SupplierId},
    error::{ApiError, ErrorCode},
    protocol::{BulkDeleteRequest, EditProductRequest},
};
use storage::{LocalFileStore, Storage};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

mod config;

use config::{build_policy, load_settings, prepare_database_url};

const ACTOR_HEADER: &str = "x-actor";
const ROLES_HEADER: &str = "x-roles";
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext {
        storage,
        files: Arc::new(LocalFileStore::new(settings.upload_dir.clone())),
        policy: Arc::new(build_policy(&settings.roles)),
        formatter: Arc::new(TableFormatter),
        pagination_options: settings.pagination_options.clone(),
    };

    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, uploads = %settings.upload_dir.display(), "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/products", get(http_list_products))
        .route("/products/bulk-delete", post(http_bulk_delete_products))
        .route("/products/import", post(http_import_products))
        .route("/products/export", get(http_export_products))
        .route(
            "/products/:product_id",
            get(http_show_product)
                .put(http_edit_product)
                .delete(http_delete_product),
        )
        .route("/quotations", get(http_list_quotations))
        .route("/quotations/bulk-delete", post(http_bulk_delete_quotations))
        .route("/quotations/:quotation_id", delete(http_delete_quotation))
        .route(
            "/quotations/:quotation_id/customer",
            get(http_show_quotation_customer),
        )
        .route("/sales/:sale_id/payments", get(http_list_sale_payments))
        .route("/suppliers/:supplier_id/details", get(http_supplier_details))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn http_error(err: ApiError) -> HttpError {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

/// Reads the acting user from `x-actor` and the comma separated `x-roles`.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, HttpError> {
    let name = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            http_error(ApiError::new(
                ErrorCode::Unauthorized,
                "missing x-actor header",
            ))
        })?;
    let roles = headers
        .get(ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty());
    Ok(Actor::new(name, roles))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        http_error(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn http_list_products(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let page = list_products(&state.api, actor, raw.as_deref())
        .await
        .map_err(http_error)?;
    Ok(Json(page))
}

async fn http_show_product(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let product = show_product(&state.api, actor, ProductId(product_id))
        .await
        .map_err(http_error)?;
    Ok(Json(product))
}

async fn http_edit_product(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(product_id): Path<i64>,
    Json(req): Json<EditProductRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let response = edit_product(&state.api, actor, ProductId(product_id), req)
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn http_delete_product(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let response = delete_product(&state.api, actor, ProductId(product_id))
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn http_bulk_delete_products(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let response = bulk_delete_products(&state.api, actor, &req.ids)
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn http_import_products(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let response = import_products(&state.api, actor, &body)
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn http_export_products(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ExportQuery>,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let format = match q.format.as_deref() {
        None => ExportFormat::Spreadsheet,
        Some(raw_format) => ExportFormat::parse(raw_format).ok_or_else(|| {
            http_error(ApiError::new(
                ErrorCode::Validation,
                format!("unsupported export format '{raw_format}'"),
            ))
        })?,
    };
    let artifact = export_products(&state.api, actor, raw.as_deref(), format)
        .await
        .map_err(http_error)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(artifact.content_type),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", artifact.file_name))
    {
        response_headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((StatusCode::OK, response_headers, artifact.bytes))
}

async fn http_list_quotations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let page = list_quotations(&state.api, actor, raw.as_deref())
        .await
        .map_err(http_error)?;
    Ok(Json(page))
}

async fn http_show_quotation_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(quotation_id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let customer = show_quotation_customer(&state.api, actor, QuotationId(quotation_id))
        .await
        .map_err(http_error)?;
    Ok(Json(customer))
}

async fn http_delete_quotation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(quotation_id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let response = delete_quotation(&state.api, actor, QuotationId(quotation_id))
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn http_bulk_delete_quotations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let response = bulk_delete_quotations(&state.api, actor, &req.ids)
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn http_list_sale_payments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(sale_id): Path<i64>,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let page = list_sale_payments(&state.api, actor, SaleId(sale_id), raw.as_deref())
        .await
        .map_err(http_error)?;
    Ok(Json(page))
}

async fn http_supplier_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(supplier_id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let actor = actor_from_headers(&headers)?;
    let ledger = supplier_details(&state.api, actor, SupplierId(supplier_id))
        .await
        .map_err(http_error)?;
    Ok(Json(ledger))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
