use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::downloader;
use crate::error::InventoryError;
use crate::loader;
use crate::login::{Accounts, LoginForm, SignupForm};
use crate::product::{Product, ProductFilter, ProductForm, ProductId};
use crate::saving;
use crate::storage::{FileStorage, SharedStorage};

// Uploaded spreadsheets and backups
const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub struct AppState {
    catalog: Mutex<CatalogStore<SharedStorage>>,
    accounts: Accounts<SharedStorage>,
}

impl AppState {
    /// Load the catalog from `storage` and share the backend with the accounts
    pub fn new(storage: SharedStorage) -> Arc<Self> {
        Arc::new(AppState {
            catalog: Mutex::new(CatalogStore::load(storage.clone())),
            accounts: Accounts::new(storage),
        })
    }

    fn catalog(&self) -> Result<MutexGuard<'_, CatalogStore<SharedStorage>>, ApiError> {
        self.catalog.lock().map_err(|_| ApiError::Poisoned)
    }
}

/// Failure of a request, rendered as a JSON notice
#[derive(Debug)]
pub enum ApiError {
    Inventory(InventoryError),
    Unauthorized,
    NotFound(String),
    BadRequest(String),
    Poisoned,
}

impl From<InventoryError> for ApiError {
    fn from(e: InventoryError) -> Self {
        ApiError::Inventory(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, fields) = match self {
            ApiError::Inventory(e) => {
                let status = match &e {
                    InventoryError::Validation(_) | InventoryError::PasswordMismatch => {
                        StatusCode::BAD_REQUEST
                    }
                    InventoryError::DuplicateUser(_) => StatusCode::CONFLICT,
                    InventoryError::Auth => StatusCode::UNAUTHORIZED,
                    InventoryError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    InventoryError::Storage(_)
                    | InventoryError::IdsExhausted
                    | InventoryError::Export(_)
                    | InventoryError::Hash
                    | InventoryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!("request failed: {}", e);
                }
                (status, e.to_string(), e.fields().to_vec())
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "login required".to_string(),
                Vec::new(),
            ),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, Vec::new()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, Vec::new()),
            ApiError::Poisoned => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "catalog unavailable".to_string(),
                Vec::new(),
            ),
        };

        (
            status,
            Json(ErrorBody {
                status: "error",
                message,
                fields,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct SessionResponse {
    username: Option<String>,
}

#[derive(Serialize)]
struct RemoveResponse {
    removed: Option<Product>,
}

#[derive(Serialize)]
struct QrResponse {
    id: ProductId,
    payload: String,
}

#[derive(Serialize)]
struct UserResponse {
    username: String,
    email: String,
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

/// Build the router over an already-initialized state
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/products", get(list_products).post(add_product))
        .route("/api/products/:id", delete(remove_product))
        .route("/api/products/:id/qr", get(product_qr))
        .route("/api/import/preview", post(preview_import))
        .route("/api/import", post(import_products))
        .route("/api/export", get(export_catalog))
        .route("/api/backup", get(backup_catalog))
        .route("/api/restore", post(restore_catalog))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/session", get(session))
        .route("/api/template", get(download_template))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_requests))
                .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .with_state(state)
}

/// Serve the API on `config.bind_addr` until the process stops
///
/// There is a single session for the whole server: once someone logs in,
/// every client that can reach the address is logged in too. Bind to a
/// loopback address unless that is acceptable.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if !config.is_loopback() {
        warn!(
            "{} is reachable from other machines and all clients share one login session",
            config.bind_addr
        );
    }

    let storage = FileStorage::open(&config.data_dir)?;
    info!("Using data directory {}", storage.dir().display());

    let app = router(AppState::new(Arc::new(storage)));

    // Start server
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    info!(
        "{} {} -> {} in {:?}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

/// Authentication middleware
///
/// Lets the request through only while a user is logged in.
async fn require_session(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.accounts.current_user() {
        Ok(Some(_)) => next.run(request).await,
        Ok(None) => ApiError::Unauthorized.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SignupForm>,
) -> ApiResult<impl IntoResponse> {
    let user = state.accounts.signup(&form)?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            username: user.username,
            email: user.email,
        }),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Json<SessionResponse>> {
    let username = state.accounts.login(&form)?;
    Ok(Json(SessionResponse {
        username: Some(username),
    }))
}

async fn logout(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    state.accounts.logout()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn session(State(state): State<Arc<AppState>>) -> ApiResult<Json<SessionResponse>> {
    Ok(Json(SessionResponse {
        username: state.accounts.current_user()?,
    }))
}

async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Json<Vec<Product>>> {
    let catalog = state.catalog()?;
    Ok(Json(catalog.list(&filter).cloned().collect()))
}

async fn add_product(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ProductForm>,
) -> ApiResult<impl IntoResponse> {
    let product = state.catalog()?.add(&form)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn remove_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<RemoveResponse>> {
    let removed = state.catalog()?.remove(ProductId(id))?;
    Ok(Json(RemoveResponse { removed }))
}

async fn product_qr(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<QrResponse>> {
    let catalog = state.catalog()?;
    let product = catalog
        .get(ProductId(id))
        .ok_or_else(|| ApiError::NotFound(format!("no product with id {}", id)))?;
    let payload = product
        .qr_payload()
        .map_err(|e| InventoryError::Export(e.to_string()))?;

    Ok(Json(QrResponse {
        id: product.id,
        payload,
    }))
}

async fn preview_import(multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let (file_name, bytes) = read_upload(multipart).await?;
    let rows = loader::decode_rows(&file_name, &bytes)?;
    Ok(Json(rows))
}

async fn import_products(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    // Decode before locking: the guard must not be held across an await
    let (file_name, bytes) = read_upload(multipart).await?;
    let rows = loader::decode_rows(&file_name, &bytes)?;

    let added = state.catalog()?.add_batch(rows)?;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn download_template() -> ApiResult<Response> {
    let bytes = downloader::import_template()?;
    Ok(attachment(bytes, XLSX_CONTENT_TYPE, "inventory-template.xlsx"))
}

async fn export_catalog(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let catalog = state.catalog()?;
    match query.format.as_deref().unwrap_or("csv") {
        "csv" => Ok(attachment(
            downloader::to_csv(catalog.products()).into_bytes(),
            "text/csv; charset=utf-8",
            "inventory.csv",
        )),
        "xlsx" => Ok(attachment(
            downloader::to_xlsx(catalog.products())?,
            XLSX_CONTENT_TYPE,
            "inventory.xlsx",
        )),
        other => Err(ApiError::BadRequest(format!("unsupported export format {}", other))),
    }
}

async fn backup_catalog(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let bytes = saving::catalog_to_bytes(state.catalog()?.products())?;
    Ok(attachment(bytes, "application/gzip", "inventory.bin.gz"))
}

async fn restore_catalog(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<Vec<Product>>> {
    let (_, bytes) = read_upload(multipart).await?;
    let products = saving::catalog_from_bytes(&bytes)?;

    let mut catalog = state.catalog()?;
    catalog.replace_all(products)?;
    Ok(Json(catalog.products().to_vec()))
}

/// Pull the `file` field out of a multipart upload
async fn read_upload(mut multipart: Multipart) -> ApiResult<(String, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            return Ok((file_name, bytes.to_vec()));
        }
    }

    Err(ApiError::BadRequest("no file data received".to_string()))
}

fn attachment(bytes: Vec<u8>, content_type: &'static str, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}
