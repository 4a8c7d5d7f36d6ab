//! JSON HTTP API over the package catalog.
//!
//! Every handler goes through the [`SharedCatalog`], so requests are
//! serialized against each other and against the filesystem state. The
//! catalog used here must be built with an `AssumeYes` prompter: there is
//! no terminal to answer questions.

use crate::update_checker;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mmpm_catalog::{
    CatalogError, CatalogInfo, HostApplication, OperationResult, SharedCatalog, UpgradeLedger,
};
use mmpm_types::{Outcome, Package, PackageRecord, HOST_APP_NAME, NA};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

pub struct ApiState {
    pub catalog: SharedCatalog,
    pub host: Arc<dyn HostApplication>,
}

/// A catalog failure, reported as `500 {"error": ...}`.
#[derive(Debug)]
pub struct ApiError(String);

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        Self(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("API request failed: {}", self.0);
        let body = Json(serde_json::json!({ "error": self.0 }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct PackagesRequest {
    pub packages: Vec<PackageRecord>,
}

#[derive(Debug, Deserialize)]
pub struct PackageRequest {
    pub package: PackageRecord,
}

#[derive(Debug, Serialize)]
pub struct Failure {
    pub package: PackageRecord,
    pub error: String,
}

/// Result of a batch operation.
#[derive(Debug, Default, Serialize)]
pub struct BatchResponse {
    pub success: Vec<PackageRecord>,
    pub failure: Vec<Failure>,
}

impl BatchResponse {
    fn push(&mut self, package: &Package, outcome: &Outcome) {
        match outcome.message() {
            None => self.success.push(package.to_full_record()),
            Some(message) => self.failure.push(Failure {
                package: package.to_full_record(),
                error: message.to_string(),
            }),
        }
    }
}

impl From<Vec<OperationResult>> for BatchResponse {
    fn from(results: Vec<OperationResult>) -> Self {
        let mut response = Self::default();
        for result in &results {
            response.push(&result.package, &result.outcome);
        }
        response
    }
}

/// Fields missing from a request body deserialize as `N/A`.
fn provided(value: String) -> Option<String> {
    (value != NA).then_some(value)
}

fn to_packages(records: Vec<PackageRecord>) -> Vec<Package> {
    records.into_iter().map(Package::from).collect()
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/packages", get(list_packages))
        .route("/api/packages/upgradable", get(upgradable))
        .route("/api/packages/install", post(install))
        .route("/api/packages/remove", post(remove))
        .route("/api/packages/upgrade", post(upgrade))
        .route("/api/packages/mm-pkg/add", post(add_external))
        .route("/api/packages/mm-pkg/remove", post(remove_external))
        .route("/api/db/info", get(db_info))
        .route("/api/db/refresh", get(db_refresh))
        .route("/api/mmpm/version", get(version))
        .with_state(state)
}

async fn list_packages(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<PackageRecord>> {
    let packages = state.catalog.run(|catalog| catalog.packages_with_upgrades()).await??;
    Ok(Json(packages.iter().map(Package::to_full_record).collect()))
}

async fn upgradable(State(state): State<Arc<ApiState>>) -> ApiResult<UpgradeLedger> {
    Ok(Json(state.catalog.run(|catalog| catalog.upgradable()).await??))
}

async fn install(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PackagesRequest>,
) -> ApiResult<BatchResponse> {
    let packages = to_packages(request.packages);
    let results = state.catalog.run(move |catalog| catalog.install(&packages, true)).await?;
    Ok(Json(results.into()))
}

async fn remove(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PackagesRequest>,
) -> ApiResult<BatchResponse> {
    let packages = to_packages(request.packages);
    let results = state.catalog.run(move |catalog| catalog.remove(&packages, true)).await?;
    Ok(Json(results.into()))
}

async fn upgrade(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PackagesRequest>,
) -> ApiResult<BatchResponse> {
    let titles: Vec<String> = request.packages.into_iter().map(|r| r.title).collect();
    let host = Arc::clone(&state.host);

    let report = state
        .catalog
        .run(move |catalog| catalog.upgrade(&titles, true, Some(host.as_ref())))
        .await??;

    let mut response = BatchResponse::from(report.packages);
    if let Some(outcome) = &report.host_app {
        let host_app = Package::new(HOST_APP_NAME, NA, NA, NA, NA);
        response.push(&host_app, outcome);
    }
    Ok(Json(response))
}

async fn add_external(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PackageRequest>,
) -> (StatusCode, Json<Outcome>) {
    let record = request.package;
    let outcome = state
        .catalog
        .run(move |catalog| {
            catalog.add_external(
                provided(record.title),
                provided(record.author),
                provided(record.repository),
                provided(record.description),
            )
        })
        .await
        .unwrap_or_else(|e| Outcome::failure(e.to_string()));

    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(outcome))
}

async fn remove_external(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PackagesRequest>,
) -> ApiResult<serde_json::Value> {
    let titles: Vec<String> = request.packages.into_iter().map(|r| r.title).collect();
    let removed = state
        .catalog
        .run(move |catalog| catalog.remove_external(&titles, true))
        .await??;

    Ok(Json(serde_json::json!({ "success": removed })))
}

async fn db_info(State(state): State<Arc<ApiState>>) -> ApiResult<CatalogInfo> {
    Ok(Json(state.catalog.run(|catalog| catalog.info()).await?))
}

async fn db_refresh(State(state): State<Arc<ApiState>>) -> ApiResult<CatalogInfo> {
    let info = state
        .catalog
        .run(|catalog| catalog.load(true).map(|()| catalog.info()))
        .await??;

    info!("Catalog refreshed with {} packages", info.packages);
    Ok(Json(info))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": update_checker::current_version() }))
}

/// Listen on `host:port` until interrupted.
pub async fn serve(state: Arc<ApiState>, host: &str, port: u16) -> miette::Result<()> {
    let address = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|_| mmpm_diagnostics::MmpmError::BindFailed { address: address.clone() })?;

    info!("API listening on http://{}", address);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| mmpm_diagnostics::MmpmError::Generic(format!("API server error: {}", e)))?;

    Ok(())
}
