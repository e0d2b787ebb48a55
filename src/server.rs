//! HTTP 边界（feature `server`）
//!
//! - POST /api/generateAddress  `{mnemonic, count?, basePath?}` -> `{addresses}`，出错 400
//! - GET  /api/generateMnemonic?wordCount=N -> `{mnemonic, wordCount}`，出错 500
//! - POST /api/getPrivateKey    `{mnemonic, index, basePath?}` -> `{privateKey}`，出错 400
//! - GET  /health -> `{status: "ok"}`
//!
//! 错误响应体统一为 `{error, message}`。服务端不保存任何状态。

use crate::errors::WalletError;
use crate::service::{
    self, GenerateAddressRequest, GenerateAddressResponse, GenerateMnemonicResponse,
    GetPrivateKeyRequest, GetPrivateKeyResponse, MnemonicQuery, ServiceConfig,
};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    /// 调用方输入错误 -> 400
    #[error(transparent)]
    Client(WalletError),
    /// 服务端错误 -> 500
    #[error(transparent)]
    Server(WalletError),
    /// 请求体 / 查询串无法解析
    #[error("malformed request: {1}")]
    Malformed(StatusCode, String),
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        if e.is_client_error() {
            ApiError::Client(e)
        } else {
            ApiError::Server(e)
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        ApiError::Malformed(StatusCode::BAD_REQUEST, r.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Client(e) => (StatusCode::BAD_REQUEST, e.code(), e.to_string()),
            ApiError::Server(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string()),
            ApiError::Malformed(status, msg) => (status, "malformed_request", msg),
        };
        if status.is_server_error() {
            tracing::error!(%status, error = error_type, "request failed");
        } else {
            tracing::debug!(%status, error = error_type, "request rejected");
        }

        let body = Json(json!({
            "error": error_type,
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[derive(Clone, Debug)]
pub struct ApiState {
    config: Arc<ServiceConfig>,
}

impl ApiState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

async fn generate_address(
    State(state): State<ApiState>,
    payload: Result<Json<GenerateAddressRequest>, JsonRejection>,
) -> ApiResult<GenerateAddressResponse> {
    let Json(req) = payload?;
    Ok(Json(service::generate_address(&state.config, &req)?))
}

// 生成助记词的任何失败都返回 500
async fn generate_mnemonic(
    query: Result<Query<MnemonicQuery>, QueryRejection>,
) -> ApiResult<GenerateMnemonicResponse> {
    let Query(query) =
        query.map_err(|r| ApiError::Malformed(StatusCode::INTERNAL_SERVER_ERROR, r.body_text()))?;
    service::generate_mnemonic(&query)
        .map(Json)
        .map_err(ApiError::Server)
}

async fn get_private_key(
    State(state): State<ApiState>,
    payload: Result<Json<GetPrivateKeyRequest>, JsonRejection>,
) -> ApiResult<GetPrivateKeyResponse> {
    let Json(req) = payload?;
    Ok(Json(service::get_private_key(&state.config, &req)?))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/api/generateAddress", post(generate_address))
        .route("/api/generateMnemonic", get(generate_mnemonic))
        .route("/api/getPrivateKey", post(get_private_key))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_server(addr: SocketAddr, config: ServiceConfig) -> anyhow::Result<()> {
    config.validate()?;
    let app = create_router(ApiState::new(config));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "ESN address service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
