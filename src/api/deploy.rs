//! 部署管理 API
//!
//! 包含 /deploy/, /stop/, /status/:container_id/, /deployments 端点

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::deploy::{DeploymentRecord, TeardownRequest};
use crate::error::{ApiError, ApiResult};
use crate::services::deploy::DeployError;
use crate::state::AppState;

/// 部署请求
#[derive(Debug, Clone, Deserialize)]
pub struct DeployRequest {
    pub repo_url: Option<String>,
}

/// 部署响应
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub container_id: String,
    pub ngrok_url: String,
    pub repo_url: String,
}

/// 停止请求，`container_id` 与 `repo_url` 至少提供一个
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopRequest {
    pub container_id: Option<String>,
    pub repo_url: Option<String>,
}

/// 停止响应
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub message: String,
}

/// 部署列表响应
#[derive(Debug, Serialize)]
pub struct DeploymentListResponse {
    pub deployments: Vec<DeploymentRecord>,
    pub total: usize,
}

/// 创建部署管理路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deploy/", post(deploy))
        .route("/deploy", post(deploy))
        .route("/stop/", post(stop))
        .route("/stop", post(stop))
        .route("/status/:container_id/", get(get_status))
        .route("/status/:container_id", get(get_status))
        .route("/deployments", get(list_deployments))
}

/// 部署仓库
///
/// POST /deploy/
async fn deploy(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let repo_url = non_blank(request.repo_url)
        .ok_or_else(|| ApiError::bad_request("repo_url is required"))?;

    let deployment = state.orchestrator.deploy(&repo_url).await.map_err(|e| {
        warn!(repo_url = %repo_url, kind = e.kind(), error = %e, "Deploy request failed");
        ApiError::from(e)
    })?;

    state
        .store
        .insert(DeploymentRecord::from_deployment(&deployment))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(DeployResponse {
            container_id: deployment.container_id,
            ngrok_url: deployment.public_url,
            repo_url: deployment.repo_url,
        }),
    ))
}

/// 停止部署
///
/// POST /stop/
///
/// 缺失的标识和隧道句柄从已保存的记录中补全
async fn stop(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> ApiResult<Json<StopResponse>> {
    let Json(request) = payload?;
    let container_id = non_blank(request.container_id);
    let repo_url = non_blank(request.repo_url);

    if container_id.is_none() && repo_url.is_none() {
        return Err(DeployError::MissingIdentifier.into());
    }

    // 给出 container_id 时只使用该容器自己的记录，避免关闭其他部署的隧道
    let record = match (&container_id, &repo_url) {
        (Some(id), _) => state.store.get(id).await,
        (None, Some(url)) => state.store.find_by_repo(url).await,
        (None, None) => None,
    };

    let teardown = TeardownRequest {
        container_id: container_id
            .clone()
            .or_else(|| record.as_ref().map(|r| r.container_id.clone())),
        repo_url: repo_url
            .clone()
            .or_else(|| record.as_ref().map(|r| r.repo_url.clone())),
        tunnel: record.as_ref().map(DeploymentRecord::tunnel_handle),
    };

    let report = state.orchestrator.teardown(&teardown).await.map_err(|e| {
        warn!(
            container_id = ?teardown.container_id,
            repo_url = ?teardown.repo_url,
            kind = e.kind(),
            error = %e,
            "Stop request failed"
        );
        ApiError::from(e)
    })?;

    if let Some(id) = &container_id {
        state.store.remove_by_container(id).await;
    } else if let Some(url) = &repo_url {
        state.store.remove_by_repo(url).await;
    }

    info!(report = ?report, "Deployment stopped");

    Ok(Json(StopResponse {
        message: "Deployment stopped successfully".to_string(),
    }))
}

/// 查询部署记录
///
/// GET /status/:container_id/
async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
) -> ApiResult<Json<DeploymentRecord>> {
    state
        .store
        .get(&container_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Deployment {}", container_id)))
}

/// 列出所有部署记录（最新的在前）
///
/// GET /deployments
async fn list_deployments(State(state): State<Arc<AppState>>) -> Json<DeploymentListResponse> {
    let deployments = state.store.list().await;
    let total = deployments.len();
    Json(DeploymentListResponse { deployments, total })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
