//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod deploy;
pub mod health;

use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// 构建完整的 API 路由
///
/// 所有路由同时挂在根路径和 `/api` 下
pub fn router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        // Health
        .merge(health::router())
        // Deploy
        .merge(deploy::router());

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
