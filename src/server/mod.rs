// Web服务器模块

pub mod error;
pub mod events;
pub mod handlers;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// 健康检查响应结构
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "manga-uploader".to_string(),
    })
}

/// 根据配置构建 CORS 层，包含 `*` 时允许任意来源
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let list: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("忽略无效的 CORS 源: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 构建完整应用路由
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    // 配置中间件层
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http()) // HTTP 请求日志
        .layer(cors_layer(cors_origins));

    // API 路由
    let api_routes = Router::new()
        // 配置
        .route(
            "/config",
            get(handlers::get_config)
                .put(handlers::update_config)
                .patch(handlers::update_config_item),
        )
        .route("/config/reset", post(handlers::reset_config))
        .route("/config/export", get(handlers::export_config))
        .route("/config/import", post(handlers::import_config))
        .route("/config/validate", get(handlers::validate_config))
        // 图床
        .route("/hosts", get(handlers::list_hosts))
        .route("/hosts/test", post(handlers::test_hosts))
        // 上传
        .route("/uploads", post(handlers::start_upload))
        .route("/uploads/batch", post(handlers::start_batch_upload))
        .route("/uploads/progress", get(handlers::get_upload_progress))
        .route("/uploads/result", get(handlers::get_upload_result))
        .route("/uploads/cancel", post(handlers::cancel_upload))
        // 索引仓库
        .route("/index", get(handlers::get_index_document))
        .route("/index/test", get(handlers::test_github))
        .route("/index/contents", get(handlers::list_index_contents))
        .route("/index/file", delete(handlers::delete_index_file));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws", get(websocket::handle_websocket))
        .route("/health", get(health_check))
        .layer(middleware)
        .with_state(state)
}
