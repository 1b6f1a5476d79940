// 配置管理 API

use crate::config::{AppConfig, ConfigValidation};
use crate::server::error::{ApiError, ApiResult};
use crate::server::AppState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::ApiResponse;

/// 单项更新请求
#[derive(Debug, Deserialize)]
pub struct UpdateConfigItemRequest {
    /// 点分路径，如 `compression.quality`
    pub path: String,
    pub value: Value,
}

/// 导入请求
#[derive(Debug, Deserialize)]
pub struct ImportConfigRequest {
    /// 导出得到的 JSON 文本
    pub json: String,
}

/// 导出响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportConfigResponse {
    pub json: String,
}

/// GET /api/v1/config
/// 获取当前配置
pub async fn get_config(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<AppConfig>>> {
    let config = app_state.config.read().await.clone();
    Ok(Json(ApiResponse::success(config)))
}

/// PUT /api/v1/config
/// 整体替换配置
pub async fn update_config(
    State(app_state): State<AppState>,
    Json(new_config): Json<AppConfig>,
) -> ApiResult<Json<ApiResponse<AppConfig>>> {
    app_state.persist_config(new_config.clone()).await?;
    info!("配置已更新");
    Ok(Json(ApiResponse::success(new_config)))
}

/// PATCH /api/v1/config
/// 按路径更新单个配置项
pub async fn update_config_item(
    State(app_state): State<AppState>,
    Json(req): Json<UpdateConfigItemRequest>,
) -> ApiResult<Json<ApiResponse<AppConfig>>> {
    let mut config = app_state.config.read().await.clone();
    config.update_path(&req.path, req.value).map_err(|e| {
        warn!("配置项更新失败: {}: {:#}", req.path, e);
        ApiError::BadRequest(format!("{:#}", e))
    })?;

    app_state.persist_config(config.clone()).await?;
    info!("配置项已更新: {}", req.path);
    Ok(Json(ApiResponse::success(config)))
}

/// POST /api/v1/config/reset
/// 恢复默认配置
pub async fn reset_config(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<AppConfig>>> {
    let config = AppConfig::default();
    app_state.persist_config(config.clone()).await?;
    info!("配置已恢复默认");
    Ok(Json(ApiResponse::success(config)))
}

/// GET /api/v1/config/export
pub async fn export_config(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<ExportConfigResponse>>> {
    let json = app_state.config.read().await.export_json()?;
    Ok(Json(ApiResponse::success(ExportConfigResponse { json })))
}

/// POST /api/v1/config/import
pub async fn import_config(
    State(app_state): State<AppState>,
    Json(req): Json<ImportConfigRequest>,
) -> ApiResult<Json<ApiResponse<AppConfig>>> {
    let config =
        AppConfig::import_json(&req.json).map_err(|e| ApiError::BadRequest(format!("{:#}", e)))?;
    app_state.persist_config(config.clone()).await?;
    info!("配置已导入");
    Ok(Json(ApiResponse::success(config)))
}

/// GET /api/v1/config/validate
/// 校验当前配置是否足以开始上传
pub async fn validate_config(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<ConfigValidation>>> {
    let validation = app_state.config.read().await.validate();
    Ok(Json(ApiResponse::success(validation)))
}
