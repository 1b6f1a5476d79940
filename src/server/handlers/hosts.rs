// 图床 API

use crate::hosts::{available_targets, test_connectivity, UploadTarget};
use crate::server::error::ApiResult;
use crate::server::AppState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::ApiResponse;

/// 图床状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostStatus {
    pub target: UploadTarget,
    /// 凭证是否已配置
    pub available: bool,
    /// 是否为单图床模式的首选图床
    pub preferred: bool,
}

/// GET /api/v1/hosts
/// 列出所有图床及其配置状态
pub async fn list_hosts(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<HostStatus>>>> {
    let config = app_state.config.read().await;
    let available = available_targets(&config.hosts);
    let hosts = UploadTarget::ALL
        .iter()
        .map(|&target| HostStatus {
            target,
            available: available.contains(&target),
            preferred: config.strategy.preferred_host == target,
        })
        .collect();
    Ok(Json(ApiResponse::success(hosts)))
}

/// POST /api/v1/hosts/test
/// 向每个已配置的图床上传测试图片
pub async fn test_hosts(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<BTreeMap<UploadTarget, bool>>>> {
    info!("API: 测试图床连通性");
    let hosts = app_state.config.read().await.hosts.clone();
    let registry = app_state.host_registry().await;
    let results = test_connectivity(&registry, &hosts, &CancellationToken::new()).await;
    Ok(Json(ApiResponse::success(results)))
}
