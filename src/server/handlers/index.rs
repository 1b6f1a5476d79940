// GitHub 索引 API

use crate::error::IndexError;
use crate::index::{ContentEntry, GithubContentStore, IndexStore, RemoteIndexDocument};
use crate::server::error::{ApiError, ApiResult};
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ApiResponse;

/// 连接测试响应
#[derive(Debug, Serialize, Deserialize)]
pub struct GithubConnectionResponse {
    /// 仓库全名 owner/repo
    pub repository: String,
}

/// 查询参数：path
#[derive(Debug, Deserialize)]
pub struct ContentsQuery {
    #[serde(default)]
    pub path: String,
}

/// 删除文件请求
#[derive(Debug, Deserialize)]
pub struct DeleteFileRequest {
    pub path: String,
    pub sha: String,
}

/// 索引文档响应
#[derive(Debug, Serialize)]
pub struct IndexDocumentResponse {
    pub path: String,
    pub sha: Option<String>,
    pub document: RemoteIndexDocument,
}

async fn require_store(app_state: &AppState) -> ApiResult<GithubContentStore> {
    app_state.github_store().await.ok_or_else(|| {
        ApiError::from(IndexError::NotConfigured(
            "请先配置 GitHub Token、Owner 和 Repository".to_string(),
        ))
    })
}

/// POST /api/v1/index/test
/// 测试 GitHub 连接
pub async fn test_github(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<GithubConnectionResponse>>> {
    info!("API: 测试 GitHub 连接");
    let store = require_store(&app_state).await?;
    let repository = store.test_connection().await?;
    Ok(Json(ApiResponse::success(GithubConnectionResponse { repository })))
}

/// GET /api/v1/index/contents?path=xxx
/// 列出仓库目录
pub async fn list_index_contents(
    State(app_state): State<AppState>,
    Query(query): Query<ContentsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<ContentEntry>>>> {
    let store = require_store(&app_state).await?;
    let entries = store.list_contents(&query.path).await?;
    Ok(Json(ApiResponse::success(entries)))
}

/// GET /api/v1/index
/// 读取当前索引文档
pub async fn get_index_document(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<IndexDocumentResponse>>> {
    let store = require_store(&app_state).await?;
    let path = app_state.config.read().await.github.filename.clone();
    let versioned = store.fetch(&path).await?;
    Ok(Json(ApiResponse::success(IndexDocumentResponse {
        path,
        sha: versioned.sha,
        document: versioned.document,
    })))
}

/// DELETE /api/v1/index/file
/// 删除仓库中的文件
pub async fn delete_index_file(
    State(app_state): State<AppState>,
    Json(req): Json<DeleteFileRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    info!("API: 删除 GitHub 文件: {}", req.path);
    let store = require_store(&app_state).await?;
    store.delete_file(&req.path, &req.sha).await?;
    Ok(Json(ApiResponse::success(())))
}
