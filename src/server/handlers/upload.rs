// 上传 API
//
// 同一时间只允许一个运行（单章或批量），运行在后台任务中执行，
// 进度通过 /ws 推送，也可以轮询 /uploads/progress

use crate::hosts::check_run_preconditions;
use crate::server::error::{ApiError, ApiResult};
use crate::server::state::LastRun;
use crate::server::AppState;
use crate::uploader::{
    validate_files, ChapterBatch, ChapterFolderScanner, ChapterMetadata, FileWorkItem,
    MangaMetadata, RunSettings, UploadProgressEntry,
};
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::ApiResponse;

/// 单章上传请求
#[derive(Debug, Deserialize)]
pub struct StartUploadRequest {
    /// 本地图片路径，按上传顺序排列
    pub files: Vec<PathBuf>,
    pub manga: MangaMetadata,
    pub chapter: ChapterMetadata,
}

/// 批量上传请求
#[derive(Debug, Deserialize)]
pub struct StartBatchRequest {
    /// 根目录，每个子文件夹是一章
    pub root: PathBuf,
    pub manga: MangaMetadata,
    #[serde(default)]
    pub volume: String,
}

/// 运行已接受
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunAccepted {
    pub chapters: usize,
    pub total_files: usize,
}

/// 进度快照
#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub run_id: String,
    pub running: bool,
    pub entries: Vec<UploadProgressEntry>,
}

/// 取消响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// 漫画标题不能为空，单章上传时章节号也不能为空
fn require_metadata(manga: &MangaMetadata, chapter: Option<&ChapterMetadata>) -> ApiResult<()> {
    if manga.title.trim().is_empty() {
        return Err(ApiError::BadRequest("请填写漫画标题".to_string()));
    }
    if chapter.is_some_and(|c| c.number.trim().is_empty()) {
        return Err(ApiError::BadRequest("请填写章节号".to_string()));
    }
    Ok(())
}

/// 读取文件并校验数量、大小和类型
async fn load_files(
    paths: &[PathBuf],
    max_size: u64,
    max_files: usize,
) -> ApiResult<Vec<FileWorkItem>> {
    if paths.is_empty() {
        return Err(ApiError::BadRequest("请选择要上传的图片".to_string()));
    }

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        items.push(FileWorkItem::from_path(path).await?);
    }

    let files: Vec<_> = items.iter().map(|item| item.file.clone()).collect();
    let validation = validate_files(&files, max_size, max_files);
    if !validation.is_valid {
        return Err(ApiError::BadRequest(validation.errors.join("; ")));
    }
    Ok(items)
}

/// POST /api/v1/uploads
/// 开始上传一章
pub async fn start_upload(
    State(app_state): State<AppState>,
    Json(req): Json<StartUploadRequest>,
) -> ApiResult<Json<ApiResponse<RunAccepted>>> {
    info!(
        "API: 开始上传 {} 第 {} 章, {} 个文件",
        req.manga.title,
        req.chapter.key(),
        req.files.len()
    );

    require_metadata(&req.manga, Some(&req.chapter))?;
    let config = app_state.config.read().await.clone();
    check_run_preconditions(&config.hosts, &config.strategy)?;

    let files = load_files(
        &req.files,
        config.upload.max_file_size,
        config.upload.max_files,
    )
    .await?;
    let accepted = RunAccepted {
        chapters: 1,
        total_files: files.len(),
    };

    let slot = app_state
        .try_begin_run()
        .ok_or_else(|| ApiError::Conflict("已有上传正在进行".to_string()))?;

    let settings = RunSettings::from_config(&config);
    let manager = app_state.upload_manager().await;
    let state = app_state.clone();

    tokio::spawn(async move {
        let outcome = manager
            .run(files, &req.manga, &req.chapter, &settings, slot.token())
            .await;
        let last = match outcome {
            Ok(result) => LastRun::Single { result },
            Err(e) => {
                error!("上传运行失败: {}", e);
                LastRun::Failed {
                    error: e.to_string(),
                }
            }
        };
        *state.last_run.write().await = last;
        drop(slot);
    });

    Ok(Json(ApiResponse::success(accepted)))
}

/// POST /api/v1/uploads/batch
/// 批量上传根目录下的所有章节文件夹
pub async fn start_batch_upload(
    State(app_state): State<AppState>,
    Json(req): Json<StartBatchRequest>,
) -> ApiResult<Json<ApiResponse<RunAccepted>>> {
    info!("API: 批量上传 {:?}", req.root);

    require_metadata(&req.manga, None)?;
    let config = app_state.config.read().await.clone();
    check_run_preconditions(&config.hosts, &config.strategy)?;

    let scanner = ChapterFolderScanner::new();
    let root = req.root.clone();
    let scanned = tokio::task::spawn_blocking(move || scanner.scan(root))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(|e| ApiError::BadRequest(format!("{:#}", e)))?;

    if scanned.is_empty() {
        return Err(ApiError::BadRequest("未找到包含图片的章节文件夹".to_string()));
    }

    // 任何一章超限都拒绝整个批次，不发布缺页的章节
    let problems: Vec<String> = scanned
        .iter()
        .flat_map(|chapter| {
            chapter
                .validate(config.upload.max_file_size, config.upload.max_files)
                .errors
        })
        .collect();
    if !problems.is_empty() {
        return Err(ApiError::BadRequest(problems.join("; ")));
    }

    let chapters: Vec<ChapterBatch> = scanned
        .iter()
        .map(|chapter| chapter.to_batch(&req.volume))
        .collect();
    let accepted = RunAccepted {
        chapters: chapters.len(),
        total_files: chapters.iter().map(|c| c.files.len()).sum(),
    };

    let slot = app_state
        .try_begin_run()
        .ok_or_else(|| ApiError::Conflict("已有上传正在进行".to_string()))?;

    let settings = RunSettings::from_config(&config);
    let manager = app_state.upload_manager().await;
    let state = app_state.clone();

    tokio::spawn(async move {
        let outcome = manager
            .run_batch(chapters, &req.manga, &settings, slot.token())
            .await;
        let last = match outcome {
            Ok(results) => LastRun::Batch { results },
            Err(e) => {
                error!("批量上传失败: {}", e);
                LastRun::Failed {
                    error: e.to_string(),
                }
            }
        };
        *state.last_run.write().await = last;
        drop(slot);
    });

    Ok(Json(ApiResponse::success(accepted)))
}

/// GET /api/v1/uploads/progress
pub async fn get_upload_progress(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<ProgressSnapshot>>> {
    Ok(Json(ApiResponse::success(ProgressSnapshot {
        run_id: app_state.progress.run_id(),
        running: app_state.is_running(),
        entries: app_state.progress.snapshot(),
    })))
}

/// GET /api/v1/uploads/result
/// 最近一次运行的结果
pub async fn get_upload_result(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<LastRun>>> {
    let last = app_state.last_run.read().await.clone();
    Ok(Json(ApiResponse::success(last)))
}

/// POST /api/v1/uploads/cancel
pub async fn cancel_upload(
    State(app_state): State<AppState>,
) -> ApiResult<Json<ApiResponse<CancelResponse>>> {
    let cancelled = app_state.cancel_run();
    if !cancelled {
        warn!("取消请求被忽略：当前没有上传");
    }
    Ok(Json(ApiResponse::success(CancelResponse { cancelled })))
}
