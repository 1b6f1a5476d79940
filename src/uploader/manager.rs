// 上传管理器
//
// 负责一次上传运行的完整流程：
// - 前置条件检查（没有可用图床时一个文件都不尝试）
// - 逐个文件：压缩 -> 选择图床 -> 带重试上传
// - 进度面板与事件广播
// - 运行结束后更新远程索引（失败不影响上传结果）
//
// 文件严格串行处理，同一时间只有一个文件在上传

use crate::config::{AppConfig, CompressionSettings, HostsConfig, StrategyConfig};
use crate::error::UploadError;
use crate::hosts::{check_run_preconditions, pick_target_for_index, HostRegistry};
use crate::index::IndexUpdater;
use crate::server::events::{NoticeLevel, UploadEvent};
use crate::uploader::{
    compress_image, with_retry_if, ChapterMetadata, FileWorkItem, ImageFile, MangaMetadata,
    ProgressBoard, RetryPolicy, UploadResult, UploadStats,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 单次运行使用的配置快照
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub hosts: HostsConfig,
    pub strategy: StrategyConfig,
    pub compression: CompressionSettings,
    pub retry: RetryPolicy,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            strategy: config.strategy.clone(),
            compression: config.compression.clone(),
            retry: config.upload.retry_policy(),
        }
    }
}

/// 一章的图片来源
#[derive(Debug, Clone)]
pub enum ChapterFiles {
    /// 已读入内存
    Loaded(Vec<FileWorkItem>),
    /// 本地路径，轮到这一章时才读取
    OnDisk(Vec<PathBuf>),
}

impl ChapterFiles {
    pub fn len(&self) -> usize {
        match self {
            ChapterFiles::Loaded(items) => items.len(),
            ChapterFiles::OnDisk(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 读取全部图片，任一文件失败则整章失败
    pub async fn load(self) -> Result<Vec<FileWorkItem>, UploadError> {
        match self {
            ChapterFiles::Loaded(items) => Ok(items),
            ChapterFiles::OnDisk(paths) => {
                let mut items = Vec::with_capacity(paths.len());
                for path in &paths {
                    items.push(FileWorkItem::from_path(path).await?);
                }
                Ok(items)
            }
        }
    }
}

/// 批量上传中的一章
#[derive(Debug, Clone)]
pub struct ChapterBatch {
    pub chapter: ChapterMetadata,
    pub files: ChapterFiles,
}

/// 批量上传中一章的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchChapterResult {
    pub chapter: ChapterMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<UploadResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 上传管理器
pub struct UploadManager {
    /// 图床实现
    registry: HostRegistry,
    /// 索引更新器（未配置 GitHub 时为 None）
    index: Option<IndexUpdater>,
    /// 进度面板
    progress: Arc<ProgressBoard>,
}

impl UploadManager {
    pub fn new(registry: HostRegistry, progress: Arc<ProgressBoard>) -> Self {
        Self {
            registry,
            index: None,
            progress,
        }
    }

    pub fn with_index(mut self, index: Option<IndexUpdater>) -> Self {
        self.index = index;
        self
    }

    pub fn progress(&self) -> Arc<ProgressBoard> {
        self.progress.clone()
    }

    /// 上传一章
    ///
    /// 前置条件失败时返回 Err，此时进度面板不变；
    /// 单个文件失败只记录在进度条目里，运行继续
    pub async fn run(
        &self,
        files: Vec<FileWorkItem>,
        manga: &MangaMetadata,
        chapter: &ChapterMetadata,
        settings: &RunSettings,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, UploadError> {
        check_run_preconditions(&settings.hosts, &settings.strategy)?;

        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        self.progress.reset(&run_id, &files);
        self.progress.publish(UploadEvent::RunStarted {
            run_id: run_id.clone(),
            total_files: files.len(),
            chapter_key: Some(chapter.key()),
        });

        info!(
            "开始上传: {} 第 {} 章, {} 个文件, 模式 {}",
            manga.title,
            chapter.key(),
            files.len(),
            settings.strategy.current.as_str()
        );

        let total_files = files.len();
        // 已尝试文件的实际上传字节数（压缩后）
        let mut total_size: u64 = 0;
        let mut compressed_count = 0;
        let mut urls = Vec::new();
        let mut success_count = 0;
        let mut fail_count = 0;
        let mut cancelled = false;

        for (index, mut item) in files.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("上传已取消，剩余 {} 个文件未处理", total_files - index);
                cancelled = true;
                break;
            }

            self.progress.update(index, |entry| entry.mark_uploading());

            let upload_file = if settings.compression.enabled {
                let compressed = compress_blocking(&item, &settings.compression).await;
                item.compressed_size = Some(compressed.size());
                if item.was_compressed() {
                    compressed_count += 1;
                }
                compressed
            } else {
                item.file.clone()
            };
            total_size += upload_file.size();
            self.progress.update(index, |entry| entry.set_progress(25));

            let (outcome, retries) = self.upload_one(index, &upload_file, settings, cancel).await;
            match outcome {
                Ok(url) => {
                    success_count += 1;
                    self.progress.update(index, |entry| {
                        entry.mark_success(url.clone());
                        entry.retry_count = retries;
                    });
                    urls.push(url);
                }
                Err(UploadError::Cancelled) => {
                    fail_count += 1;
                    self.progress.update(index, |entry| {
                        entry.mark_error(UploadError::Cancelled.to_string());
                        entry.retry_count = retries;
                    });
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    error!("文件上传失败: {}: {}", item.file.name, e);
                    fail_count += 1;
                    self.progress.update(index, |entry| {
                        entry.mark_error(e.to_string());
                        entry.retry_count = retries;
                    });
                }
            }
        }

        let stats = UploadStats {
            total_files,
            success_count,
            fail_count,
            total_size,
            compressed_count,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        let mut result = UploadResult {
            success: success_count > 0,
            urls,
            index_url: None,
            error: (fail_count > 0).then(|| format!("{} 个文件上传失败", fail_count)),
            stats,
            cancelled,
        };

        if !result.urls.is_empty() && !cancelled {
            result.index_url = self.update_index(&run_id, manga, chapter, &result.urls).await;
        }

        info!(
            "上传结束: 成功 {}, 失败 {}, 耗时 {}ms",
            result.stats.success_count, result.stats.fail_count, result.stats.duration_ms
        );

        self.progress.publish(UploadEvent::RunCompleted {
            run_id,
            result: result.clone(),
        });

        Ok(result)
    }

    /// 单个文件：选择图床 + 带重试上传
    ///
    /// 返回结果和实际发生的重试次数
    async fn upload_one(
        &self,
        index: usize,
        file: &ImageFile,
        settings: &RunSettings,
        cancel: &CancellationToken,
    ) -> (Result<String, UploadError>, u32) {
        let host = match pick_target_for_index(&settings.hosts, &settings.strategy, index)
            .and_then(|target| self.registry.get(target))
        {
            Ok(host) => host,
            Err(e) => return (Err(e), 0),
        };
        let target = host.target();

        let mut retries = 0;
        let outcome = with_retry_if(
            &settings.retry,
            cancel,
            UploadError::is_retriable,
            |retry, e| {
                // 重试对进度流不可见，条目保持 uploading
                retries = retry;
                warn!("{} 第 {} 次重试 ({}): {}", file.name, retry, target, e);
            },
            |_| host.send(file, &settings.hosts, cancel),
        )
        .await;
        (outcome, retries)
    }

    /// 更新远程索引，失败只发出警告通知
    async fn update_index(
        &self,
        run_id: &str,
        manga: &MangaMetadata,
        chapter: &ChapterMetadata,
        urls: &[String],
    ) -> Option<String> {
        let Some(index) = &self.index else {
            info!("未配置 GitHub，跳过索引更新");
            return None;
        };

        match index.update_index(manga, chapter, urls).await {
            Ok(link) => {
                self.progress.publish(UploadEvent::IndexUpdated {
                    run_id: run_id.to_string(),
                    url: link.clone(),
                });
                self.progress.publish(UploadEvent::notice(
                    NoticeLevel::Success,
                    "索引已更新",
                    format!("{} 第 {} 章已写入 {}", manga.title, chapter.key(), index.path()),
                ));
                Some(link)
            }
            Err(e) => {
                warn!("更新索引失败（上传结果不受影响）: {}", e);
                self.progress.publish(UploadEvent::notice(
                    NoticeLevel::Warning,
                    "索引更新失败",
                    e.to_string(),
                ));
                None
            }
        }
    }

    /// 批量上传多个章节
    ///
    /// 按顺序逐章读取并调用 run，同一时间内存里只有一章的图片；
    /// 读取失败的章节整章跳过，取消后不再开始新的章节
    pub async fn run_batch(
        &self,
        chapters: Vec<ChapterBatch>,
        manga: &MangaMetadata,
        settings: &RunSettings,
        cancel: &CancellationToken,
    ) -> Result<Vec<BatchChapterResult>, UploadError> {
        check_run_preconditions(&settings.hosts, &settings.strategy)?;

        let total = chapters.len();
        let mut results = Vec::with_capacity(total);

        for (i, batch) in chapters.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("批量上传已取消，剩余 {} 章未处理", total - i);
                break;
            }

            info!("批量上传 {}/{}: 第 {} 章", i + 1, total, batch.chapter.key());
            let files = match batch.files.load().await {
                Ok(files) => files,
                Err(e) => {
                    warn!("读取第 {} 章失败，整章跳过: {}", batch.chapter.key(), e);
                    results.push(BatchChapterResult {
                        chapter: batch.chapter,
                        result: None,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };
            let outcome = self.run(files, manga, &batch.chapter, settings, cancel).await;
            let item = match outcome {
                Ok(result) => BatchChapterResult {
                    chapter: batch.chapter,
                    result: Some(result),
                    error: None,
                },
                Err(e) => BatchChapterResult {
                    chapter: batch.chapter,
                    result: None,
                    error: Some(e.to_string()),
                },
            };
            results.push(item);
        }

        Ok(results)
    }
}

/// 在阻塞线程池里压缩，任务异常时退回原文件
async fn compress_blocking(
    item: &FileWorkItem,
    settings: &CompressionSettings,
) -> ImageFile {
    let file = item.file.clone();
    let settings = settings.clone();
    match tokio::task::spawn_blocking(move || compress_image(&file, &settings)).await {
        Ok(compressed) => compressed,
        Err(e) => {
            warn!("压缩任务异常，使用原文件: {}: {}", item.file.name, e);
            item.file.clone()
        }
    }
}
