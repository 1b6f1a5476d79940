// 上传模块
//
// - compress: 图片压缩（缩放 + 重新编码）
// - retry: 指数退避重试
// - progress: 进度面板与事件广播
// - manager: 一次上传运行的编排（串行、可取消）
// - folder: 批量上传的章节文件夹扫描

pub mod compress;
pub mod folder;
pub mod manager;
pub mod progress;
pub mod retry;
pub mod task;

pub use compress::{compress_image, compression_ratio, fit_within, optimal_quality};
pub use folder::{natural_cmp, ChapterFolderScanner, ScanOptions, ScannedChapter, ScannedFile};
pub use manager::{BatchChapterResult, ChapterBatch, ChapterFiles, RunSettings, UploadManager};
pub use progress::ProgressBoard;
pub use retry::{with_retry, with_retry_if, RetryPolicy};
pub use task::{
    format_file_size, mime_from_path, validate_files, ChapterMetadata, FileValidation,
    FileWorkItem, ImageFile, MangaMetadata, MangaStatus, UploadProgressEntry, UploadResult,
    UploadStats, UploadStatus, ALLOWED_IMAGE_TYPES, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE,
};
