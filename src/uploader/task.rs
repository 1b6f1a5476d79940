// 上传任务定义
//
// 一次上传运行 = 一组 FileWorkItem + 漫画/章节元数据，
// 每个文件一个 UploadProgressEntry，运行结束后汇总为 UploadResult

use crate::error::UploadError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// 默认单文件大小上限 10MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// 默认单次最多文件数
pub const DEFAULT_MAX_FILES: usize = 100;

/// 允许上传的图片类型
pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// 内存中的图片文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// 文件名（不含目录）
    pub name: String,
    /// MIME 类型
    pub mime: String,
    /// 文件内容
    pub data: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// 从本地磁盘读取
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::Io(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let mime = mime_from_path(path).to_string();
        Ok(Self { name, mime, data })
    }
}

/// 根据扩展名推断 MIME 类型
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// 单个待上传文件
#[derive(Debug, Clone)]
pub struct FileWorkItem {
    /// 文件ID
    pub id: String,
    /// 文件内容（压缩后会被替换）
    pub file: ImageFile,
    /// 原始大小
    pub original_size: u64,
    /// 压缩后大小（未压缩为 None）
    pub compressed_size: Option<u64>,
}

impl FileWorkItem {
    pub fn new(file: ImageFile) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original_size: file.size(),
            file,
            compressed_size: None,
        }
    }

    /// 从本地路径创建
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        Ok(Self::new(ImageFile::from_path(path).await?))
    }

    /// 压缩确实让文件变小了
    pub fn was_compressed(&self) -> bool {
        matches!(self.compressed_size, Some(size) if size < self.original_size)
    }
}

/// 文件上传状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 成功
    Success,
    /// 失败
    Error,
    /// 重试中（前端状态枚举的一部分，上传运行不会产生）
    Retrying,
}

/// 单个文件的进度条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadProgressEntry {
    pub file_id: String,
    pub file_name: String,
    pub status: UploadStatus,
    /// 0..=100
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

impl UploadProgressEntry {
    pub fn pending(item: &FileWorkItem) -> Self {
        Self {
            file_id: item.id.clone(),
            file_name: item.file.name.clone(),
            status: UploadStatus::Pending,
            progress: 0,
            url: None,
            error: None,
            retry_count: 0,
        }
    }

    pub fn mark_uploading(&mut self) {
        self.status = UploadStatus::Uploading;
        self.progress = 0;
        self.error = None;
    }

    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    pub fn mark_success(&mut self, url: String) {
        self.status = UploadStatus::Success;
        self.progress = 100;
        self.url = Some(url);
        self.error = None;
    }

    pub fn mark_error(&mut self, error: String) {
        self.status = UploadStatus::Error;
        self.progress = 0;
        self.error = Some(error);
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, UploadStatus::Success | UploadStatus::Error)
    }
}

/// 运行统计
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadStats {
    pub total_files: usize,
    pub success_count: usize,
    pub fail_count: usize,
    /// 已尝试文件实际上传的总字节数（压缩后）
    pub total_size: u64,
    /// 压缩后确实变小的文件数
    #[serde(default)]
    pub compressed_count: usize,
    pub duration_ms: u64,
}

/// 一次上传运行的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResult {
    /// 至少一个文件成功
    pub success: bool,
    /// 成功的 URL（按完成顺序）
    pub urls: Vec<String>,
    /// 索引文件链接（更新成功时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stats: UploadStats,
    /// 运行被取消
    #[serde(default)]
    pub cancelled: bool,
}

/// 连载状态
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MangaStatus {
    #[default]
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
}

/// 漫画元数据
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MangaMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub status: MangaStatus,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// 章节元数据
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterMetadata {
    pub number: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub group: String,
}

impl ChapterMetadata {
    /// 索引中的章节键：`卷-话`
    pub fn key(&self) -> String {
        format!("{}-{}", self.volume.trim(), self.number.trim())
    }
}

/// 文件校验结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// 校验待上传文件（数量、大小、类型）
pub fn validate_files(files: &[ImageFile], max_size: u64, max_files: usize) -> FileValidation {
    let mut errors = Vec::new();

    if files.len() > max_files {
        errors.push(format!("最多允许 {} 个文件", max_files));
    }

    for (index, file) in files.iter().enumerate() {
        if file.size() > max_size {
            errors.push(format!(
                "文件 {}: 超过大小上限 {}",
                index + 1,
                format_file_size(max_size)
            ));
        }
        if !ALLOWED_IMAGE_TYPES.contains(&file.mime.as_str()) {
            errors.push(format!("文件 {}: 不支持的文件类型 ({})", index + 1, file.mime));
        }
    }

    FileValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// 格式化文件大小（保留一位小数）
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item(name: &str, size: usize) -> FileWorkItem {
        FileWorkItem::new(ImageFile::new(name, "image/jpeg", vec![0; size]))
    }

    #[test]
    fn test_work_item_creation() {
        let item = item("001.jpg", 2048);
        assert!(!item.id.is_empty());
        assert_eq!(item.original_size, 2048);
        assert_eq!(item.compressed_size, None);
        assert!(!item.was_compressed());
    }

    #[test]
    fn test_was_compressed_requires_smaller_output() {
        let mut item = item("001.jpg", 1000);
        item.compressed_size = Some(1000);
        assert!(!item.was_compressed());
        item.compressed_size = Some(1200);
        assert!(!item.was_compressed());
        item.compressed_size = Some(400);
        assert!(item.was_compressed());
    }

    #[test]
    fn test_status_transitions() {
        let item = item("002.png", 10);
        let mut entry = UploadProgressEntry::pending(&item);
        assert_eq!(entry.status, UploadStatus::Pending);
        assert!(!entry.is_finished());

        entry.mark_uploading();
        assert_eq!(entry.status, UploadStatus::Uploading);
        entry.set_progress(25);
        assert_eq!(entry.progress, 25);

        entry.mark_error("imgbb 上传失败: busy".to_string());
        assert_eq!(entry.status, UploadStatus::Error);
        assert_eq!(entry.progress, 0);
        assert!(entry.is_finished());

        entry.mark_uploading();
        assert!(entry.error.is_none());
        entry.mark_success("https://i.ibb.co/x.png".to_string());
        assert_eq!(entry.progress, 100);
        assert_eq!(entry.url.as_deref(), Some("https://i.ibb.co/x.png"));
    }

    #[test]
    fn test_chapter_key() {
        let chapter = ChapterMetadata {
            number: "12".into(),
            title: "Arc".into(),
            volume: "3".into(),
            group: String::new(),
        };
        assert_eq!(chapter.key(), "3-12");
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path(&PathBuf::from("a/B.JPG")), "image/jpeg");
        assert_eq!(mime_from_path(&PathBuf::from("x.webp")), "image/webp");
        assert_eq!(mime_from_path(&PathBuf::from("notes.txt")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        tokio::fs::write(&path, [1u8, 2, 3]).await.unwrap();

        let item = FileWorkItem::from_path(&path).await.unwrap();
        assert_eq!(item.file.name, "page.png");
        assert_eq!(item.file.mime, "image/png");
        assert_eq!(item.original_size, 3);

        let err = FileWorkItem::from_path(&dir.path().join("missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io(_)));
    }

    #[test]
    fn test_validate_files() {
        let ok = vec![ImageFile::new("a.jpg", "image/jpeg", vec![0; 10])];
        assert!(validate_files(&ok, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FILES).is_valid);

        let files = vec![
            ImageFile::new("a.jpg", "image/jpeg", vec![0; 2048]),
            ImageFile::new("b.txt", "text/plain", vec![0; 10]),
        ];
        let result = validate_files(&files, 1024, 1);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors[1].contains("1.0 KB"));
        assert!(result.errors[2].contains("text/plain"));
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120.0 GB");
    }
}
