// Manga Uploader Library
// 漫画章节上传：压缩、图床上传、GitHub 索引更新

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 图床模块
pub mod hosts;

// GitHub 索引模块
pub mod index;

// 日志
pub mod logging;

// Web服务器模块
pub mod server;

// 上传模块
pub mod uploader;

// 导出常用类型
pub use config::AppConfig;
pub use error::{IndexError, UploadError};
pub use hosts::{HostRegistry, ImageHost, UploadTarget};
pub use index::{GithubContentStore, IndexStore, IndexUpdater};
pub use server::AppState;
pub use uploader::{
    ChapterMetadata, FileWorkItem, MangaMetadata, ProgressBoard, UploadManager, UploadResult,
};
