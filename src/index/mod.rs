// 远程索引模块
//
// 索引文件是一个 JSON 对象：漫画标题 -> 漫画记录，漫画记录下按 `卷-话` 保存章节。
// 读取时拿到版本号（sha），写回时必须带上，远端已变化则写入失败（乐观并发）

pub mod github;
pub mod updater;

use crate::error::IndexError;
use crate::uploader::{ChapterMetadata, MangaMetadata, MangaStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use github::{ContentEntry, GithubContentStore};
pub use updater::IndexUpdater;

/// 索引文档：标题 -> 漫画记录
pub type RemoteIndexDocument = BTreeMap<String, MangaRecord>;

/// 漫画记录
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MangaRecord {
    #[serde(default)]
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
    #[serde(default)]
    pub chapters: BTreeMap<String, ChapterRecord>,
    /// 其他工具写入的字段，原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MangaRecord {
    pub fn from_metadata(manga: &MangaMetadata) -> Self {
        Self {
            title: manga.title.clone(),
            description: manga.description.clone(),
            artist: manga.artist.clone(),
            author: manga.author.clone(),
            cover: manga.cover.clone(),
            status: manga.status,
            categories: manga.categories.clone(),
            chapters: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

/// 章节记录
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChapterRecord {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub group: String,
    /// 页面 URL（按页序）
    #[serde(default)]
    pub pages: Vec<String>,
    /// RFC 3339 时间
    #[serde(default)]
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChapterRecord {
    pub fn from_metadata(chapter: &ChapterMetadata, pages: Vec<String>) -> Self {
        Self {
            number: chapter.number.clone(),
            title: chapter.title.clone(),
            volume: chapter.volume.clone(),
            group: chapter.group.clone(),
            pages,
            updated_at: chrono::Utc::now().to_rfc3339(),
            extra: Map::new(),
        }
    }
}

/// 带版本号的文档
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionedDocument {
    pub document: RemoteIndexDocument,
    /// None 表示文件还不存在
    pub sha: Option<String>,
}

/// 索引存储
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// 读取文档，文件不存在时返回空文档 + None
    async fn fetch(&self, path: &str) -> Result<VersionedDocument, IndexError>;

    /// 写回文档，sha 必须是读取时拿到的版本号；返回可供查看的链接
    async fn save(
        &self,
        path: &str,
        document: &RemoteIndexDocument,
        sha: Option<&str>,
        message: &str,
    ) -> Result<String, IndexError>;
}
