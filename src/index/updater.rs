// 索引更新
//
// 读取 -> 合并章节 -> 带版本号写回。版本冲突直接返回 VersionConflict，
// 不自动重读重写，由用户重新加载后再试

use super::{ChapterRecord, IndexStore, MangaRecord};
use crate::error::IndexError;
use crate::uploader::{ChapterMetadata, MangaMetadata};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct IndexUpdater {
    store: Arc<dyn IndexStore>,
    path: String,
}

impl IndexUpdater {
    pub fn new(store: Arc<dyn IndexStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 把一章的页面写入索引，返回索引文件链接
    ///
    /// - 标题不存在时用 manga 元数据创建漫画记录，已存在时保留原记录
    /// - 章节键 `卷-话` 已存在时整体覆盖（不追加页面）
    pub async fn update_index(
        &self,
        manga: &MangaMetadata,
        chapter: &ChapterMetadata,
        urls: &[String],
    ) -> Result<String, IndexError> {
        let mut versioned = self.store.fetch(&self.path).await?;
        let key = chapter.key();

        let record = versioned
            .document
            .entry(manga.title.clone())
            .or_insert_with(|| {
                info!("索引中新增漫画: {}", manga.title);
                MangaRecord::from_metadata(manga)
            });

        if record.chapters.contains_key(&key) {
            info!("覆盖已有章节: {} {}", manga.title, key);
        }
        record
            .chapters
            .insert(key.clone(), ChapterRecord::from_metadata(chapter, urls.to_vec()));

        let message = format!("Update {} ({} {})", self.path, manga.title, key);
        match self
            .store
            .save(&self.path, &versioned.document, versioned.sha.as_deref(), &message)
            .await
        {
            Ok(link) => {
                info!("索引已更新: {} 第 {} 章 {} 页", manga.title, key, urls.len());
                Ok(link)
            }
            Err(e) => {
                if e.is_conflict() {
                    warn!("索引文件版本冲突: {}", self.path);
                }
                Err(e)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryIndexStore;
    use super::*;
    use crate::index::RemoteIndexDocument;
    use crate::uploader::MangaStatus;

    fn manga(title: &str) -> MangaMetadata {
        MangaMetadata {
            title: title.to_string(),
            author: "author".into(),
            status: MangaStatus::Ongoing,
            ..Default::default()
        }
    }

    fn chapter(volume: &str, number: &str) -> ChapterMetadata {
        ChapterMetadata {
            number: number.into(),
            title: format!("Chapter {}", number),
            volume: volume.into(),
            group: "scan".into(),
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_new_document_and_title() {
        let store = Arc::new(MemoryIndexStore::default());
        let updater = IndexUpdater::new(store.clone(), "manga-index.json");

        let link = updater
            .update_index(&manga("Dandadan"), &chapter("1", "1"), &urls(&["u1", "u2"]))
            .await
            .unwrap();
        assert!(link.ends_with("manga-index.json"));

        let doc = store.document();
        let record = &doc["Dandadan"];
        assert_eq!(record.author, "author");
        assert_eq!(record.chapters["1-1"].pages, urls(&["u1", "u2"]));
        assert_eq!(record.chapters["1-1"].group, "scan");
    }

    #[tokio::test]
    async fn test_other_chapters_are_preserved() {
        let mut doc = RemoteIndexDocument::new();
        let mut record = MangaRecord::from_metadata(&manga("Dandadan"));
        record.description = "kept".into();
        record.chapters.insert(
            "1-1".into(),
            ChapterRecord::from_metadata(&chapter("1", "1"), urls(&["old"])),
        );
        doc.insert("Dandadan".into(), record);
        let store = Arc::new(MemoryIndexStore::with_document(doc, "sha-0"));
        let updater = IndexUpdater::new(store.clone(), "manga-index.json");

        // 漫画元数据不同也不覆盖已有记录
        let mut newer = manga("Dandadan");
        newer.description = "ignored".into();
        updater
            .update_index(&newer, &chapter("1", "2"), &urls(&["p1"]))
            .await
            .unwrap();

        let doc = store.document();
        let record = &doc["Dandadan"];
        assert_eq!(record.description, "kept");
        assert_eq!(record.chapters.len(), 2);
        assert_eq!(record.chapters["1-1"].pages, urls(&["old"]));
        assert_eq!(record.chapters["1-2"].pages, urls(&["p1"]));
    }

    #[tokio::test]
    async fn test_same_key_is_overwritten_not_appended() {
        let store = Arc::new(MemoryIndexStore::default());
        let updater = IndexUpdater::new(store.clone(), "idx.json");

        updater
            .update_index(&manga("A"), &chapter("2", "7"), &urls(&["a", "b", "c"]))
            .await
            .unwrap();
        updater
            .update_index(&manga("A"), &chapter("2", "7"), &urls(&["x"]))
            .await
            .unwrap();

        assert_eq!(store.document()["A"].chapters["2-7"].pages, urls(&["x"]));
    }

    #[tokio::test]
    async fn test_stale_sha_is_conflict_without_second_write() {
        let store = Arc::new(MemoryIndexStore::with_document(RemoteIndexDocument::new(), "sha-0"));
        *store.concurrent_writer.lock() = true;
        let updater = IndexUpdater::new(store.clone(), "manga-index.json");

        let err = updater
            .update_index(&manga("A"), &chapter("1", "1"), &urls(&["u"]))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(*store.saves.lock(), 1);
        assert!(store.document().is_empty());
    }
}
