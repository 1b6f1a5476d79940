// GitHub contents API 存储
//
// GET/PUT/DELETE {api}/repos/{owner}/{repo}/contents/{path}
// 文件内容为 base64 编码的 JSON，写入时带上读取到的 sha

use super::{IndexStore, RemoteIndexDocument, VersionedDocument};
use crate::config::GithubConfig;
use crate::error::IndexError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// GitHub API 地址
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// 仓库目录条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    #[serde(default)]
    content: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    html_url: String,
}

pub struct GithubContentStore {
    client: Client,
    config: GithubConfig,
    api_base: String,
}

impl GithubContentStore {
    pub fn new(client: Client, config: GithubConfig) -> Self {
        Self::with_api_base(client, config, GITHUB_API_BASE)
    }

    pub fn with_api_base(client: Client, config: GithubConfig, api_base: impl Into<String>) -> Self {
        Self {
            client,
            config,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn ensure_configured(&self) -> Result<(), IndexError> {
        let mut missing = Vec::new();
        if self.config.pat.trim().is_empty() {
            missing.push("pat");
        }
        if self.config.owner.trim().is_empty() {
            missing.push("owner");
        }
        if self.config.repo.trim().is_empty() {
            missing.push("repo");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IndexError::NotConfigured(format!("缺少 {}", missing.join(", "))))
        }
    }

    fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_base,
            urlencoding::encode(self.config.owner.trim()),
            urlencoding::encode(self.config.repo.trim())
        )
    }

    fn contents_url(&self, path: &str) -> String {
        // 保留路径分隔符，逐段编码
        let encoded: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/contents/{}", self.repo_url(), encoded.join("/"))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.pat.trim()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String), IndexError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        debug!("GitHub 响应: status={}, body_len={}", status, body.len());
        Ok((status, body))
    }

    /// 测试连接：先检查 token 格式，再访问仓库
    pub async fn test_connection(&self) -> Result<String, IndexError> {
        self.ensure_configured()?;
        let pat = self.config.pat.trim();
        if !pat.starts_with("ghp_") && !pat.starts_with("github_pat_") {
            return Err(IndexError::NotConfigured(
                "Token 格式不正确，应以 ghp_ 或 github_pat_ 开头".to_string(),
            ));
        }

        let (status, body) = self.send(self.client.get(self.repo_url())).await?;
        if !status.is_success() {
            return Err(map_status(status, &body, &self.config.filename, false));
        }

        let full_name = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("full_name").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("{}/{}", self.config.owner, self.config.repo));
        info!("GitHub 连接成功: {}", full_name);
        Ok(full_name)
    }

    /// 列出仓库目录，不存在时返回空列表
    pub async fn list_contents(&self, path: &str) -> Result<Vec<ContentEntry>, IndexError> {
        self.ensure_configured()?;
        let (status, body) = self.send(self.client.get(self.contents_url(path))).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(map_status(status, &body, path, false));
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| IndexError::Decode(e.to_string()))?;
        let entries = match value {
            Value::Array(items) => items,
            single => vec![single],
        };
        entries
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| IndexError::Decode(e.to_string())))
            .collect()
    }

    /// 删除文件
    pub async fn delete_file(&self, path: &str, sha: &str) -> Result<(), IndexError> {
        self.ensure_configured()?;
        if sha.trim().is_empty() {
            return Err(IndexError::NotConfigured("删除文件需要 sha".to_string()));
        }

        let body = json!({
            "message": format!("Delete {}", path),
            "sha": sha,
        });
        let (status, text) = self
            .send(self.client.delete(self.contents_url(path)).json(&body))
            .await?;
        if !status.is_success() {
            return Err(map_status(status, &text, path, true));
        }
        info!("已删除 GitHub 文件: {}", path);
        Ok(())
    }
}

/// 解码 contents API 返回的 base64 内容（GitHub 每 60 字符插入换行）
fn decode_content(content: &str) -> Result<RemoteIndexDocument, IndexError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| IndexError::Decode(e.to_string()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(RemoteIndexDocument::new());
    }
    serde_json::from_slice(&bytes).map_err(|e| IndexError::Decode(e.to_string()))
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

/// HTTP 状态码映射为索引错误
///
/// `is_write` 为 true 时 404 表示仓库不存在
fn map_status(status: StatusCode, body: &str, path: &str, is_write: bool) -> IndexError {
    let code = status.as_u16();
    match code {
        401 => IndexError::Unauthorized,
        403 => IndexError::Forbidden,
        404 if is_write => IndexError::RepositoryNotFound,
        409 => IndexError::VersionConflict {
            path: path.to_string(),
        },
        422 if api_message(body).to_lowercase().contains("sha") => IndexError::VersionConflict {
            path: path.to_string(),
        },
        500..=599 => IndexError::Server(code),
        404 => IndexError::RepositoryNotFound,
        _ => IndexError::Http {
            status: code,
            message: api_message(body),
        },
    }
}

#[async_trait]
impl IndexStore for GithubContentStore {
    async fn fetch(&self, path: &str) -> Result<VersionedDocument, IndexError> {
        self.ensure_configured()?;
        let (status, body) = self.send(self.client.get(self.contents_url(path))).await?;

        if status == StatusCode::NOT_FOUND {
            debug!("索引文件不存在，视为空文档: {}", path);
            return Ok(VersionedDocument::default());
        }
        if !status.is_success() {
            return Err(map_status(status, &body, path, false));
        }

        let file: FileResponse =
            serde_json::from_str(&body).map_err(|e| IndexError::Decode(e.to_string()))?;
        let document = decode_content(&file.content)?;
        Ok(VersionedDocument {
            document,
            sha: Some(file.sha),
        })
    }

    async fn save(
        &self,
        path: &str,
        document: &RemoteIndexDocument,
        sha: Option<&str>,
        message: &str,
    ) -> Result<String, IndexError> {
        self.ensure_configured()?;

        let pretty =
            serde_json::to_string_pretty(document).map_err(|e| IndexError::Decode(e.to_string()))?;
        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(pretty.as_bytes()),
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha.to_string());
        }

        let (status, text) = self
            .send(self.client.put(self.contents_url(path)).json(&body))
            .await?;
        if !status.is_success() {
            let err = map_status(status, &text, path, true);
            warn!("写入索引文件失败: {} ({})", err, status);
            return Err(err);
        }

        let put: PutResponse =
            serde_json::from_str(&text).map_err(|e| IndexError::Decode(e.to_string()))?;
        Ok(put.content.html_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::transport::test_support::spawn_mock;
    use crate::index::{ChapterRecord, IndexUpdater, MangaRecord};
    use crate::uploader::{ChapterMetadata, MangaMetadata};
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn config() -> GithubConfig {
        GithubConfig {
            pat: "ghp_test".into(),
            owner: "me".into(),
            repo: "library".into(),
            filename: "manga-index.json".into(),
        }
    }

    fn store(base: &str) -> GithubContentStore {
        GithubContentStore::with_api_base(Client::new(), config(), base)
    }

    /// 模拟 contents API 的单文件仓库
    #[derive(Default)]
    struct FakeRepo {
        content: Option<(String, String)>,
        last_put: Option<Value>,
        auth_seen: Vec<String>,
    }

    type Shared = Arc<Mutex<FakeRepo>>;

    async fn get_file(State(repo): State<Shared>, headers: HeaderMap) -> (HttpStatus, Json<Value>) {
        let mut repo = repo.lock();
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            repo.auth_seen.push(auth.to_string());
        }
        match &repo.content {
            Some((content, sha)) => (
                HttpStatus::OK,
                Json(json!({"content": content, "sha": sha, "encoding": "base64"})),
            ),
            None => (HttpStatus::NOT_FOUND, Json(json!({"message": "Not Found"}))),
        }
    }

    async fn put_file(State(repo): State<Shared>, Json(body): Json<Value>) -> (HttpStatus, Json<Value>) {
        let mut repo = repo.lock();
        let current_sha = repo.content.as_ref().map(|(_, sha)| sha.clone());
        let given_sha = body.get("sha").and_then(Value::as_str).map(str::to_string);
        if current_sha != given_sha {
            return (
                HttpStatus::CONFLICT,
                Json(json!({"message": "manga-index.json does not match sha"})),
            );
        }
        let content = body["content"].as_str().unwrap_or_default().to_string();
        repo.content = Some((content, "sha-new".to_string()));
        repo.last_put = Some(body);
        (
            HttpStatus::OK,
            Json(json!({"content": {"html_url": "https://github.com/me/library/blob/main/manga-index.json"}})),
        )
    }

    async fn spawn_repo(repo: Shared) -> String {
        let router = Router::new()
            .route(
                "/repos/me/library/contents/manga-index.json",
                get(get_file).put(put_file),
            )
            .with_state(repo);
        spawn_mock(router).await
    }

    /// GitHub 返回的 base64 每 60 字符带换行
    fn github_base64(json: &str) -> String {
        let encoded = STANDARD.encode(json.as_bytes());
        encoded
            .as_bytes()
            .chunks(60)
            .map(|c| String::from_utf8_lossy(c).to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_status_mapping() {
        let p = "idx.json";
        assert_eq!(map_status(StatusCode::UNAUTHORIZED, "", p, false), IndexError::Unauthorized);
        assert_eq!(map_status(StatusCode::FORBIDDEN, "", p, true), IndexError::Forbidden);
        assert_eq!(
            map_status(StatusCode::NOT_FOUND, "", p, true),
            IndexError::RepositoryNotFound
        );
        assert!(map_status(StatusCode::CONFLICT, "", p, true).is_conflict());
        assert!(map_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#,
            p,
            true
        )
        .is_conflict());
        assert_eq!(
            map_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"message":"bad path"}"#, p, true),
            IndexError::Http {
                status: 422,
                message: "bad path".into()
            }
        );
        assert_eq!(map_status(StatusCode::BAD_GATEWAY, "", p, true), IndexError::Server(502));
    }

    #[test]
    fn test_decode_content_tolerates_newlines() {
        let encoded = github_base64(
            r#"{"A":{"title":"A","description":"a fairly long description to span lines","chapters":{}}}"#,
        );
        assert!(encoded.contains('\n'));
        let doc = decode_content(&encoded).unwrap();
        assert_eq!(doc["A"].title, "A");

        assert!(decode_content("").unwrap().is_empty());
        assert!(matches!(decode_content("!!!"), Err(IndexError::Decode(_))));
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_empty() {
        let base = spawn_repo(Shared::default()).await;
        let versioned = store(&base).fetch("manga-index.json").await.unwrap();
        assert!(versioned.document.is_empty());
        assert_eq!(versioned.sha, None);
    }

    #[tokio::test]
    async fn test_fetch_decodes_and_sends_bearer() {
        let repo = Shared::default();
        repo.lock().content = Some((
            github_base64(r#"{"Blame!":{"title":"Blame!","chapters":{"1-1":{"number":"1","volume":"1","pages":["u"]}}}}"#),
            "abc".into(),
        ));
        let base = spawn_repo(repo.clone()).await;

        let versioned = store(&base).fetch("manga-index.json").await.unwrap();
        assert_eq!(versioned.sha.as_deref(), Some("abc"));
        assert_eq!(versioned.document["Blame!"].chapters["1-1"].pages, vec!["u"]);
        assert_eq!(repo.lock().auth_seen, vec!["Bearer ghp_test".to_string()]);
    }

    #[tokio::test]
    async fn test_save_creates_then_updates_with_sha() {
        let repo = Shared::default();
        let base = spawn_repo(repo.clone()).await;
        let store = store(&base);

        let mut doc = RemoteIndexDocument::new();
        let mut record = MangaRecord::from_metadata(&MangaMetadata {
            title: "A".into(),
            ..Default::default()
        });
        record.chapters.insert(
            "1-1".into(),
            ChapterRecord::from_metadata(
                &ChapterMetadata {
                    number: "1".into(),
                    volume: "1".into(),
                    ..Default::default()
                },
                vec!["u1".into()],
            ),
        );
        doc.insert("A".into(), record);

        let link = store
            .save("manga-index.json", &doc, None, "Update manga-index.json")
            .await
            .unwrap();
        assert!(link.contains("blob/main/manga-index.json"));

        {
            let repo = repo.lock();
            let put = repo.last_put.as_ref().unwrap();
            assert!(put.get("sha").is_none());
            assert_eq!(put["message"], "Update manga-index.json");
            let raw = STANDARD.decode(put["content"].as_str().unwrap()).unwrap();
            let text = String::from_utf8(raw).unwrap();
            // 格式化输出
            assert!(text.contains("\n  \"A\": {"));
        }

        // 旧 sha（None）再次写入 -> 冲突
        let err = store
            .save("manga-index.json", &doc, None, "again")
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        store
            .save("manga-index.json", &doc, Some("sha-new"), "again")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_updater_over_github_store() {
        let repo = Shared::default();
        let base = spawn_repo(repo.clone()).await;
        let updater = IndexUpdater::new(Arc::new(store(&base)), "manga-index.json");

        let manga = MangaMetadata {
            title: "Chainsaw Man".into(),
            ..Default::default()
        };
        let chapter = ChapterMetadata {
            number: "1".into(),
            volume: "1".into(),
            ..Default::default()
        };
        updater
            .update_index(&manga, &chapter, &["u1".to_string(), "u2".to_string()])
            .await
            .unwrap();
        updater
            .update_index(
                &manga,
                &ChapterMetadata {
                    number: "2".into(),
                    volume: "1".into(),
                    ..Default::default()
                },
                &["u3".to_string()],
            )
            .await
            .unwrap();

        let versioned = store(&base).fetch("manga-index.json").await.unwrap();
        let chapters = &versioned.document["Chainsaw Man"].chapters;
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters["1-1"].pages, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_not_configured_skips_network() {
        let mut cfg = config();
        cfg.owner.clear();
        let store = GithubContentStore::with_api_base(Client::new(), cfg, "http://127.0.0.1:9");
        assert!(matches!(
            store.fetch("x.json").await,
            Err(IndexError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_rejects_bad_token_format() {
        let mut cfg = config();
        cfg.pat = "token123".into();
        let store = GithubContentStore::with_api_base(Client::new(), cfg, "http://127.0.0.1:9");
        let err = store.test_connection().await.unwrap_err();
        assert!(err.to_string().contains("ghp_"));
    }

    #[tokio::test]
    async fn test_connection_and_list_contents() {
        let router = Router::new()
            .route(
                "/repos/me/library",
                get(|| async { Json(json!({"full_name": "me/library"})) }),
            )
            .route(
                "/repos/me/library/contents/data",
                get(|| async {
                    Json(json!([
                        {"name": "a.json", "path": "data/a.json", "sha": "1", "size": 10, "type": "file"},
                        {"name": "sub", "path": "data/sub", "sha": "2", "size": 0, "type": "dir"}
                    ]))
                }),
            );
        let base = spawn_mock(router).await;
        let store = store(&base);

        assert_eq!(store.test_connection().await.unwrap(), "me/library");

        let entries = store.list_contents("data").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind, "dir");

        // 不存在的目录
        assert!(store.list_contents("missing").await.unwrap().is_empty());
    }
}
