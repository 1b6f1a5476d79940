// 应用状态

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::hosts::{build_http_client, HostRegistry, HttpTransport};
use crate::index::{GithubContentStore, IndexStore, IndexUpdater};
use crate::uploader::{BatchChapterResult, ProgressBoard, UploadManager, UploadResult};
use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 最近一次运行的结果
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LastRun {
    /// 还没有运行过
    None,
    /// 单章上传
    Single { result: UploadResult },
    /// 批量上传
    Batch { results: Vec<BatchChapterResult> },
    /// 运行级错误（前置条件等）
    Failed { error: String },
}

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<RwLock<AppConfig>>,
    /// 配置文件路径
    pub config_path: String,
    /// 共享 HTTP 客户端
    pub http_client: reqwest::Client,
    /// 进度面板
    pub progress: Arc<ProgressBoard>,
    /// 当前运行的取消令牌（同一时间只允许一个运行）
    pub active_run: Arc<Mutex<Option<CancellationToken>>>,
    /// 最近一次运行的结果
    pub last_run: Arc<RwLock<LastRun>>,
    /// 替换图床实现（测试用）
    host_override: Option<HostRegistry>,
    /// 替换索引存储（测试用）
    index_override: Option<Arc<dyn IndexStore>>,
}

/// 运行槽位守卫
pub struct RunSlot {
    active_run: Arc<Mutex<Option<CancellationToken>>>,
    token: CancellationToken,
}

impl RunSlot {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        self.active_run.lock().take();
    }
}

impl AppState {
    /// 从默认路径加载配置并创建状态
    pub async fn new() -> Result<Self> {
        Self::load(DEFAULT_CONFIG_PATH).await
    }

    pub async fn load(config_path: &str) -> Result<Self> {
        let config = AppConfig::load_or_default(config_path).await;
        Self::with_config(config, config_path)
    }

    pub fn with_config(config: AppConfig, config_path: &str) -> Result<Self> {
        let http_client = build_http_client(config.upload.request_timeout_secs)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.to_string(),
            http_client,
            progress: Arc::new(ProgressBoard::new()),
            active_run: Arc::new(Mutex::new(None)),
            last_run: Arc::new(RwLock::new(LastRun::None)),
            host_override: None,
            index_override: None,
        })
    }

    pub fn with_host_registry(mut self, registry: HostRegistry) -> Self {
        self.host_override = Some(registry);
        self
    }

    pub fn with_index_store(mut self, store: Arc<dyn IndexStore>) -> Self {
        self.index_override = Some(store);
        self
    }

    /// 根据当前配置构建图床注册表
    pub async fn host_registry(&self) -> HostRegistry {
        if let Some(registry) = &self.host_override {
            return registry.clone();
        }
        let origin = self.config.read().await.upload.browser_origin.clone();
        HostRegistry::http(HttpTransport::new(self.http_client.clone()).with_browser_origin(origin))
    }

    /// GitHub 存储（未配置时返回 None）
    pub async fn github_store(&self) -> Option<GithubContentStore> {
        let github = self.config.read().await.github.clone();
        github
            .is_complete()
            .then(|| GithubContentStore::new(self.http_client.clone(), github))
    }

    async fn index_updater(&self) -> Option<IndexUpdater> {
        let filename = self.config.read().await.github.filename.clone();
        if let Some(store) = &self.index_override {
            return Some(IndexUpdater::new(store.clone(), filename));
        }
        let store = self.github_store().await?;
        Some(IndexUpdater::new(Arc::new(store), filename))
    }

    /// 按当前配置创建上传管理器（共享进度面板）
    pub async fn upload_manager(&self) -> UploadManager {
        UploadManager::new(self.host_registry().await, self.progress.clone())
            .with_index(self.index_updater().await)
    }

    /// 占用运行槽位，已有运行时返回 None
    ///
    /// 槽位在返回的 RunSlot 被 drop 时释放（包括运行任务 panic）
    pub fn try_begin_run(&self) -> Option<RunSlot> {
        let mut active = self.active_run.lock();
        if active.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Some(RunSlot {
            active_run: self.active_run.clone(),
            token,
        })
    }

    pub fn is_running(&self) -> bool {
        self.active_run.lock().is_some()
    }

    /// 取消当前运行，没有运行时返回 false
    pub fn cancel_run(&self) -> bool {
        match self.active_run.lock().as_ref() {
            Some(token) => {
                info!("收到取消请求");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 保存配置到文件并替换内存中的配置
    pub async fn persist_config(&self, config: AppConfig) -> Result<()> {
        config.save_to_file(&self.config_path).await?;
        *self.config.write().await = config;
        Ok(())
    }
}
